//! A router served over a loopback channel, driven by a `Requester`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use switchyard_proto::{Backoff, Channel, ChannelError, Envelope, HandlerError, Request, codes};
use switchyard_router::{Requester, Router, bind, handler_fn};
use switchyard_transport::{Connector, Link, LoopbackChannel, SocketChannel, SocketConfig};

struct Served {
    router: Arc<Router>,
    client: Arc<dyn Channel>,
    // Keeps the serving end alive; the binding only holds it weakly.
    _server: Arc<dyn Channel>,
    requester: Arc<Requester>,
}

fn serve() -> Served {
    let (client, server) = LoopbackChannel::pair();
    let client: Arc<dyn Channel> = Arc::new(client);
    let server: Arc<dyn Channel> = Arc::new(server);

    let router = Arc::new(Router::new());
    router
        .register_handler(
            "session",
            "whoami",
            handler_fn(|_params, ctx| async move {
                Ok(json!({ "userId": ctx.get("userId").cloned().unwrap_or(Value::Null) }))
            }),
        )
        .unwrap();
    bind(Arc::clone(&router), &server);

    let requester = Requester::attach(Arc::clone(&client));
    Served {
        router,
        client,
        _server: server,
        requester,
    }
}

#[tokio::test]
async fn unregistered_operation_comes_back_as_not_supported() {
    let s = serve();
    let resp = s
        .requester
        .call(&Request::new("session", "logout"))
        .await
        .unwrap();
    assert!(!resp.success);
    assert_eq!(resp.error_code(), Some(codes::OPERATION_NOT_SUPPORTED));
}

#[tokio::test]
async fn context_update_is_visible_to_later_requests() {
    let s = serve();
    let mut values = Map::new();
    values.insert("userId".into(), json!("abc"));
    s.client
        .send(Envelope::context_update(values))
        .await
        .unwrap();

    let resp = s
        .requester
        .call(&Request::new("session", "whoami"))
        .await
        .unwrap();
    assert!(resp.success);
    assert_eq!(resp.result.unwrap()["userId"], "abc");
}

#[tokio::test]
async fn response_metadata_echoes_request_id() {
    let s = serve();
    let request = Request::new("session", "whoami");
    let resp = s.requester.call(&request).await.unwrap();
    assert_eq!(resp.metadata.id, request.metadata.id);
    assert_eq!(s.requester.pending(), 0);
}

#[tokio::test]
async fn handlers_registered_after_bind_are_served() {
    let s = serve();
    s.router
        .register_handler(
            "math",
            "add",
            handler_fn(|params, _ctx| async move {
                let a = params["a"].as_i64().unwrap_or(0);
                let b = params["b"].as_i64().unwrap_or(0);
                Ok(json!(a + b))
            }),
        )
        .unwrap();

    let resp = s
        .requester
        .call(&Request::new("math", "add").with_parameters(json!({ "a": 2, "b": 3 })))
        .await
        .unwrap();
    assert_eq!(resp.result, Some(json!(5)));
}

#[tokio::test]
async fn failing_and_panicking_handlers_still_answer() {
    let s = serve();
    s.router
        .register_handler(
            "jobs",
            "fail",
            handler_fn(|_, _| async { Err(HandlerError::failed("queue is full")) }),
        )
        .unwrap();
    s.router
        .register_handler(
            "jobs",
            "crash",
            handler_fn(|_, _| async {
                if true {
                    panic!("worker crashed");
                }
                Ok(Value::Null)
            }),
        )
        .unwrap();

    let failed = s.requester.call(&Request::new("jobs", "fail")).await.unwrap();
    assert_eq!(failed.error_code(), Some(codes::EXECUTION_ERROR));
    let crashed = s.requester.call(&Request::new("jobs", "crash")).await.unwrap();
    assert_eq!(crashed.error_code(), Some(codes::EXECUTION_ERROR));

    let ok = s
        .requester
        .call(&Request::new("session", "whoami"))
        .await
        .unwrap();
    assert!(ok.success);
}

#[tokio::test]
async fn calls_fail_once_the_channel_is_closed() {
    let s = serve();
    s.client.close().await;
    let err = s
        .requester
        .call(&Request::new("session", "whoami"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Closed));
    assert_eq!(s.requester.pending(), 0);
}

/// A peer that never answers.
fn silent() -> (Arc<dyn Channel>, Arc<dyn Channel>, Arc<Requester>) {
    let (client, server) = LoopbackChannel::pair();
    let client: Arc<dyn Channel> = Arc::new(client);
    let server: Arc<dyn Channel> = Arc::new(server);
    let requester = Requester::attach(Arc::clone(&client));
    (client, server, requester)
}

async fn until_pending(requester: &Requester, count: usize) {
    while requester.pending() != count {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn waiting_call_fails_when_the_channel_closes() {
    let (client, _server, requester) = silent();
    let call = tokio::spawn({
        let requester = Arc::clone(&requester);
        async move { requester.call(&Request::new("session", "whoami")).await }
    });
    tokio::time::timeout(Duration::from_secs(2), until_pending(&requester, 1))
        .await
        .unwrap();

    client.close().await;
    let err = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::Closed));
    assert_eq!(requester.pending(), 0);
}

#[tokio::test]
async fn waiting_call_fails_when_the_peer_closes() {
    let (_client, server, requester) = silent();
    let call = tokio::spawn({
        let requester = Arc::clone(&requester);
        async move { requester.call(&Request::new("session", "whoami")).await }
    });
    tokio::time::timeout(Duration::from_secs(2), until_pending(&requester, 1))
        .await
        .unwrap();

    server.close().await;
    let result = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ChannelError::Closed)));
}

#[tokio::test]
async fn dropped_call_is_forgotten() {
    let (_client, _server, requester) = silent();
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        requester.call(&Request::new("session", "whoami")),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(requester.pending(), 0);
}

struct NeverConnects;

#[async_trait]
impl Connector for NeverConnects {
    async fn connect(&self) -> Result<Link, ChannelError> {
        Err(ChannelError::Connect("connection refused".into()))
    }
}

#[tokio::test]
async fn queued_call_fails_when_reconnects_run_out() {
    let config = SocketConfig::default()
        .max_reconnect_attempts(1)
        .backoff(Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        ));
    let channel: Arc<dyn Channel> = Arc::new(SocketChannel::new(NeverConnects, config));
    let requester = Requester::attach(Arc::clone(&channel));

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        requester.call(&Request::new("session", "whoami")),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(ChannelError::Closed)));
    assert_eq!(requester.pending(), 0);
    assert!(channel.state().is_closed());
}
