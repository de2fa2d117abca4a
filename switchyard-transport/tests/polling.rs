//! Polling channel behaviour against a wiremock endpoint.

use serde_json::json;
use std::time::Duration;
use switchyard_proto::{Channel, ChannelState, Envelope, handler_fn};
use switchyard_transport::{PollingChannel, PollingConfig};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn config(server: &MockServer) -> PollingConfig {
    PollingConfig::new(server.uri())
        .interval(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(2))
}

fn message(id: &str, n: u64) -> serde_json::Value {
    json!({
        "id": id,
        "envelope": { "type": "context_update", "data": { "n": n }, "timestamp": 1 }
    })
}

fn empty_batch() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "messages": [] }))
}

/// Wait until the recorded requests satisfy `done`.
async fn wait_for_requests(server: &MockServer, done: impl Fn(&[Request]) -> bool) -> Vec<Request> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let requests = server.received_requests().await.unwrap_or_default();
        if done(&requests) {
            return requests;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for requests, saw {}",
            requests.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn posts(requests: &[Request]) -> Vec<&Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect()
}

#[tokio::test]
async fn delivers_messages_and_advances_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("since", "m2"))
        .respond_with(empty_batch())
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "messages": [message("m1", 1), message("m2", 2)] })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let channel = PollingChannel::new(config(&server));
    let (tx, mut seen) = mpsc::unbounded_channel();
    channel.receive(handler_fn(move |env: Envelope| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(env.data["n"].as_u64().unwrap_or_default());
            Ok(())
        }
    }));
    channel.start().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);

    for expected in [1, 2] {
        let n = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, expected);
    }

    wait_for_requests(&server, |reqs| {
        reqs.iter()
            .any(|r| r.url.query().is_some_and(|q| q.contains("since=m2")))
    })
    .await;
    assert_eq!(channel.cursor().as_deref(), Some("m2"));
    channel.close().await;
}

#[tokio::test]
async fn failed_poll_is_retried_on_next_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [message("m1", 9)] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(empty_batch())
        .mount(&server)
        .await;

    let channel = PollingChannel::new(config(&server));
    let (tx, mut seen) = mpsc::unbounded_channel();
    channel.receive(handler_fn(move |env: Envelope| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(env.data["n"].as_u64().unwrap_or_default());
            Ok(())
        }
    }));
    channel.start().await.unwrap();

    let n = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 9);
    assert_eq!(channel.state(), ChannelState::Connected);
    channel.close().await;
}

#[tokio::test]
async fn sends_are_posted_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(empty_batch())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let channel = PollingChannel::new(config(&server));
    for n in 1..=3u64 {
        channel
            .send(Envelope::new("request", json!({ "n": n })))
            .await
            .unwrap();
    }

    let requests = wait_for_requests(&server, |reqs| posts(reqs).len() >= 3).await;
    let order: Vec<u64> = posts(&requests)
        .iter()
        .map(|r| {
            let envelope: Envelope = serde_json::from_slice(&r.body).unwrap();
            envelope.data["n"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
    channel.close().await;
}

#[tokio::test]
async fn failed_post_stays_queued_until_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(empty_batch())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let channel = PollingChannel::new(config(&server));
    channel
        .send(Envelope::new("request", json!({ "n": 1 })))
        .await
        .unwrap();

    wait_for_requests(&server, |reqs| posts(reqs).len() >= 2).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while channel.queued() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "envelope never delivered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    channel.close().await;
}

#[tokio::test]
async fn close_stops_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(empty_batch())
        .mount(&server)
        .await;

    let channel = PollingChannel::new(config(&server));
    channel.start().await.unwrap();
    wait_for_requests(&server, |reqs| !reqs.is_empty()).await;

    channel.close().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let before = server.received_requests().await.unwrap_or_default().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let after = server.received_requests().await.unwrap_or_default().len();
    assert_eq!(before, after);
    assert!(channel.start().await.is_err());
}
