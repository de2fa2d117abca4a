//! Credential lifecycle against a wiremock token endpoint.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchyard_auth::{AuthError, CredentialManager, OAuthConfig, Token};
use switchyard_store::{FileStore, MemoryStore, SecureStore};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new(
        "client-1",
        format!("{}/authorize", server.uri()),
        format!("{}/token", server.uri()),
    )
    .client_secret("secret-1")
    .scope("openid")
}

fn manager(server: &MockServer) -> CredentialManager {
    CredentialManager::new(config(server), Arc::new(MemoryStore::new()))
}

fn state_of(url: &reqwest::Url) -> String {
    let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
    params["state"].clone()
}

#[tokio::test]
async fn authorization_code_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("code_verifier="))
        .and(body_string_contains("client_secret=secret-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server);
    let url = manager.authorize().await.unwrap();
    let token = manager
        .complete_authorization("the-code", &state_of(&url))
        .await
        .unwrap();

    assert_eq!(token.access(), "access-1");
    assert_eq!(token.refresh(), Some("refresh-1"));
    assert!(manager.is_authenticated().await.unwrap());
    assert_eq!(manager.get_access_token().await.unwrap(), "access-1");

    // The verifier is single-use.
    let err = manager.exchange_code_for_token("again").await.unwrap_err();
    assert_eq!(err.code(), "auth_flow_interrupted");
}

#[tokio::test]
async fn rejected_code_keeps_the_flow_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(2)
        .mount(&server)
        .await;

    let manager = manager(&server);
    manager.authorize().await.unwrap();
    let err = manager.exchange_code_for_token("bad").await.unwrap_err();
    assert!(matches!(err, AuthError::ExchangeFailed(_)));
    assert_eq!(err.code(), "token_exchange_failed");
    assert!(err.to_string().contains("invalid_grant"));

    // Still pending, so a second code can be tried.
    let err = manager.exchange_code_for_token("bad").await.unwrap_err();
    assert_eq!(err.code(), "token_exchange_failed");
    assert!(!manager.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn near_expiry_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-new",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server);
    let expiring = Token::expiring_in("access-old", Some("refresh-old".into()), Duration::from_secs(240));
    manager.save_token(&expiring).await.unwrap();

    assert_eq!(manager.get_access_token().await.unwrap(), "access-new");
    assert_eq!(manager.get_access_token().await.unwrap(), "access-new");

    let stored = manager.current_token().await.unwrap().unwrap();
    assert_eq!(stored.refresh(), Some("refresh-old"));
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "access-new",
                    "refresh_token": "refresh-new",
                    "expires_in": 3600
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(manager(&server));
    let expiring = Token::expiring_in("access-old", Some("refresh-old".into()), Duration::from_secs(60));
    manager.save_token(&expiring).await.unwrap();

    let (a, b, c) = tokio::join!(
        manager.get_access_token(),
        manager.get_access_token(),
        manager.get_access_token()
    );
    assert_eq!(a.unwrap(), "access-new");
    assert_eq!(b.unwrap(), "access-new");
    assert_eq!(c.unwrap(), "access-new");
}

#[tokio::test]
async fn rejected_refresh_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server);
    let expiring = Token::expiring_in("a", Some("r".into()), Duration::from_secs(10));
    manager.save_token(&expiring).await.unwrap();

    let err = manager.get_access_token().await.unwrap_err();
    assert_eq!(err.code(), "token_refresh_failed");
}

#[tokio::test]
async fn concurrent_callers_share_one_failed_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("upstream down")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(manager(&server));
    let expiring = Token::expiring_in("a", Some("r".into()), Duration::from_secs(10));
    manager.save_token(&expiring).await.unwrap();

    let (a, b, c) = tokio::join!(
        manager.get_access_token(),
        manager.get_access_token(),
        manager.get_access_token()
    );
    for result in [a, b, c] {
        let err = result.unwrap_err();
        assert_eq!(err.code(), "token_refresh_failed");
        assert!(err.to_string().contains("upstream down"), "{err}");
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn later_caller_retries_after_a_failed_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let manager = manager(&server);
    let expiring = Token::expiring_in("a", Some("r".into()), Duration::from_secs(10));
    manager.save_token(&expiring).await.unwrap();

    assert!(manager.get_access_token().await.is_err());
    assert!(manager.get_access_token().await.is_err());
}

#[tokio::test]
async fn refresh_with_out_of_range_lifetime_stays_valid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token":"forever","expires_in":18446744073709551615}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server);
    let expiring = Token::expiring_in("a", Some("r".into()), Duration::from_secs(10));
    manager.save_token(&expiring).await.unwrap();

    assert_eq!(manager.get_access_token().await.unwrap(), "forever");
    assert_eq!(manager.get_access_token().await.unwrap(), "forever");
    assert!(!manager.current_token().await.unwrap().unwrap().is_expired());
}

#[tokio::test]
async fn logout_then_access_fails() {
    let server = MockServer::start().await;
    let manager = manager(&server);
    let token = Token::expiring_in("a", Some("r".into()), Duration::from_secs(3600));
    manager.save_token(&token).await.unwrap();

    manager.logout().await.unwrap();
    let err = manager.get_access_token().await.unwrap_err();
    assert_eq!(err.code(), "no_access_token");
    let err = manager.refresh_token().await.unwrap_err();
    assert_eq!(err.code(), "no_refresh_token");
}

#[tokio::test]
async fn tokens_survive_a_restart_with_file_store() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let first = CredentialManager::new(config(&server), Arc::new(FileStore::new(&path)));
    let token = Token::expiring_in("persisted", Some("r".into()), Duration::from_secs(3600));
    first.save_token(&token).await.unwrap();
    drop(first);

    let store = Arc::new(FileStore::new(&path));
    let second = CredentialManager::new(config(&server), store.clone());
    assert_eq!(second.get_access_token().await.unwrap(), "persisted");
    assert_eq!(
        store
            .get_item("switchyard.auth.refresh_token")
            .await
            .unwrap()
            .as_deref(),
        Some("r")
    );
}

#[tokio::test]
async fn manager_is_a_token_source() {
    use switchyard_proto::TokenSource;

    let server = MockServer::start().await;
    let manager = manager(&server);
    let err = manager.access_token().await.unwrap_err();
    assert_eq!(err.code, "no_access_token");

    let token = Token::expiring_in("bearer-1", None, Duration::from_secs(3600));
    manager.save_token(&token).await.unwrap();
    assert_eq!(manager.access_token().await.unwrap(), "bearer-1");
}
