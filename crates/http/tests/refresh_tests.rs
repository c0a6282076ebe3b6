//! Credential refresh behaviour of the API client against a mock backend

use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use storefront_core::{KeyValueStore, MemoryStore};
use storefront_http::client::ApiClient;
use storefront_http::client::error::{ClientError, RefreshError};
use storefront_http::credentials::{
    ACCESS_TOKEN_KEY, CredentialStore, CredentialTtl, REFRESH_TOKEN_KEY,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OLD_ACCESS: &str = "access-old";
const OLD_REFRESH: &str = "refresh-old";
const NEW_ACCESS: &str = "access-new";
const NEW_REFRESH: &str = "refresh-new";

/// A client whose credential layers can be inspected, and a counter of
/// session-expired signals.
struct Harness {
    client: ApiClient,
    cookies: Arc<MemoryStore>,
    durable: Arc<MemoryStore>,
    expired: Arc<AtomicUsize>,
}

impl Harness {
    fn new(server: &MockServer, tokens: Option<(&str, Option<&str>)>) -> Self {
        let cookies = Arc::new(MemoryStore::new());
        let durable = Arc::new(MemoryStore::new());
        let credentials =
            CredentialStore::new(cookies.clone(), durable.clone(), CredentialTtl::default());

        if let Some((access, refresh)) = tokens {
            let ttl = Duration::from_secs(600);
            credentials.set(ACCESS_TOKEN_KEY, access, ttl).unwrap();
            if let Some(refresh) = refresh {
                credentials.set(REFRESH_TOKEN_KEY, refresh, ttl).unwrap();
            }
        }

        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let client = ApiClient::builder()
            .base_url(server.uri())
            .credentials(credentials)
            .on_session_expired(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        Self {
            client,
            cookies,
            durable,
            expired,
        }
    }

    fn signed_in(server: &MockServer) -> Self {
        Self::new(server, Some((OLD_ACCESS, Some(OLD_REFRESH))))
    }

    fn expired_signals(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    fn assert_layers_empty(&self) {
        for layer in [&self.cookies, &self.durable] {
            assert_eq!(layer.get(ACCESS_TOKEN_KEY).unwrap(), None);
            assert_eq!(layer.get(REFRESH_TOKEN_KEY).unwrap(), None);
        }
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Endpoints that reject the old token and accept the new one
async fn mount_protected(server: &MockServer, endpoints: &[&str]) {
    for endpoint in endpoints {
        Mock::given(method("GET"))
            .and(path(*endpoint))
            .and(header("authorization", bearer(OLD_ACCESS).as_str()))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(*endpoint))
            .and(header("authorization", bearer(NEW_ACCESS).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "endpoint": endpoint })))
            .mount(server)
            .await;
    }
}

fn refresh_success() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(json!({ "access_token": NEW_ACCESS, "refresh_token": NEW_REFRESH }))
        // Long enough for every concurrent request to hit its 401 first.
        .set_delay(Duration::from_millis(200))
}

async fn refresh_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/auth/refresh")
        .count()
}

#[tokio::test]
async fn test_single_401_is_refreshed_and_replayed() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": OLD_REFRESH })))
        .respond_with(refresh_success())
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let body: Value = harness.client.get("/cart").await.unwrap();
    assert_eq!(body["endpoint"], "/cart");

    // New pair lands in both layers.
    for layer in [&harness.cookies, &harness.durable] {
        assert_eq!(layer.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some(NEW_ACCESS));
        assert_eq!(layer.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some(NEW_REFRESH));
    }
    assert_eq!(harness.expired_signals(), 0);
    assert!(!harness.client.is_refreshing());
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    let endpoints = ["/cart", "/orders", "/auth/profile"];
    mount_protected(&server, &endpoints).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let results: Vec<Result<Value, ClientError>> = join_all(
        endpoints
            .iter()
            .map(|endpoint| harness.client.get::<Value>(endpoint)),
    )
    .await;

    for (result, endpoint) in results.into_iter().zip(endpoints) {
        assert_eq!(result.unwrap()["endpoint"], endpoint);
    }

    assert_eq!(refresh_calls(&server).await, 1);

    let requests = server.received_requests().await.unwrap();
    let replays = requests
        .iter()
        .filter(|r| r.url.path() != "/auth/refresh")
        .filter(|r| {
            r.headers
                .get("authorization")
                .is_some_and(|v| v.to_str().unwrap() == bearer(NEW_ACCESS))
        })
        .count();
    assert_eq!(replays, 3);
    assert!(!harness.client.is_refreshing());
}

#[tokio::test]
async fn test_concurrent_requests_across_spawned_tasks() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/orders"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = harness.client.clone();
            tokio::spawn(async move { client.get::<Value>("/orders").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap()["endpoint"], "/orders");
    }
    assert_eq!(refresh_calls(&server).await, 1);
}

#[tokio::test]
async fn test_rejected_refresh_fails_every_queued_request() {
    let server = MockServer::start().await;
    let endpoints = ["/cart", "/orders", "/auth/profile"];
    mount_protected(&server, &endpoints).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh token expired")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let results: Vec<Result<Value, ClientError>> = join_all(
        endpoints
            .iter()
            .map(|endpoint| harness.client.get::<Value>(endpoint)),
    )
    .await;

    for result in results {
        let err = result.unwrap_err();
        assert!(
            matches!(err, ClientError::Refresh(RefreshError::Rejected { status: 401 })),
            "unexpected error: {err:?}"
        );
        assert!(err.is_auth_expired());
    }

    harness.assert_layers_empty();
    assert_eq!(harness.expired_signals(), 1);
    assert!(!harness.client.is_refreshing());
}

#[tokio::test]
async fn test_refresh_response_missing_token_is_terminal() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": NEW_ACCESS })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let result: Result<Value, _> = harness.client.get("/cart").await;

    assert!(matches!(
        result,
        Err(ClientError::Refresh(RefreshError::InvalidResponse))
    ));
    harness.assert_layers_empty();
    assert_eq!(harness.expired_signals(), 1);
}

#[tokio::test]
async fn test_missing_refresh_token_ends_session_without_refresh_call() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, Some((OLD_ACCESS, None)));
    let result: Result<Value, _> = harness.client.get("/cart").await;

    assert!(matches!(
        result,
        Err(ClientError::Refresh(RefreshError::MissingRefreshToken))
    ));
    harness.assert_layers_empty();
    assert_eq!(harness.expired_signals(), 1);
}

#[tokio::test]
async fn test_refresh_server_error_keeps_credentials() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let result: Result<Value, _> = harness.client.get("/cart").await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Refresh(RefreshError::Failed { status: 503 })
    ));
    assert!(!err.is_auth_expired());
    assert_eq!(
        harness.client.credentials().refresh_token().as_deref(),
        Some(OLD_REFRESH)
    );
    assert_eq!(harness.expired_signals(), 0);
    assert!(!harness.client.is_refreshing());
}

#[tokio::test]
async fn test_retried_request_is_not_retried_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still unauthorized"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let result: Result<Value, _> = harness.client.get("/orders").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert_eq!(refresh_calls(&server).await, 1);
    harness.assert_layers_empty();
    assert_eq!(harness.expired_signals(), 1);
}

#[tokio::test]
async fn test_401_from_refresh_endpoint_never_schedules_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let result = harness.client.refresh(OLD_REFRESH).await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    harness.assert_layers_empty();
    assert_eq!(harness.expired_signals(), 1);
}

#[tokio::test]
async fn test_login_rejection_is_not_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let request = storefront_http::types::LoginRequest {
        email: "ann@example.com".into(),
        password: "wrong".into(),
    };
    let result = harness.client.login(&request).await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(msg)) if msg == "invalid credentials"));
    assert_eq!(harness.expired_signals(), 0);
    assert_eq!(
        harness.client.credentials().access_token().as_deref(),
        Some(OLD_ACCESS)
    );
}

#[tokio::test]
async fn test_request_after_refresh_uses_new_token_directly() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::signed_in(&server);
    let _: Value = harness.client.get("/cart").await.unwrap();
    let _: Value = harness.client.get("/cart").await.unwrap();

    // old 401, new 200, then straight to new 200
    let cart_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/cart")
        .count();
    assert_eq!(cart_requests, 3);
}

#[tokio::test]
async fn test_independent_clients_do_not_share_refresh_state() {
    let server = MockServer::start().await;
    mount_protected(&server, &["/cart"]).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(refresh_success())
        .expect(2)
        .mount(&server)
        .await;

    let first = Harness::signed_in(&server);
    let second = Harness::signed_in(&server);

    let (a, b) = tokio::join!(
        first.client.get::<Value>("/cart"),
        second.client.get::<Value>("/cart")
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(refresh_calls(&server).await, 2);
}

#[tokio::test]
async fn test_anonymous_401_redirects_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, None);
    let result: Result<Value, _> = harness.client.get("/cart").await;

    assert!(matches!(
        result,
        Err(ClientError::Refresh(RefreshError::MissingRefreshToken))
    ));
    assert_eq!(harness.expired_signals(), 1);
}
