// libs/session-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use session_cell::router::session_routes;
use session_cell::services::{FileSnapshotStore, SnapshotStore};
use session_cell::SessionState;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct TestApp {
    state: SessionState,
    mock_server: MockServer,
    _cache_dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = mock_server.uri();

        let cache_dir = tempfile::tempdir().unwrap();
        let snapshots: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(cache_dir.path()));
        let state = SessionState::with_snapshots(Arc::new(config), snapshots);

        Self { state, mock_server, _cache_dir: cache_dir }
    }

    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.state.config.supabase_jwt_secret, Some(1))
    }

    async fn send(&self, http_method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(http_method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = session_routes(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }
}

async fn mount_practitioner(mock_server: &MockServer, principal_id: &str, scope: i64) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/administradores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/nutriologos"))
        .and(query_param("id_auth_user", format!("eq.{}", principal_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::practitioner_row(principal_id, scope)
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_me_returns_practitioner_identity() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    let (status, body) = app.send("GET", "/me", Some(&app.token_for(&user))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], json!("practitioner"));
    assert_eq!(body["source"], json!("authoritative"));
    assert_eq!(body["identity"]["scope"], json!(42));
}

#[tokio::test]
async fn test_me_without_profile_is_forbidden() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("stranger@example.com");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("GET", "/me", Some(&app.token_for(&user))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["retryable"], json!(false));
}

#[tokio::test]
async fn test_me_transport_failure_is_retryable() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("GET", "/me", Some(&app.token_for(&user))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], json!(true));
    assert_eq!(app.state.registry.active_sessions(), 0);
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = TestApp::new().await;

    let (status, _) = app.send("GET", "/me", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signout_clears_cached_identity() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    let token = app.token_for(&user);

    let (status, _) = app.send("GET", "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.registry.active_sessions(), 1);

    let (status, body) = app.send("POST", "/signout", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(app.state.registry.active_sessions(), 0);
}
