// libs/appointment-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_json, method, path, query_param};

use appointment_cell::router::appointment_routes;
use session_cell::services::{MemorySnapshotStore, SnapshotStore};
use session_cell::SessionState;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct TestApp {
    state: SessionState,
    mock_server: MockServer,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_offset(TestConfig::default().to_app_config().clinic_utc_offset_minutes).await
    }

    async fn with_offset(clinic_utc_offset_minutes: i32) -> Self {
        let mock_server = MockServer::start().await;
        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = mock_server.uri();
        config.clinic_utc_offset_minutes = clinic_utc_offset_minutes;

        let snapshots: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
        let state = SessionState::with_snapshots(Arc::new(config), snapshots);

        Self { state, mock_server }
    }

    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.state.config.supabase_jwt_secret, Some(1))
    }

    async fn send(&self, http_method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(http_method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = appointment_routes(self.state.clone()).oneshot(request).await.unwrap();
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

async fn mount_assignment(mock_server: &MockServer, patient_id: i64, practitioner_id: i64, assigned: bool) {
    let rows = if assigned {
        json!([MockSupabaseResponses::relationship_row(patient_id, practitioner_id)])
    } else {
        json!([])
    };

    Mock::given(method("GET"))
        .and(path("/rest/v1/paciente_nutriologo"))
        .and(query_param("id_nutriologo", format!("eq.{}", practitioner_id)))
        .and(query_param("id_paciente", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_create_appointment_converts_local_time() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assignment(&app.mock_server, 9, 42, true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .and(body_json(json!({
            "id_paciente": 9,
            "id_nutriologo": 42,
            "fecha_hora": "2099-01-20T17:00:00Z",
            "estado": "pendiente",
            "duracion_minutos": 60,
            "tipo_cita": "presencial"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(101, 9, 42, "2099-01-20T17:00:00+00:00", "pendiente")
        ])))
        .expect(1)
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send(
        "POST",
        "/",
        Some(&app.token_for(&user)),
        Some(json!({ "patient_id": 9, "date": "2099-01-20", "time": "10:00" })),
    ).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["id"], json!(101));
    assert_eq!(body["appointment"]["status"], json!("pending"));
    assert_eq!(body["local"]["date"], json!("2099-01-20"));
}

#[tokio::test]
async fn test_create_for_unassigned_patient_is_forbidden() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assignment(&app.mock_server, 9, 42, false).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send(
        "POST",
        "/",
        Some(&app.token_for(&user)),
        Some(json!({ "patient_id": 9, "date": "2099-01-20", "time": "10:00" })),
    ).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["retryable"], json!(false));
}

#[tokio::test]
async fn test_create_in_the_past_is_validation_error() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assignment(&app.mock_server, 9, 42, true).await;

    let (status, _) = app.send(
        "POST",
        "/",
        Some(&app.token_for(&user)),
        Some(json!({ "patient_id": 9, "date": "2020-01-20", "time": "10:00" })),
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_administrators_cannot_manage_appointments() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("admin@example.com");
    Mock::given(method("GET"))
        .and(path("/rest/v1/administradores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::administrator_row(&user.id, 1)
        ])))
        .mount(&app.mock_server)
        .await;

    let (status, _) = app.send("GET", "/", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_returns_partitions_and_payment_status() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .and(query_param("id_nutriologo", "eq.42"))
        .and(query_param("order", "fecha_hora.desc,id_cita.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(3, 9, 42, "2026-02-01T17:00:00Z", "cancelada"),
            MockSupabaseResponses::appointment_row(2, 9, 42, "2026-01-25T17:00:00Z", "confirmada"),
            MockSupabaseResponses::appointment_row(1, 9, 42, "2026-01-20T17:00:00Z", "completada")
        ])))
        .mount(&app.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pagos"))
        .and(query_param("id_cita", "in.(3,2,1)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payment_row(10, Some(1), 650.0, "completado", "2026-01-20T18:00:00Z")
        ])))
        .expect(1)
        .mount(&app.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pacientes"))
        .and(query_param("id_paciente", "in.(9)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(9, "María", "López", "maria@example.com")
        ])))
        .expect(1)
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("GET", "/?view=all", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["pending"].as_array().unwrap().len(), 1);
    assert_eq!(body["completed"].as_array().unwrap().len(), 1);

    let completed = &body["completed"][0];
    assert_eq!(completed["patient_name"], json!("María López"));
    assert_eq!(completed["display_time"], json!("10:00 AM"));
    assert_eq!(completed["payment"]["paid"], json!(true));
    assert_eq!(completed["payment"]["amount"], json!(650.0));

    let pending = &body["pending"][0];
    assert_eq!(pending["payment"]["paid"], json!(false));
    assert_eq!(pending["payment"]["amount"], json!(800.0));
}

#[tokio::test]
async fn test_complete_confirmed_appointment() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .and(query_param("id_cita", "eq.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(7, 9, 42, "2026-01-20T17:00:00Z", "confirmada")
        ])))
        .mount(&app.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/citas"))
        .and(query_param("estado", "eq.confirmada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(7, 9, 42, "2026-01-20T17:00:00Z", "completada")
        ])))
        .expect(1)
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("POST", "/7/complete", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], json!("completed"));
}

#[tokio::test]
async fn test_completing_pending_appointment_is_conflict() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(7, 9, 42, "2026-01-20T17:00:00Z", "pendiente")
        ])))
        .mount(&app.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let (status, _) = app.send(
        "POST",
        "/7/transition",
        Some(&app.token_for(&user)),
        Some(json!({ "status": "completed" })),
    ).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_transition_of_missing_appointment_is_not_found() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.mock_server)
        .await;

    let (status, _) = app.send(
        "POST",
        "/99/transition",
        Some(&app.token_for(&user)),
        Some(json!({ "status": "cancelled" })),
    ).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_outage_is_retryable() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("GET", "/dashboard", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], json!(true));
}

async fn mount_assigned_patients(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/paciente_nutriologo"))
        .and(query_param("activo", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::relationship_row(9, 42),
            MockSupabaseResponses::relationship_row(12, 42)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pacientes"))
        .and(query_param("id_paciente", "in.(9,12)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(12, "Jorge", "Méndez", "jorge@example.com"),
            MockSupabaseResponses::patient_row(9, "María", "López", "maria@example.com")
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_patients_lists_active_assignments_with_contact_details() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assigned_patients(&app.mock_server).await;

    let (status, body) = app.send("GET", "/patients", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(2));
    assert_eq!(body["patients"][0]["id"], json!(9));
    assert_eq!(body["patients"][0]["first_name"], json!("María"));
    assert_eq!(body["patients"][1]["email"], json!("jorge@example.com"));
}

#[tokio::test]
async fn test_patients_search_filters_by_name_or_email() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assigned_patients(&app.mock_server).await;

    let (status, body) = app.send("GET", "/patients?search=jorge", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["patients"][0]["last_name"], json!("Méndez"));
}

#[tokio::test]
async fn test_dashboard_counts_active_patients() {
    let app = TestApp::new().await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;
    mount_assigned_patients(&app.mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.mock_server)
        .await;

    let (status, body) = app.send("GET", "/dashboard", Some(&app.token_for(&user)), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(0));
    assert_eq!(body["active_patients"], json!(2));
}

#[tokio::test]
async fn test_bad_clinic_offset_is_server_error_not_bad_input() {
    let app = TestApp::with_offset(48 * 60).await;
    let user = TestUser::authenticated("nutri@example.com");
    mount_practitioner(&app.mock_server, &user.id, 42).await;

    let (status, body) = app.send(
        "POST",
        "/",
        Some(&app.token_for(&user)),
        Some(json!({ "patient_id": 9, "date": "2099-01-20", "time": "10:00" })),
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["retryable"], json!(false));
}

#[tokio::test]
async fn test_routes_require_bearer_token() {
    let app = TestApp::new().await;

    let (status, _) = app.send("GET", "/dashboard", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
