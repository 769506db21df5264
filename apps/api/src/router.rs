use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use session_cell::router::session_routes;
use session_cell::SessionState;

pub fn create_router(state: SessionState) -> Router {
    Router::new()
        .route("/", get(|| async { "Nutri Clinic API is running!" }))
        .nest("/session", session_routes(state.clone()))
        .nest("/appointments", appointment_routes(state))
}
