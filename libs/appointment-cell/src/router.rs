// libs/appointment-cell/src/router.rs
use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use session_cell::SessionState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: SessionState) -> Router {
    // Every operation is scoped to the calling practitioner
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/", post(handlers::create_appointment))
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/patients", get(handlers::list_bookable_patients))
        .route("/{appointment_id}/transition", post(handlers::transition_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
