// libs/session-cell/src/router.rs
use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::SessionState;

pub fn session_routes(state: SessionState) -> Router {
    let protected_routes = Router::new()
        .route("/me", get(handlers::get_current_identity))
        .route("/signout", post(handlers::sign_out))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
