// libs/session-cell/src/handlers.rs
use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::debug;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CurrentIdentity, IdentityError, Principal};
use crate::state::SessionState;

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        let message = err.user_message();
        match err {
            IdentityError::UnresolvedIdentity { .. } => AppError::Forbidden(message),
            IdentityError::ResolutionTransport(_) => AppError::ServiceUnavailable(message),
            IdentityError::NoActiveSession => AppError::Auth(message),
        }
    }
}

/// Resolve the caller's clinic identity, denying access when none exists.
pub async fn current_identity(
    state: &SessionState,
    user: &User,
    token: &str,
) -> Result<CurrentIdentity, AppError> {
    let principal = Principal::new(user.id.clone(), token);
    let current = state
        .registry
        .identity_for(user.session_key(), &principal)
        .await?;
    Ok(current)
}

#[axum::debug_handler]
pub async fn get_current_identity(
    State(state): State<SessionState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Fetching identity for principal {}", user.id);

    let current = current_identity(&state, &user, auth.token()).await?;

    Ok(Json(json!({
        "identity": current.identity,
        "source": current.source,
        "role": current.identity.role(),
        "display_name": current.identity.display_name()
    })))
}

#[axum::debug_handler]
pub async fn sign_out(
    State(state): State<SessionState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    state.registry.sign_out(user.session_key());

    Ok(Json(json!({
        "success": true,
        "message": "Signed out"
    })))
}
