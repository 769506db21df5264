// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::{debug, error};

use session_cell::handlers::current_identity;
use session_cell::SessionState;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentId, AppointmentPartitions, AppointmentStatus,
    CreateAppointmentRequest, ListAppointmentsQuery, ListPatientsQuery, PractitionerScope,
    TransitionRequest,
};
use crate::services::booking::AppointmentBookingService;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.user_message();
        match err {
            AppointmentError::UnauthorizedPatient { .. } | AppointmentError::NotAPractitioner => {
                AppError::Forbidden(message)
            }
            AppointmentError::PastSchedule { .. } | AppointmentError::InvalidLocalDateTime(_) => {
                AppError::ValidationError(message)
            }
            AppointmentError::InvalidTransition { .. } | AppointmentError::ConcurrentModification(_) => {
                AppError::Conflict(message)
            }
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::Persistence(_) => AppError::ServiceUnavailable(message),
            AppointmentError::Misconfigured(detail) => {
                error!("Appointment service misconfigured: {}", detail);
                AppError::Internal(message)
            }
        }
    }
}

/// Resolve the caller to a practitioner scope and build a service acting with
/// their token.
async fn practitioner_context(
    state: &SessionState,
    user: &User,
    token: &str,
) -> Result<(PractitionerScope, AppointmentBookingService), AppError> {
    let current = current_identity(state, user, token).await?;
    let scope = current
        .identity
        .practitioner_scope()
        .ok_or(AppointmentError::NotAPractitioner)?;

    let service = AppointmentBookingService::new(&state.config, token)?;
    Ok((scope, service))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<SessionState>,
    Query(query): Query<ListAppointmentsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;
    debug!("Listing {:?} appointments for practitioner {}", query.view, scope);

    let appointments = service.list_appointments(scope, query.view).await?;
    let partitions = AppointmentPartitions::from_views(&appointments);

    Ok(Json(json!({
        "appointments": appointments,
        "pending": partitions.pending,
        "completed": partitions.completed,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<SessionState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;

    let appointment = service.book(scope, &request).await?;
    let local = service.clock().to_local(appointment.scheduled_at);

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "appointment": appointment,
        "local": local,
        "message": "Appointment booked successfully"
    }))))
}

#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<SessionState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;

    let appointment = service
        .transition(scope, AppointmentId(appointment_id), request.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment marked {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<SessionState>,
    Path(appointment_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;

    let appointment = service.complete(scope, AppointmentId(appointment_id)).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment marked {}", AppointmentStatus::Completed)
    })))
}

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<SessionState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;

    let dashboard = service.summarize(scope).await?;

    Ok(Json(json!(dashboard)))
}

#[axum::debug_handler]
pub async fn list_bookable_patients(
    State(state): State<SessionState>,
    Query(query): Query<ListPatientsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (scope, service) = practitioner_context(&state, &user, auth.token()).await?;

    let patients = service.bookable_patients(scope, query.search.as_deref()).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}
