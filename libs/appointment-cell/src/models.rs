// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use session_cell::models::PractitionerScope;

/// Fixed length of a consultation.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

// ==============================================================================
// IDENTIFIERS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRef(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub i64);

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PatientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient: PatientRef,
    pub practitioner: PractitionerScope,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub modality: Modality,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

/// An appointment that has passed validation but has no store identifier yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub patient: PatientRef,
    pub practitioner: PractitionerScope,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub modality: Modality,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Still on the agenda: waiting for or holding a confirmed slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_store_value(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pendiente",
            AppointmentStatus::Confirmed => "confirmada",
            AppointmentStatus::Completed => "completada",
            AppointmentStatus::Cancelled => "cancelada",
        }
    }

    pub fn from_store_value(value: &str) -> Result<Self, AppointmentError> {
        match value {
            "pendiente" => Ok(AppointmentStatus::Pending),
            "confirmada" => Ok(AppointmentStatus::Confirmed),
            "completada" => Ok(AppointmentStatus::Completed),
            "cancelada" => Ok(AppointmentStatus::Cancelled),
            other => Err(AppointmentError::Persistence(format!(
                "Unknown appointment status '{}'", other
            ))),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    InPerson,
    Remote,
}

impl Modality {
    pub fn as_store_value(&self) -> &'static str {
        match self {
            Modality::InPerson => "presencial",
            Modality::Remote => "en_linea",
        }
    }

    pub fn from_store_value(value: &str) -> Result<Self, AppointmentError> {
        match value {
            "presencial" => Ok(Modality::InPerson),
            "en_linea" => Ok(Modality::Remote),
            other => Err(AppointmentError::Persistence(format!(
                "Unknown appointment modality '{}'", other
            ))),
        }
    }
}

// ==============================================================================
// PATIENT MODELS
// ==============================================================================

/// Contact details shown when picking or listing a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: PatientRef,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl PatientSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Case-insensitive match on first name, last name or email.
    pub fn matches(&self, search: &str) -> bool {
        let needle = search.trim().to_lowercase();
        needle.is_empty()
            || self.first_name.to_lowercase().contains(&needle)
            || self.last_name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
    }
}

// ==============================================================================
// PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub appointment: Option<AppointmentId>,
    pub amount: f64,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
    Failed,
    Other(String),
}

impl PaymentStatus {
    pub fn from_store_value(value: &str) -> Self {
        match value {
            "pendiente" => PaymentStatus::Pending,
            "completado" => PaymentStatus::Completed,
            "reembolsado" => PaymentStatus::Refunded,
            "fallido" => PaymentStatus::Failed,
            other => PaymentStatus::Other(other.to_string()),
        }
    }
}

/// Where a displayed amount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSource {
    Payment,
    ClinicDefault,
}

/// Paid/unpaid flag and amount shown next to an appointment. Display-only;
/// never written back to any record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub paid: bool,
    pub amount: f64,
    pub payment_id: Option<PaymentId>,
    pub amount_source: AmountSource,
}

impl PaymentSummary {
    /// No payment on record: unpaid, showing the clinic's default amount.
    pub fn unpaid(default_amount: f64) -> Self {
        Self {
            paid: false,
            amount: default_amount,
            payment_id: None,
            amount_source: AmountSource::ClinicDefault,
        }
    }
}

// ==============================================================================
// LISTING MODELS
// ==============================================================================

/// Wall-clock values in the clinic's fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDateTime {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl LocalDateTime {
    pub fn display_date(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn display_time(&self) -> String {
        self.time.format("%I:%M %p").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentView {
    pub appointment: Appointment,
    /// `None` when the patient record could not be found.
    pub patient_name: Option<String>,
    pub local: LocalDateTime,
    pub display_date: String,
    pub display_time: String,
    pub payment: PaymentSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentFilter {
    /// Every appointment in scope, newest first.
    #[default]
    All,
    /// Active appointments from now on, soonest first, capped to a page.
    Upcoming,
}

/// Dashboard partitions derived from one listing. Cancelled appointments
/// belong to neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppointmentPartitions {
    pub pending: Vec<AppointmentView>,
    pub completed: Vec<AppointmentView>,
}

impl AppointmentPartitions {
    pub fn from_views(views: &[AppointmentView]) -> Self {
        let mut partitions = Self::default();
        for view in views {
            match view.appointment.status {
                AppointmentStatus::Pending | AppointmentStatus::Confirmed => {
                    partitions.pending.push(view.clone())
                }
                AppointmentStatus::Completed => partitions.completed.push(view.clone()),
                AppointmentStatus::Cancelled => {}
            }
        }
        partitions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusBreakdown {
    pub pending: usize,
    pub confirmed: usize,
    pub completed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDashboard {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub by_status: StatusBreakdown,
    pub active_patients: usize,
    pub upcoming: Vec<AppointmentView>,
}

impl AppointmentDashboard {
    pub fn from_views(
        views: &[AppointmentView],
        upcoming: Vec<AppointmentView>,
        active_patients: usize,
    ) -> Self {
        let mut by_status = StatusBreakdown::default();
        for view in views {
            match view.appointment.status {
                AppointmentStatus::Pending => by_status.pending += 1,
                AppointmentStatus::Confirmed => by_status.confirmed += 1,
                AppointmentStatus::Completed => by_status.completed += 1,
                AppointmentStatus::Cancelled => by_status.cancelled += 1,
            }
        }

        Self {
            total: views.len(),
            active: by_status.pending + by_status.confirmed,
            completed: by_status.completed,
            cancelled: by_status.cancelled,
            by_status,
            active_patients,
            upcoming,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Booking form input: clinic-local date (`YYYY-MM-DD`) and time (`HH:MM`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: PatientRef,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListPatientsQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListAppointmentsQuery {
    #[serde(default)]
    pub view: AppointmentFilter,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Patient {patient} is not assigned to this practitioner")]
    UnauthorizedPatient { patient: PatientRef },

    #[error("Appointment time {scheduled_at} has already passed")]
    PastSchedule { scheduled_at: DateTime<Utc> },

    #[error("Cannot change appointment from {from} to {to}")]
    InvalidTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Invalid clinic-local date or time: {0}")]
    InvalidLocalDateTime(String),

    #[error("Appointment {0} not found")]
    NotFound(AppointmentId),

    #[error("Appointment {0} was modified by another request")]
    ConcurrentModification(AppointmentId),

    #[error("Only practitioners can manage appointments")]
    NotAPractitioner,

    #[error("Appointment store error: {0}")]
    Persistence(String),

    #[error("Invalid clinic configuration: {0}")]
    Misconfigured(String),
}

impl AppointmentError {
    /// Infrastructure failures the caller may retry with backoff. Validation
    /// and authorization failures are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppointmentError::Persistence(_) | AppointmentError::ConcurrentModification(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            AppointmentError::UnauthorizedPatient { .. } => {
                "This patient is not assigned to you.".to_string()
            }
            AppointmentError::PastSchedule { .. } => {
                "Appointments cannot be scheduled in the past.".to_string()
            }
            AppointmentError::InvalidTransition { from, to } => {
                format!("An appointment that is {} cannot be marked {}.", from, to)
            }
            AppointmentError::InvalidLocalDateTime(detail) => {
                format!("The date or time entered is not valid: {}.", detail)
            }
            AppointmentError::NotFound(_) => "Appointment not found.".to_string(),
            AppointmentError::ConcurrentModification(_) => {
                "The appointment changed while you were editing it. Reload and try again.".to_string()
            }
            AppointmentError::NotAPractitioner => {
                "Only practitioners can manage appointments.".to_string()
            }
            AppointmentError::Persistence(_) => {
                "Something went wrong saving or loading appointments. Please try again.".to_string()
            }
            AppointmentError::Misconfigured(_) => {
                "The clinic is not configured correctly. Please contact support.".to_string()
            }
        }
    }
}

// ==============================================================================
// STORE ROWS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentRow {
    pub id_cita: i64,
    pub id_paciente: i64,
    pub id_nutriologo: i64,
    #[serde(deserialize_with = "deserialize_instant")]
    pub fecha_hora: DateTime<Utc>,
    pub estado: String,
    pub duracion_minutos: Option<i32>,
    pub tipo_cita: Option<String>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = AppointmentError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let duration_minutes = match row.duracion_minutos {
            Some(minutes) if minutes > 0 => minutes as u32,
            Some(minutes) => {
                return Err(AppointmentError::Persistence(format!(
                    "Appointment {} has non-positive duration {}", row.id_cita, minutes
                )))
            }
            None => DEFAULT_DURATION_MINUTES,
        };

        let modality = match row.tipo_cita.as_deref() {
            Some(value) => Modality::from_store_value(value)?,
            None => Modality::default(),
        };

        Ok(Appointment {
            id: AppointmentId(row.id_cita),
            patient: PatientRef(row.id_paciente),
            practitioner: PractitionerScope(row.id_nutriologo),
            scheduled_at: row.fecha_hora,
            duration_minutes,
            modality,
            status: AppointmentStatus::from_store_value(&row.estado)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRow {
    pub id_pago: i64,
    pub id_cita: Option<i64>,
    pub monto: Option<f64>,
    pub estado: String,
    #[serde(default, deserialize_with = "deserialize_optional_instant")]
    pub fecha_pago: Option<DateTime<Utc>>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: PaymentId(row.id_pago),
            appointment: row.id_cita.map(AppointmentId),
            amount: row.monto.unwrap_or(0.0).max(0.0),
            status: PaymentStatus::from_store_value(&row.estado),
            paid_at: row.fecha_pago,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipRow {
    pub id_paciente: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientRow {
    pub id_paciente: i64,
    pub nombre: Option<String>,
    pub apellido: Option<String>,
    pub correo: Option<String>,
}

impl From<PatientRow> for PatientSummary {
    fn from(row: PatientRow) -> Self {
        PatientSummary {
            id: PatientRef(row.id_paciente),
            first_name: row.nombre.unwrap_or_default(),
            last_name: row.apellido.unwrap_or_default(),
            email: row.correo.unwrap_or_default(),
        }
    }
}

/// Parse a stored timestamp. Columns with a time zone carry an offset; columns
/// without one are UTC by convention.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    if let Ok(with_offset) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(with_offset.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_instant(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn deserialize_optional_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_instant(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
        None => Ok(None),
    }
}
