// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentId, AppointmentRow, AppointmentStatus,
    NewAppointment, PractitionerScope,
};

const APPOINTMENT_COLUMNS: &str =
    "id_cita,id_paciente,id_nutriologo,fecha_hora,estado,duracion_minutos,tipo_cita";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Listing query within one practitioner's scope. Results are ordered by
/// scheduled instant, ties broken by id in the same direction.
#[derive(Debug, Clone, Default)]
pub struct AppointmentQuery {
    pub statuses: Vec<AppointmentStatus>,
    pub scheduled_from: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl AppointmentQuery {
    fn matches(&self, appointment: &Appointment) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
            && self.scheduled_from.map_or(true, |from| appointment.scheduled_at >= from)
    }
}

/// Durable home of appointment records. Every read and write is filtered by
/// the practitioner scope it is given.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    async fn find(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Unconditional write; the last writer wins.
    async fn update_status(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError>;

    /// Write only if the stored status still equals `expected`. `None` means
    /// the record was not in that state (or does not exist in scope).
    async fn update_status_if(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn query_by_practitioner(
        &self,
        scope: PractitionerScope,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let extra_headers = if body.is_some() {
            Some(SupabaseClient::representation_headers())
        } else {
            None
        };

        let rows: Vec<Value> = self.supabase.request_with_headers(
            method,
            path,
            Some(&self.auth_token),
            body,
            extra_headers,
        ).await.map_err(|e| {
            error!("Appointment store request to {} failed: {}", path, e);
            AppointmentError::Persistence(e.to_string())
        })?;

        rows.into_iter()
            .map(|row| {
                let row: AppointmentRow = serde_json::from_value(row)
                    .map_err(|e| AppointmentError::Persistence(format!("Failed to parse appointment: {}", e)))?;
                Appointment::try_from(row)
            })
            .collect()
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        debug!("Inserting appointment for patient {} with practitioner {}",
               appointment.patient, appointment.practitioner);

        let body = json!({
            "id_paciente": appointment.patient,
            "id_nutriologo": appointment.practitioner,
            "fecha_hora": appointment.scheduled_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "estado": appointment.status.as_store_value(),
            "duracion_minutos": appointment.duration_minutes,
            "tipo_cita": appointment.modality.as_store_value(),
        });

        let path = format!("/rest/v1/citas?select={}", APPOINTMENT_COLUMNS);
        self.send(Method::POST, &path, Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Persistence("Insert returned no appointment".to_string()))
    }

    async fn find(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/citas?id_cita=eq.{}&id_nutriologo=eq.{}&select={}&limit=1",
            id, scope, APPOINTMENT_COLUMNS
        );
        Ok(self.send(Method::GET, &path, None).await?.into_iter().next())
    }

    async fn update_status(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/citas?id_cita=eq.{}&id_nutriologo=eq.{}&select={}",
            id, scope, APPOINTMENT_COLUMNS
        );
        let body = json!({ "estado": status.as_store_value() });

        self.send(Method::PATCH, &path, Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound(id))
    }

    async fn update_status_if(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/citas?id_cita=eq.{}&id_nutriologo=eq.{}&estado=eq.{}&select={}",
            id, scope, expected.as_store_value(), APPOINTMENT_COLUMNS
        );
        let body = json!({ "estado": status.as_store_value() });

        Ok(self.send(Method::PATCH, &path, Some(body)).await?.into_iter().next())
    }

    async fn query_by_practitioner(
        &self,
        scope: PractitionerScope,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("id_nutriologo=eq.{}", scope),
            format!("select={}", APPOINTMENT_COLUMNS),
        ];

        if !query.statuses.is_empty() {
            let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_store_value()).collect();
            query_parts.push(format!("estado=in.({})", statuses.join(",")));
        }
        if let Some(from) = query.scheduled_from {
            query_parts.push(format!("fecha_hora=gte.{}", format_instant(from)));
        }

        let direction = match query.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        query_parts.push(format!("order=fecha_hora.{0},id_cita.{0}", direction));

        if let Some(limit) = query.limit {
            query_parts.push(format!("limit={}", limit));
        }

        let path = format!("/rest/v1/citas?{}", query_parts.join("&"));
        debug!("Querying appointments for practitioner {}", scope);

        let appointments = self.send(Method::GET, &path, None).await?;

        // Never hand back rows outside the requested scope.
        let (owned, foreign): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|a| a.practitioner == scope);
        if !foreign.is_empty() {
            error!("Dropped {} appointments outside practitioner scope {}", foreign.len(), scope);
        }
        Ok(owned)
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Process-local store with the same scoping and compare-and-set semantics as
/// the database adapter.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    inner: Mutex<MemoryAppointments>,
}

#[derive(Default)]
struct MemoryAppointments {
    next_id: i64,
    records: Vec<Appointment>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record, keeping its id.
    pub fn seed(&self, appointment: Appointment) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id = inner.next_id.max(appointment.id.0);
        inner.records.retain(|a| a.id != appointment.id);
        inner.records.push(appointment);
    }

    /// Overwrite a status directly, as another writer would.
    pub fn set_status(&self, id: AppointmentId, status: AppointmentStatus) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = inner.records.iter_mut().find(|a| a.id == id) {
            record.status = status;
        }
    }

    pub fn get(&self, id: AppointmentId) -> Option<Appointment> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.records.iter().find(|a| a.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let record = Appointment {
            id: AppointmentId(inner.next_id),
            patient: appointment.patient,
            practitioner: appointment.practitioner,
            scheduled_at: appointment.scheduled_at,
            duration_minutes: appointment.duration_minutes,
            modality: appointment.modality,
            status: appointment.status,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn find(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.records.iter().find(|a| a.id == id && a.practitioner == scope).cloned())
    }

    async fn update_status(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let record = inner
            .records
            .iter_mut()
            .find(|a| a.id == id && a.practitioner == scope)
            .ok_or(AppointmentError::NotFound(id))?;
        record.status = status;
        Ok(record.clone())
    }

    async fn update_status_if(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner
            .records
            .iter_mut()
            .find(|a| a.id == id && a.practitioner == scope && a.status == expected)
        {
            Some(record) => {
                record.status = status;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn query_by_practitioner(
        &self,
        scope: PractitionerScope,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<Appointment> = inner
            .records
            .iter()
            .filter(|a| a.practitioner == scope && query.matches(a))
            .cloned()
            .collect();

        results.sort_by_key(|a| (a.scheduled_at, a.id));
        if query.order == SortOrder::Descending {
            results.reverse();
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}
