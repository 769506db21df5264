// libs/appointment-cell/src/services/relationship.rs
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, error};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentError, PatientRef, PatientRow, PatientSummary, PractitionerScope, RelationshipRow,
};

/// Which patients a practitioner currently treats, and who they are.
#[async_trait]
pub trait PatientRelationshipLookup: Send + Sync {
    async fn active_patients(&self, scope: PractitionerScope) -> Result<Vec<PatientRef>, AppointmentError>;

    /// Contact details for the given patients, in one batch, ordered by id.
    /// Patients without a record are left out.
    async fn patient_summaries(&self, patients: &[PatientRef]) -> Result<Vec<PatientSummary>, AppointmentError>;

    async fn is_assigned(&self, scope: PractitionerScope, patient: PatientRef) -> Result<bool, AppointmentError> {
        Ok(self.active_patients(scope).await?.contains(&patient))
    }
}

pub struct SupabaseRelationshipLookup {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseRelationshipLookup {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<PatientRef>, AppointmentError> {
        let rows: Vec<RelationshipRow> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.auth_token),
            None,
        ).await.map_err(|e| {
            error!("Relationship lookup failed: {}", e);
            AppointmentError::Persistence(e.to_string())
        })?;

        let mut patients: Vec<PatientRef> = rows.into_iter().map(|r| PatientRef(r.id_paciente)).collect();
        patients.sort();
        patients.dedup();
        Ok(patients)
    }
}

#[async_trait]
impl PatientRelationshipLookup for SupabaseRelationshipLookup {
    async fn active_patients(&self, scope: PractitionerScope) -> Result<Vec<PatientRef>, AppointmentError> {
        debug!("Fetching active patients for practitioner {}", scope);

        let path = format!(
            "/rest/v1/paciente_nutriologo?id_nutriologo=eq.{}&activo=eq.true&select=id_paciente",
            scope
        );
        self.fetch(&path).await
    }

    async fn is_assigned(&self, scope: PractitionerScope, patient: PatientRef) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/paciente_nutriologo?id_nutriologo=eq.{}&id_paciente=eq.{}&activo=eq.true&select=id_paciente&limit=1",
            scope, patient
        );
        Ok(!self.fetch(&path).await?.is_empty())
    }

    async fn patient_summaries(&self, patients: &[PatientRef]) -> Result<Vec<PatientSummary>, AppointmentError> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = patients.iter().map(|p| p.to_string()).collect();
        let path = format!(
            "/rest/v1/pacientes?id_paciente=in.({})&select=id_paciente,nombre,apellido,correo",
            ids.join(",")
        );
        debug!("Fetching {} patient records", patients.len());

        let rows: Vec<PatientRow> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.auth_token),
            None,
        ).await.map_err(|e| {
            error!("Patient lookup failed: {}", e);
            AppointmentError::Persistence(e.to_string())
        })?;

        let mut summaries: Vec<PatientSummary> = rows.into_iter().map(PatientSummary::from).collect();
        summaries.sort_by_key(|p| p.id);
        summaries.dedup_by_key(|p| p.id);
        Ok(summaries)
    }
}
