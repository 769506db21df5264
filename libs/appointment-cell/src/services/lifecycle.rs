// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{
    AppointmentError, AppointmentStatus, Modality, NewAppointment, PatientRef, PractitionerScope,
    DEFAULT_DURATION_MINUTES,
};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// A booking at exactly the current instant is still allowed.
    pub fn validate_schedule(
        &self,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if scheduled_at < now {
            return Err(AppointmentError::PastSchedule { scheduled_at });
        }
        Ok(())
    }

    /// Every appointment enters the lifecycle as pending.
    pub fn new_pending(
        &self,
        patient: PatientRef,
        practitioner: PractitionerScope,
        scheduled_at: DateTime<Utc>,
    ) -> NewAppointment {
        NewAppointment {
            patient,
            practitioner,
            scheduled_at,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            modality: Modality::InPerson,
            status: AppointmentStatus::Pending,
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
