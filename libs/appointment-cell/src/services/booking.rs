// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentDashboard, AppointmentError, AppointmentFilter, AppointmentId,
    AppointmentStatus, AppointmentView, CreateAppointmentRequest, PatientRef, PatientSummary,
    PaymentSummary, PractitionerScope,
};
use crate::services::clock::{ClinicClock, SystemTimeSource, TimeSource};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::payment::{
    PaymentLinkageResolver, PaymentRecordStore, RepresentativePaymentPolicy, SupabasePaymentStore,
};
use crate::services::relationship::{PatientRelationshipLookup, SupabaseRelationshipLookup};
use crate::services::store::{
    AppointmentQuery, AppointmentStore, SortOrder, SupabaseAppointmentStore,
};

/// Create, transition and list appointments within one practitioner's scope.
pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    relationships: Arc<dyn PatientRelationshipLookup>,
    payment_store: Arc<dyn PaymentRecordStore>,
    payments: PaymentLinkageResolver,
    lifecycle_service: AppointmentLifecycleService,
    clock: ClinicClock,
    time_source: Arc<dyn TimeSource>,
    default_amount: f64,
    upcoming_limit: usize,
}

impl AppointmentBookingService {
    /// Service backed by the clinic database, acting with the caller's token.
    pub fn new(config: &AppConfig, auth_token: &str) -> Result<Self, AppointmentError> {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self::with_stores(
            config,
            Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase), auth_token)),
            Arc::new(SupabaseRelationshipLookup::new(Arc::clone(&supabase), auth_token)),
            Arc::new(SupabasePaymentStore::new(supabase, auth_token)),
        )
    }

    pub fn with_stores(
        config: &AppConfig,
        appointments: Arc<dyn AppointmentStore>,
        relationships: Arc<dyn PatientRelationshipLookup>,
        payment_store: Arc<dyn PaymentRecordStore>,
    ) -> Result<Self, AppointmentError> {
        let clock = ClinicClock::new(config.clinic_utc_offset_minutes)?;
        let payments = PaymentLinkageResolver::new(
            Arc::clone(&payment_store),
            RepresentativePaymentPolicy::default(),
            config.default_consultation_amount,
        );

        Ok(Self {
            appointments,
            relationships,
            payment_store,
            payments,
            lifecycle_service: AppointmentLifecycleService::new(),
            clock,
            time_source: Arc::new(SystemTimeSource),
            default_amount: config.default_consultation_amount,
            upcoming_limit: config.upcoming_appointments_limit,
        })
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn with_payment_policy(mut self, policy: RepresentativePaymentPolicy) -> Self {
        self.payments = PaymentLinkageResolver::new(
            Arc::clone(&self.payment_store),
            policy,
            self.default_amount,
        );
        self
    }

    pub fn clock(&self) -> &ClinicClock {
        &self.clock
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Book from clinic-local form input.
    pub async fn book(
        &self,
        scope: PractitionerScope,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let scheduled_at = self.clock.parse_local(&request.date, &request.time)?;
        self.create_appointment(scope, request.patient_id, scheduled_at).await
    }

    /// Validate and persist a new pending appointment. The record is written
    /// in a single insert, so a failure leaves nothing behind.
    pub async fn create_appointment(
        &self,
        scope: PractitionerScope,
        patient: PatientRef,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Creating appointment for patient {} with practitioner {} at {}",
               patient, scope, scheduled_at);

        let now = self.time_source.now();
        if let Err(e) = self.lifecycle_service.validate_schedule(scheduled_at, now) {
            warn!("Rejected appointment at {} (now {})", scheduled_at, now);
            return Err(e);
        }

        if !self.relationships.is_assigned(scope, patient).await? {
            warn!("Practitioner {} attempted to book unassigned patient {}", scope, patient);
            return Err(AppointmentError::UnauthorizedPatient { patient });
        }

        let draft = self.lifecycle_service.new_pending(patient, scope, scheduled_at);
        let appointment = self.appointments.insert(draft).await?;

        info!("Appointment {} created for patient {} with practitioner {}",
              appointment.id, patient, scope);
        Ok(appointment)
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    /// Move an appointment along the lifecycle. The write only lands if the
    /// stored status is still the one that was validated.
    pub async fn transition(
        &self,
        scope: PractitionerScope,
        id: AppointmentId,
        target: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self
            .appointments
            .find(scope, id)
            .await?
            .ok_or(AppointmentError::NotFound(id))?;

        self.lifecycle_service.validate_status_transition(current.status, target)?;

        match self
            .appointments
            .update_status_if(scope, id, current.status, target)
            .await?
        {
            Some(updated) => {
                info!("Appointment {} moved from {} to {}", id, current.status, target);
                Ok(updated)
            }
            None => {
                warn!("Appointment {} changed before {} -> {} could be applied", id, current.status, target);
                Err(AppointmentError::ConcurrentModification(id))
            }
        }
    }

    pub async fn confirm(&self, scope: PractitionerScope, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.transition(scope, id, AppointmentStatus::Confirmed).await
    }

    pub async fn complete(&self, scope: PractitionerScope, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.transition(scope, id, AppointmentStatus::Completed).await
    }

    pub async fn cancel(&self, scope: PractitionerScope, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.transition(scope, id, AppointmentStatus::Cancelled).await
    }

    // ==========================================================================
    // LISTING
    // ==========================================================================

    pub async fn list_appointments(
        &self,
        scope: PractitionerScope,
        filter: AppointmentFilter,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let query = match filter {
            AppointmentFilter::All => AppointmentQuery {
                order: SortOrder::Descending,
                ..Default::default()
            },
            AppointmentFilter::Upcoming => AppointmentQuery {
                statuses: vec![AppointmentStatus::Pending, AppointmentStatus::Confirmed],
                scheduled_from: Some(self.time_source.now()),
                order: SortOrder::Ascending,
                limit: Some(self.upcoming_limit),
            },
        };

        let appointments = self.appointments.query_by_practitioner(scope, &query).await?;
        debug!("Loaded {} appointments for practitioner {}", appointments.len(), scope);

        let mut summaries = self.payments.resolve_many(&appointments).await?;

        let mut patients: Vec<PatientRef> = appointments.iter().map(|a| a.patient).collect();
        patients.sort();
        patients.dedup();
        let names: HashMap<PatientRef, String> = self
            .relationships
            .patient_summaries(&patients)
            .await?
            .into_iter()
            .map(|p| (p.id, p.full_name()))
            .collect();

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let payment = summaries
                    .remove(&appointment.id)
                    .unwrap_or_else(|| self.unpaid_default());
                let patient_name = names.get(&appointment.patient).cloned();
                self.to_view(appointment, patient_name, payment)
            })
            .collect())
    }

    /// Counts over the full listing plus the next page of upcoming appointments
    /// and the number of patients currently assigned.
    pub async fn summarize(&self, scope: PractitionerScope) -> Result<AppointmentDashboard, AppointmentError> {
        let all = self.list_appointments(scope, AppointmentFilter::All).await?;
        let upcoming = self.list_appointments(scope, AppointmentFilter::Upcoming).await?;
        let active_patients = self.relationships.active_patients(scope).await?.len();
        Ok(AppointmentDashboard::from_views(&all, upcoming, active_patients))
    }

    /// Patients the practitioner may book for, optionally narrowed by a
    /// search over names and email.
    pub async fn bookable_patients(
        &self,
        scope: PractitionerScope,
        search: Option<&str>,
    ) -> Result<Vec<PatientSummary>, AppointmentError> {
        let assigned = self.relationships.active_patients(scope).await?;
        let patients = self.relationships.patient_summaries(&assigned).await?;

        Ok(match search {
            Some(search) => patients.into_iter().filter(|p| p.matches(search)).collect(),
            None => patients,
        })
    }

    pub async fn payment_status(&self, appointment: &Appointment) -> Result<PaymentSummary, AppointmentError> {
        self.payments.resolve_payment_status(appointment).await
    }

    fn to_view(
        &self,
        appointment: Appointment,
        patient_name: Option<String>,
        payment: PaymentSummary,
    ) -> AppointmentView {
        let local = self.clock.to_local(appointment.scheduled_at);
        AppointmentView {
            display_date: local.display_date(),
            display_time: local.display_time(),
            local,
            appointment,
            patient_name,
            payment,
        }
    }

    fn unpaid_default(&self) -> PaymentSummary {
        PaymentSummary::unpaid(self.default_amount)
    }
}
