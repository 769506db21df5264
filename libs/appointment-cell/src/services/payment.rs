// libs/appointment-cell/src/services/payment.rs
use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    AmountSource, Appointment, AppointmentError, AppointmentId, Payment, PaymentRow,
    PaymentStatus, PaymentSummary,
};

/// Read-only access to payment records.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// All payments referencing any of the given appointments, in one batch.
    async fn payments_for(&self, appointments: &[AppointmentId]) -> Result<Vec<Payment>, AppointmentError>;
}

pub struct SupabasePaymentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabasePaymentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }
}

#[async_trait]
impl PaymentRecordStore for SupabasePaymentStore {
    async fn payments_for(&self, appointments: &[AppointmentId]) -> Result<Vec<Payment>, AppointmentError> {
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = appointments.iter().map(|id| id.to_string()).collect();
        let path = format!(
            "/rest/v1/pagos?id_cita=in.({})&select=id_pago,id_cita,monto,estado,fecha_pago",
            ids.join(",")
        );
        debug!("Fetching payments for {} appointments", appointments.len());

        let rows: Vec<PaymentRow> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.auth_token),
            None,
        ).await.map_err(|e| {
            error!("Payment lookup failed: {}", e);
            AppointmentError::Persistence(e.to_string())
        })?;

        Ok(rows.into_iter().map(Payment::from).collect())
    }
}

/// How one payment is chosen when an appointment has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepresentativePaymentPolicy {
    /// A completed payment wins; among those the latest `paid_at`, then the
    /// highest id. With no completed payment, the most recent of any status.
    #[default]
    MostRecentCompleted,
    /// Whatever the store returned first. The paid flag still reflects every
    /// record.
    FirstFound,
}

impl RepresentativePaymentPolicy {
    pub fn choose<'a>(&self, payments: &'a [Payment]) -> Option<&'a Payment> {
        match self {
            RepresentativePaymentPolicy::FirstFound => payments.first(),
            RepresentativePaymentPolicy::MostRecentCompleted => {
                let recency = |p: &&Payment| (p.paid_at, p.id);
                payments
                    .iter()
                    .filter(|p| p.status == PaymentStatus::Completed)
                    .max_by_key(recency)
                    .or_else(|| payments.iter().max_by_key(recency))
            }
        }
    }
}

/// Derives the paid flag and display amount for appointments.
pub struct PaymentLinkageResolver {
    store: Arc<dyn PaymentRecordStore>,
    policy: RepresentativePaymentPolicy,
    default_amount: f64,
}

impl PaymentLinkageResolver {
    pub fn new(
        store: Arc<dyn PaymentRecordStore>,
        policy: RepresentativePaymentPolicy,
        default_amount: f64,
    ) -> Self {
        Self {
            store,
            policy,
            default_amount,
        }
    }

    pub async fn resolve_payment_status(&self, appointment: &Appointment) -> Result<PaymentSummary, AppointmentError> {
        let payments = self.store.payments_for(&[appointment.id]).await?;
        let linked: Vec<Payment> = payments
            .into_iter()
            .filter(|p| p.appointment == Some(appointment.id))
            .collect();
        Ok(self.summarize(&linked))
    }

    /// One batched lookup for a whole listing.
    pub async fn resolve_many(
        &self,
        appointments: &[Appointment],
    ) -> Result<HashMap<AppointmentId, PaymentSummary>, AppointmentError> {
        let ids: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
        let payments = self.store.payments_for(&ids).await?;

        let mut by_appointment: HashMap<AppointmentId, Vec<Payment>> = HashMap::new();
        for payment in payments {
            if let Some(id) = payment.appointment {
                by_appointment.entry(id).or_default().push(payment);
            }
        }

        Ok(ids
            .into_iter()
            .map(|id| {
                let linked = by_appointment.get(&id).map(Vec::as_slice).unwrap_or(&[]);
                (id, self.summarize(linked))
            })
            .collect())
    }

    // Any completed record makes the appointment paid; the policy only picks
    // the record whose amount is shown.
    fn summarize(&self, payments: &[Payment]) -> PaymentSummary {
        let paid = payments.iter().any(|p| p.status == PaymentStatus::Completed);
        match self.policy.choose(payments) {
            Some(payment) => PaymentSummary {
                paid,
                amount: payment.amount,
                payment_id: Some(payment.id),
                amount_source: AmountSource::Payment,
            },
            None => PaymentSummary::unpaid(self.default_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, Modality, PatientRef, PaymentId, PractitionerScope};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct StubPayments {
        payments: Vec<Payment>,
        calls: Mutex<Vec<Vec<AppointmentId>>>,
    }

    impl StubPayments {
        fn new(payments: Vec<Payment>) -> Arc<Self> {
            Arc::new(Self { payments, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl PaymentRecordStore for StubPayments {
        async fn payments_for(&self, appointments: &[AppointmentId]) -> Result<Vec<Payment>, AppointmentError> {
            self.calls.lock().unwrap().push(appointments.to_vec());
            Ok(self.payments
                .iter()
                .filter(|p| p.appointment.map_or(false, |id| appointments.contains(&id)))
                .cloned()
                .collect())
        }
    }

    fn payment(id: i64, appointment: i64, amount: f64, status: PaymentStatus, day: Option<u32>) -> Payment {
        Payment {
            id: PaymentId(id),
            appointment: Some(AppointmentId(appointment)),
            amount,
            status,
            paid_at: day.map(|d| Utc.with_ymd_and_hms(2026, 1, d, 12, 0, 0).unwrap()),
        }
    }

    fn appointment(id: i64) -> Appointment {
        Appointment {
            id: AppointmentId(id),
            patient: PatientRef(9),
            practitioner: PractitionerScope(42),
            scheduled_at: Utc.with_ymd_and_hms(2026, 1, 20, 17, 0, 0).unwrap(),
            duration_minutes: 60,
            modality: Modality::InPerson,
            status: AppointmentStatus::Completed,
        }
    }

    fn resolver(store: Arc<StubPayments>) -> PaymentLinkageResolver {
        PaymentLinkageResolver::new(store, RepresentativePaymentPolicy::default(), 800.0)
    }

    #[tokio::test]
    async fn completed_payment_marks_appointment_paid() {
        let store = StubPayments::new(vec![payment(1, 7, 650.0, PaymentStatus::Completed, Some(5))]);
        let summary = resolver(store).resolve_payment_status(&appointment(7)).await.unwrap();

        assert!(summary.paid);
        assert_eq!(summary.amount, 650.0);
        assert_eq!(summary.amount_source, AmountSource::Payment);
    }

    #[tokio::test]
    async fn missing_payment_falls_back_to_clinic_default() {
        let store = StubPayments::new(vec![]);
        let summary = resolver(store).resolve_payment_status(&appointment(7)).await.unwrap();

        assert!(!summary.paid);
        assert_eq!(summary.amount, 800.0);
        assert_eq!(summary.payment_id, None);
        assert_eq!(summary.amount_source, AmountSource::ClinicDefault);
    }

    #[tokio::test]
    async fn pending_payment_shows_its_amount_unpaid() {
        let store = StubPayments::new(vec![payment(1, 7, 500.0, PaymentStatus::Pending, None)]);
        let summary = resolver(store).resolve_payment_status(&appointment(7)).await.unwrap();

        assert!(!summary.paid);
        assert_eq!(summary.amount, 500.0);
    }

    #[tokio::test]
    async fn completed_payment_wins_over_newer_failure() {
        let store = StubPayments::new(vec![
            payment(1, 7, 700.0, PaymentStatus::Completed, Some(3)),
            payment(2, 7, 700.0, PaymentStatus::Failed, Some(9)),
        ]);
        let summary = resolver(store).resolve_payment_status(&appointment(7)).await.unwrap();

        assert!(summary.paid);
        assert_eq!(summary.payment_id, Some(PaymentId(1)));
    }

    #[test]
    fn policy_breaks_ties_by_recency_then_id() {
        let payments = vec![
            payment(4, 7, 100.0, PaymentStatus::Completed, Some(3)),
            payment(5, 7, 200.0, PaymentStatus::Completed, Some(8)),
            payment(6, 7, 300.0, PaymentStatus::Completed, Some(8)),
            payment(9, 7, 400.0, PaymentStatus::Refunded, Some(20)),
        ];
        let chosen = RepresentativePaymentPolicy::MostRecentCompleted.choose(&payments).unwrap();
        assert_eq!(chosen.id, PaymentId(6));

        let first = RepresentativePaymentPolicy::FirstFound.choose(&payments).unwrap();
        assert_eq!(first.id, PaymentId(4));
    }

    #[test]
    fn without_completed_payments_most_recent_is_shown() {
        let payments = vec![
            payment(1, 7, 100.0, PaymentStatus::Failed, Some(3)),
            payment(2, 7, 200.0, PaymentStatus::Refunded, Some(6)),
        ];
        let chosen = RepresentativePaymentPolicy::default().choose(&payments).unwrap();
        assert_eq!(chosen.id, PaymentId(2));
    }

    #[tokio::test]
    async fn first_found_policy_is_paid_when_any_record_completed() {
        let store = StubPayments::new(vec![
            payment(1, 7, 300.0, PaymentStatus::Failed, Some(2)),
            payment(2, 7, 650.0, PaymentStatus::Completed, Some(4)),
        ]);
        let resolver = PaymentLinkageResolver::new(store, RepresentativePaymentPolicy::FirstFound, 800.0);

        let summary = resolver.resolve_payment_status(&appointment(7)).await.unwrap();

        assert!(summary.paid);
        assert_eq!(summary.amount, 300.0);
        assert_eq!(summary.payment_id, Some(PaymentId(1)));
    }

    #[tokio::test]
    async fn listing_resolves_payments_in_one_batch() {
        let store = StubPayments::new(vec![
            payment(1, 7, 650.0, PaymentStatus::Completed, Some(5)),
            payment(2, 8, 650.0, PaymentStatus::Pending, None),
        ]);
        let summaries = resolver(store.clone())
            .resolve_many(&[appointment(7), appointment(8), appointment(9)])
            .await
            .unwrap();

        assert_eq!(store.calls.lock().unwrap().len(), 1);
        assert!(summaries[&AppointmentId(7)].paid);
        assert!(!summaries[&AppointmentId(8)].paid);
        assert_eq!(summaries[&AppointmentId(9)].amount_source, AmountSource::ClinicDefault);
    }
}
