pub mod booking;
pub mod clock;
pub mod lifecycle;
pub mod payment;
pub mod relationship;
pub mod store;

pub use booking::AppointmentBookingService;
pub use clock::{ClinicClock, FixedTimeSource, SystemTimeSource, TimeSource};
pub use lifecycle::AppointmentLifecycleService;
pub use payment::{
    PaymentLinkageResolver, PaymentRecordStore, RepresentativePaymentPolicy, SupabasePaymentStore,
};
pub use relationship::{PatientRelationshipLookup, SupabaseRelationshipLookup};
pub use store::{
    AppointmentQuery, AppointmentStore, MemoryAppointmentStore, SortOrder, SupabaseAppointmentStore,
};
