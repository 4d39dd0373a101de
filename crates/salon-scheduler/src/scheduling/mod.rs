//! Stylist assignment, slot discovery, and appointment lifecycle for salon bookings.
//!
//! Everything here reads and writes through the collaborator traits in [`repository`]; the
//! decision functions hold no state of their own, and the storage layer is the only arbiter
//! of slot ownership between concurrent bookings.

pub mod assignment;
pub mod availability;
mod config;
pub mod domain;
pub mod lifecycle;
pub mod preference;
pub mod repository;
pub mod roster;
pub mod router;
pub mod service;
pub mod slot_search;
pub mod suggestion;
pub mod sweep;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentDecision, AssignmentError, AssignmentPolicy};
pub use availability::{AvailabilityIndex, ConflictRule};
pub use config::SchedulingConfig;
pub use domain::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentView, CandidateSlot, CustomerId,
    Rating, Service, ServiceId, SlotKey, Stylist, StylistId,
};
pub use lifecycle::{LifecycleError, LifecycleEvent, LoyaltyPolicy};
pub use preference::{PreferenceResolver, PreferredStylist};
pub use repository::{
    AppointmentStore, BookingNotification, LedgerError, LoyaltyLedger, NotificationError,
    NotificationSink, RatingHistory, Recipient, RepositoryError, SalonRepository,
    StylistDirectory,
};
pub use roster::{Roster, RosterImportError, RosterImporter};
pub use router::{booking_router, parse_date, parse_time};
pub use service::{
    Agenda, BookingOutcome, BookingRequest, BookingService, BookingServiceError, RatingSubmission,
    TransitionOutcome,
};
pub use slot_search::{BusinessHours, SlotSearch};
pub use suggestion::SuggestedBooking;
pub use sweep::{sweep_due_appointments, ReminderReport, SweepReport};
