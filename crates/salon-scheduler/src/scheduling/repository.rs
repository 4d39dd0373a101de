use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::domain::{
    Appointment, AppointmentId, AppointmentStatus, CustomerId, Rating, Service, ServiceId,
    Stylist, StylistId,
};

/// Staff directory lookups. The scheduling core never mutates stylists apart from their rating.
pub trait StylistDirectory: Send + Sync {
    fn roster(&self) -> Result<Vec<Stylist>, RepositoryError>;
    fn stylist(&self, id: &StylistId) -> Result<Option<Stylist>, RepositoryError>;
    fn service(&self, id: &ServiceId) -> Result<Option<Service>, RepositoryError>;
    fn update_rating(&self, id: &StylistId, rating: f32) -> Result<(), RepositoryError>;
}

/// Appointment storage. `insert` must reject a second active appointment on the same
/// (stylist, date, time) with [`RepositoryError::Conflict`].
///
/// `transition` is a compare-and-swap: it moves the appointment to `to` and stores
/// `loyalty_points` only while it is still `from`, checked and written under one lock or
/// transaction. A writer that lost the race gets [`RepositoryError::Conflict`] and nothing
/// changes.
pub trait AppointmentStore: Send + Sync {
    fn has_conflict(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, RepositoryError>;
    fn active_on(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError>;
    fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError>;
    fn transition(
        &self,
        id: &AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
        loyalty_points: u32,
    ) -> Result<Appointment, RepositoryError>;
    /// Records that a reminder for `id` went out on `day`. Returns false if one already had.
    fn claim_reminder(&self, id: &AppointmentId, day: NaiveDate) -> Result<bool, RepositoryError>;
    fn fetch(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError>;
    fn for_customer(&self, customer: &CustomerId) -> Result<Vec<Appointment>, RepositoryError>;
    fn for_stylist(&self, stylist: &StylistId) -> Result<Vec<Appointment>, RepositoryError>;
    fn with_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, RepositoryError>;
}

/// Ratings left by customers after completed appointments.
pub trait RatingHistory: Send + Sync {
    fn ratings_given_by(&self, customer: &CustomerId) -> Result<Vec<Rating>, RepositoryError>;
    fn ratings_received_by(&self, stylist: &StylistId) -> Result<Vec<Rating>, RepositoryError>;
    fn rating_for(&self, appointment: &AppointmentId) -> Result<Option<Rating>, RepositoryError>;
    fn insert_rating(&self, rating: Rating) -> Result<Rating, RepositoryError>;
}

/// Customer loyalty balance.
pub trait LoyaltyLedger: Send + Sync {
    fn balance(&self, customer: &CustomerId) -> Result<u32, LedgerError>;
    fn grant_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError>;
    /// Removes up to `points`, never taking the balance below zero. Returns what was removed.
    fn revoke_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError>;
}

/// Everything the booking service reads and writes, usually backed by one database.
pub trait SalonRepository: StylistDirectory + AppointmentStore + RatingHistory + LoyaltyLedger {}

impl<T> SalonRepository for T where
    T: StylistDirectory + AppointmentStore + RatingHistory + LoyaltyLedger
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Loyalty ledger failure.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown customer {0}")]
    UnknownCustomer(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Trait describing outbound notification hooks (in-app inbox, e-mail, SMS adapters).
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: BookingNotification) -> Result<(), NotificationError>;
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Customer(CustomerId),
    Stylist(StylistId),
}

/// Notification payload so adapters and tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingNotification {
    pub template: String,
    pub recipient: Recipient,
    pub appointment_id: AppointmentId,
    pub details: BTreeMap<String, String>,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
