use std::collections::BTreeSet;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for salon customers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// Identifier wrapper for stylists in the staff directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StylistId(pub String);

/// Identifier wrapper for bookable services.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// Identifier wrapper for stored appointments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

impl fmt::Display for StylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An offering on the salon menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub duration_minutes: u32,
}

impl Service {
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Staff member as seen by the scheduling core. The directory owns it; the core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stylist {
    pub id: StylistId,
    pub name: String,
    pub expertise: BTreeSet<ServiceId>,
    pub rating: f32,
    pub on_duty: bool,
}

impl Stylist {
    pub fn qualified_for(&self, service: &ServiceId) -> bool {
        self.expertise.contains(service)
    }
}

/// High level status tracked throughout an appointment's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    /// Pending and confirmed appointments hold their (stylist, date, time) slot exclusively.
    pub const fn holds_slot(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }
}

/// The bookable unit a stylist can hold at most once while active.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub stylist_id: StylistId,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Stored appointment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub customer_id: CustomerId,
    pub stylist_id: Option<StylistId>,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    /// Loyalty points granted for this appointment and not yet revoked.
    pub loyalty_points: u32,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn slot(&self) -> Option<SlotKey> {
        self.stylist_id.as_ref().map(|stylist_id| SlotKey {
            stylist_id: stylist_id.clone(),
            date: self.date,
            time: self.time,
        })
    }

    pub fn status_view(&self) -> AppointmentView {
        AppointmentView {
            appointment_id: self.id.clone(),
            customer_id: self.customer_id.clone(),
            stylist_id: self.stylist_id.clone(),
            service_id: self.service_id.clone(),
            date: self.date,
            time: self.time,
            status: self.status.label(),
            loyalty_points: self.loyalty_points,
        }
    }
}

/// Sanitized representation of an appointment for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppointmentView {
    pub appointment_id: AppointmentId,
    pub customer_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylist_id: Option<StylistId>,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: &'static str,
    pub loyalty_points: u32,
}

/// Customer feedback attached to a completed appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub appointment_id: AppointmentId,
    pub customer_id: CustomerId,
    pub stylist_id: StylistId,
    pub score: u8,
    #[serde(default)]
    pub comment: String,
    pub created_at: NaiveDateTime,
}

/// Ephemeral alternative offered when the requested instant cannot be served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub stylists: Vec<Stylist>,
}

impl CandidateSlot {
    pub fn stylist_ids(&self) -> Vec<StylistId> {
        self.stylists.iter().map(|stylist| stylist.id.clone()).collect()
    }
}
