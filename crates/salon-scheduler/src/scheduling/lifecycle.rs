use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{AppointmentStatus, ServiceId};

/// Events that drive an appointment through its states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Payment completed.
    Confirm,
    /// Service delivered, either by staff action or the maintenance sweep.
    Complete,
    /// Customer, staff, or the sweep withdrew the booking.
    Cancel,
}

impl LifecycleEvent {
    pub const fn label(self) -> &'static str {
        match self {
            LifecycleEvent::Confirm => "confirm",
            LifecycleEvent::Complete => "complete",
            LifecycleEvent::Cancel => "cancel",
        }
    }
}

/// A transition that the state machine refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} an appointment that is {}", .event.label(), .from.label())]
pub struct LifecycleError {
    pub from: AppointmentStatus,
    pub event: LifecycleEvent,
}

impl AppointmentStatus {
    /// Pending -> {Confirmed, Cancelled}; Confirmed -> {Completed, Cancelled}.
    pub fn apply(self, event: LifecycleEvent) -> Result<AppointmentStatus, LifecycleError> {
        use AppointmentStatus::*;
        match (self, event) {
            (Pending, LifecycleEvent::Confirm) => Ok(Confirmed),
            (Confirmed, LifecycleEvent::Complete) => Ok(Completed),
            (Pending | Confirmed, LifecycleEvent::Cancel) => Ok(Cancelled),
            (from, event) => Err(LifecycleError { from, event }),
        }
    }
}

/// Loyalty accrual rules applied when an appointment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyPolicy {
    pub base_points: u32,
    pub special_multiplier: u32,
    pub special_services: BTreeSet<ServiceId>,
    /// Every n-th accrued appointment earns `milestone_bonus` on top.
    pub milestone_every: u32,
    pub milestone_bonus: u32,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self {
        Self {
            base_points: 10,
            special_multiplier: 2,
            special_services: BTreeSet::new(),
            milestone_every: 5,
            milestone_bonus: 100,
        }
    }
}

impl LoyaltyPolicy {
    /// Points earned by one appointment for `service`, given how many appointments
    /// (including this one) have accrued points for the customer.
    pub fn accrual(&self, service: &ServiceId, accrued_count: usize) -> u32 {
        let mut points = if self.special_services.contains(service) {
            self.base_points.saturating_mul(self.special_multiplier)
        } else {
            self.base_points
        };

        if self.milestone_every > 0
            && accrued_count > 0
            && accrued_count % self.milestone_every as usize == 0
        {
            points = points.saturating_add(self.milestone_bonus);
        }
        points
    }
}
