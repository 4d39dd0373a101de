use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::domain::{CandidateSlot, CustomerId, ServiceId};

/// Short-lived handoff for an alternative slot. The caller keeps it and sends it back to
/// accept the suggestion; nothing is held server side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedBooking {
    pub customer_id: CustomerId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl SuggestedBooking {
    pub fn issue(
        customer_id: CustomerId,
        service_id: ServiceId,
        slot: &CandidateSlot,
        now: NaiveDateTime,
        ttl: Duration,
    ) -> Self {
        Self {
            customer_id,
            service_id,
            date: slot.date,
            time: slot.time,
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now >= self.expires_at
    }
}
