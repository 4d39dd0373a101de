use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::availability::AvailabilityIndex;
use super::domain::{CandidateSlot, ServiceId, StylistId};
use super::repository::{AppointmentStore, RepositoryError, StylistDirectory};

/// Opening window and scan granularity for slot discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub increment_minutes: u32,
    pub horizon_days: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            increment_minutes: 30,
            horizon_days: 14,
        }
    }
}

impl BusinessHours {
    pub fn increment(&self) -> Duration {
        Duration::minutes(i64::from(self.increment_minutes.max(1)))
    }

    /// Last day the scan may reach when starting from `from`.
    pub fn last_day(&self, from: NaiveDate) -> NaiveDate {
        from + Duration::days(i64::from(self.horizon_days.saturating_sub(1)))
    }

    /// Start times accept [`opens_at`, `closes_at`).
    pub fn is_open_at(&self, time: NaiveTime) -> bool {
        time >= self.opens_at && time < self.closes_at
    }

    /// The instant the scan evaluates after `current`, or `None` once the horizon is exhausted.
    pub fn next_candidate(
        &self,
        from: NaiveDate,
        current: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let last_day = self.last_day(from);
        let mut date = current.date();
        let (advanced, wrapped) = current.time().overflowing_add_signed(self.increment());
        let mut time = advanced;

        if wrapped != 0 || time >= self.closes_at {
            date = date.succ_opt()?;
            time = self.opens_at;
        } else if time < self.opens_at {
            time = self.opens_at;
        }

        if date > last_day {
            return None;
        }
        Some(date.and_time(time))
    }
}

/// Forward scan for the first instant with a qualified, free stylist.
pub struct SlotSearch<'i, 'a, D: ?Sized, S: ?Sized> {
    index: &'i AvailabilityIndex<'a, D, S>,
    hours: BusinessHours,
}

impl<'i, 'a, D, S> SlotSearch<'i, 'a, D, S>
where
    D: StylistDirectory + ?Sized,
    S: AppointmentStore + ?Sized,
{
    pub fn new(index: &'i AvailabilityIndex<'a, D, S>, hours: BusinessHours) -> Self {
        Self { index, hours }
    }

    /// Scans from the increment after (`from_date`, `from_time`); the requested instant itself
    /// is never re-checked. Returns `None` when nothing opens within the horizon.
    pub fn next_available_slot(
        &self,
        service: &ServiceId,
        from_date: NaiveDate,
        from_time: NaiveTime,
        preferred: Option<&StylistId>,
    ) -> Result<Option<CandidateSlot>, RepositoryError> {
        let mut cursor = from_date.and_time(from_time);
        let mut scanned = 0_u32;

        while let Some(candidate) = self.hours.next_candidate(from_date, cursor) {
            cursor = candidate;
            scanned += 1;

            let stylists = self
                .index
                .find_available(service, candidate.date(), candidate.time())?;
            if stylists.is_empty() {
                continue;
            }

            // Preference is only consulted at the first open instant, never searched further.
            let preferred_free = preferred
                .map(|id| stylists.iter().any(|stylist| &stylist.id == id))
                .unwrap_or(false);
            debug!(
                %service,
                date = %candidate.date(),
                time = %candidate.time(),
                scanned,
                preferred_free,
                "slot search found an open instant"
            );
            return Ok(Some(CandidateSlot {
                date: candidate.date(),
                time: candidate.time(),
                stylists,
            }));
        }

        debug!(%service, %from_date, scanned, "slot search exhausted horizon");
        Ok(None)
    }
}
