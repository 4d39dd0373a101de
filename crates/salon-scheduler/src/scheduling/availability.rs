use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::domain::{ServiceId, Stylist};
use super::repository::{AppointmentStore, RepositoryError, StylistDirectory};

/// How an existing booking blocks a stylist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    /// Only an active appointment starting at exactly the same date and time blocks.
    #[default]
    ExactStart,
    /// Any active appointment whose duration overlaps the requested service window blocks.
    Overlap,
}

impl ConflictRule {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" | "exact_start" => Some(Self::ExactStart),
            "overlap" | "duration" => Some(Self::Overlap),
            _ => None,
        }
    }
}

/// Read-only view answering "who can take this service at this instant".
pub struct AvailabilityIndex<'a, D: ?Sized, S: ?Sized> {
    directory: &'a D,
    store: &'a S,
    rule: ConflictRule,
}

impl<'a, D, S> AvailabilityIndex<'a, D, S>
where
    D: StylistDirectory + ?Sized,
    S: AppointmentStore + ?Sized,
{
    pub fn new(directory: &'a D, store: &'a S, rule: ConflictRule) -> Self {
        Self {
            directory,
            store,
            rule,
        }
    }

    pub fn rule(&self) -> ConflictRule {
        self.rule
    }

    /// Stylists qualified for `service`, on duty, and not booked at (`date`, `time`).
    ///
    /// The result is ordered by stylist id so repeated calls over the same data agree.
    pub fn find_available(
        &self,
        service: &ServiceId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Vec<Stylist>, RepositoryError> {
        let requested = match self.rule {
            ConflictRule::ExactStart => None,
            ConflictRule::Overlap => Some(self.service_duration(service)?),
        };

        let mut available = Vec::new();
        for stylist in self.directory.roster()? {
            if !stylist.on_duty || !stylist.qualified_for(service) {
                continue;
            }

            let busy = match requested {
                None => self.store.has_conflict(&stylist.id, date, time)?,
                Some(duration) => self.overlaps_booking(&stylist, date, time, duration)?,
            };
            if !busy {
                available.push(stylist);
            }
        }

        available.sort_by(|a, b| a.id.cmp(&b.id));
        available.dedup_by(|a, b| a.id == b.id);
        Ok(available)
    }

    fn service_duration(&self, service: &ServiceId) -> Result<Duration, RepositoryError> {
        Ok(self
            .directory
            .service(service)?
            .map(|service| service.duration())
            .unwrap_or_else(|| Duration::minutes(0)))
    }

    fn overlaps_booking(
        &self,
        stylist: &Stylist,
        date: NaiveDate,
        time: NaiveTime,
        duration: Duration,
    ) -> Result<bool, RepositoryError> {
        let start = date.and_time(time);
        let end = start + duration;
        Ok(self
            .store
            .active_on(&stylist.id, date)?
            .iter()
            .filter(|appointment| appointment.status.holds_slot())
            .any(|appointment| {
                let booked_start = appointment.starts_at();
                // Zero-length windows still block their exact start.
                booked_start == start
                    || (booked_start < end && start < appointment.ends_at())
            }))
    }
}
