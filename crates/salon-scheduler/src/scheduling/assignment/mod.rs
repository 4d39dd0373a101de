mod decision;
mod ranking;

pub use decision::{AssignmentDecision, AssignmentError};
pub(crate) use ranking::{rank_by_rating, split_chosen};

use chrono::{NaiveDate, NaiveTime};
use tracing::{error, info};

use super::availability::{AvailabilityIndex, ConflictRule};
use super::domain::{CustomerId, ServiceId, Stylist};
use super::preference::PreferenceResolver;
use super::repository::{AppointmentStore, RatingHistory, StylistDirectory};
use super::slot_search::{BusinessHours, SlotSearch};

/// Pure decision function over the current directory, calendar, and rating history.
pub struct AssignmentPolicy<'a, R: ?Sized> {
    repository: &'a R,
    rule: ConflictRule,
    hours: BusinessHours,
}

impl<'a, R> AssignmentPolicy<'a, R>
where
    R: StylistDirectory + AppointmentStore + RatingHistory + ?Sized,
{
    pub fn new(repository: &'a R, rule: ConflictRule, hours: BusinessHours) -> Self {
        Self {
            repository,
            rule,
            hours,
        }
    }

    pub fn index(&self) -> AvailabilityIndex<'a, R, R> {
        AvailabilityIndex::new(self.repository, self.repository, self.rule)
    }

    /// Preferred stylist first, then the highest rated free stylist, then the next open slot.
    pub fn assign(
        &self,
        customer: &CustomerId,
        service: &ServiceId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<AssignmentDecision, AssignmentError> {
        let index = self.index();
        let available = index.find_available(service, date, time)?;

        if available.is_empty() {
            let search = SlotSearch::new(&index, self.hours);
            let decision = match search.next_available_slot(service, date, time, None)? {
                Some(slot) => AssignmentDecision::Suggested(slot),
                None => AssignmentDecision::Unavailable,
            };
            info!(%service, %date, %time, outcome = decision_label(&decision), "no stylist free at requested time");
            return Ok(decision);
        }

        let resolver = PreferenceResolver::new(self.repository);
        let decision = match resolver.preferred_among(customer, &available)? {
            Some(preferred) => match split_chosen(available.clone(), &preferred.id) {
                Some((stylist, alternatives)) => AssignmentDecision::Assigned {
                    stylist,
                    alternatives,
                    preferred: true,
                },
                None => by_rating(available),
            },
            None => by_rating(available),
        };

        verify_expertise(&decision, service)?;
        if let Some(stylist) = decision.assigned_stylist() {
            info!(%service, %date, %time, stylist = %stylist.id, "stylist assigned");
        }
        Ok(decision)
    }
}

fn by_rating(available: Vec<Stylist>) -> AssignmentDecision {
    let mut ranked = rank_by_rating(available).into_iter();
    match ranked.next() {
        Some(stylist) => AssignmentDecision::Assigned {
            stylist,
            alternatives: ranked.collect(),
            preferred: false,
        },
        None => AssignmentDecision::Unavailable,
    }
}

/// Refuses any assignment whose stylist lacks the service in their expertise set.
pub(crate) fn verify_expertise(
    decision: &AssignmentDecision,
    service: &ServiceId,
) -> Result<(), AssignmentError> {
    match decision.assigned_stylist() {
        Some(stylist) => verify_stylist(stylist, service),
        None => Ok(()),
    }
}

pub(crate) fn verify_stylist(stylist: &Stylist, service: &ServiceId) -> Result<(), AssignmentError> {
    if stylist.qualified_for(service) {
        return Ok(());
    }
    error!(stylist = %stylist.id, %service, "assignment invariant violated: missing expertise");
    Err(AssignmentError::MissingExpertise {
        stylist: stylist.id.clone(),
        service: service.clone(),
    })
}

fn decision_label(decision: &AssignmentDecision) -> &'static str {
    match decision {
        AssignmentDecision::Assigned { .. } => "assigned",
        AssignmentDecision::Suggested(_) => "suggested",
        AssignmentDecision::Unavailable => "unavailable",
    }
}
