use serde::Serialize;

use super::super::domain::{CandidateSlot, ServiceId, Stylist, StylistId};

/// Outcome of matching a booking request to a stylist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentDecision {
    Assigned {
        stylist: Stylist,
        alternatives: Vec<Stylist>,
        /// True when the customer's own rating history picked the stylist.
        preferred: bool,
    },
    Suggested(CandidateSlot),
    Unavailable,
}

impl AssignmentDecision {
    pub fn assigned_stylist(&self) -> Option<&Stylist> {
        match self {
            AssignmentDecision::Assigned { stylist, .. } => Some(stylist),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            AssignmentDecision::Assigned {
                stylist,
                alternatives,
                preferred,
            } => {
                let source = if *preferred {
                    "your preferred stylist"
                } else {
                    "the highest rated available stylist"
                };
                if alternatives.is_empty() {
                    format!("booked with {} ({source})", stylist.name)
                } else {
                    format!(
                        "booked with {} ({source}); {} other stylist(s) also free",
                        stylist.name,
                        alternatives.len()
                    )
                }
            }
            AssignmentDecision::Suggested(slot) => format!(
                "requested time is full; next opening is {} at {} with {} stylist(s)",
                slot.date,
                slot.time.format("%H:%M"),
                slot.stylists.len()
            ),
            AssignmentDecision::Unavailable => {
                "no stylist is free within the booking horizon; please contact the salon directly"
                    .to_string()
            }
        }
    }
}

/// Hard failures raised by the assignment policy.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("stylist {stylist} was assigned to {service} without the required expertise")]
    MissingExpertise {
        stylist: StylistId,
        service: ServiceId,
    },
    #[error(transparent)]
    Repository(#[from] super::super::repository::RepositoryError),
}
