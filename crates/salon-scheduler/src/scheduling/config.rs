use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::availability::ConflictRule;
use super::lifecycle::LoyaltyPolicy;
use super::slot_search::BusinessHours;

/// Knobs for assignment, slot search, loyalty accrual, and suggestion handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub conflict_rule: ConflictRule,
    pub hours: BusinessHours,
    pub loyalty: LoyaltyPolicy,
    pub suggestion_ttl_minutes: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            conflict_rule: ConflictRule::ExactStart,
            hours: BusinessHours::default(),
            loyalty: LoyaltyPolicy::default(),
            suggestion_ttl_minutes: 30,
        }
    }
}

impl SchedulingConfig {
    pub fn suggestion_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.suggestion_ttl_minutes))
    }
}
