use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use super::availability::AvailabilityIndex;
use super::domain::{CustomerId, ServiceId, Stylist, StylistId};
use super::repository::{AppointmentStore, RatingHistory, RepositoryError, StylistDirectory};

/// Ratings at or above this score mark a stylist as one the customer prefers.
pub const PREFERRED_SCORE: u8 = 4;

/// A stylist the customer rated highly, with the mean of those high ratings.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferredStylist {
    pub stylist_id: StylistId,
    pub mean_score: f32,
}

/// Ranks stylists by how the customer rated them in the past.
pub struct PreferenceResolver<'a, H: ?Sized> {
    history: &'a H,
}

impl<'a, H> PreferenceResolver<'a, H>
where
    H: RatingHistory + ?Sized,
{
    pub fn new(history: &'a H) -> Self {
        Self { history }
    }

    /// Highest mean rating first; equal means fall back to stylist id order.
    pub fn ranked_preferences(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<PreferredStylist>, RepositoryError> {
        let mut totals: BTreeMap<StylistId, (u32, u32)> = BTreeMap::new();
        for rating in self.history.ratings_given_by(customer)? {
            if rating.score < PREFERRED_SCORE {
                continue;
            }
            let entry = totals.entry(rating.stylist_id).or_insert((0, 0));
            entry.0 += u32::from(rating.score);
            entry.1 += 1;
        }

        let mut ranked: Vec<PreferredStylist> = totals
            .into_iter()
            .map(|(stylist_id, (sum, count))| PreferredStylist {
                stylist_id,
                mean_score: sum as f32 / count as f32,
            })
            .collect();
        // Stable sort keeps the id order from the BTreeMap for ties.
        ranked.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));
        Ok(ranked)
    }

    /// First preferred stylist present in `available`, if any.
    pub fn preferred_among(
        &self,
        customer: &CustomerId,
        available: &[Stylist],
    ) -> Result<Option<Stylist>, RepositoryError> {
        let ranked = self.ranked_preferences(customer)?;
        Ok(first_available(&ranked, available))
    }

    pub fn preferred_available<D, S>(
        &self,
        index: &AvailabilityIndex<'_, D, S>,
        customer: &CustomerId,
        service: &ServiceId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Stylist>, RepositoryError>
    where
        D: StylistDirectory + ?Sized,
        S: AppointmentStore + ?Sized,
    {
        let ranked = self.ranked_preferences(customer)?;
        if ranked.is_empty() {
            return Ok(None);
        }
        let available = index.find_available(service, date, time)?;
        Ok(first_available(&ranked, &available))
    }
}

fn first_available(ranked: &[PreferredStylist], available: &[Stylist]) -> Option<Stylist> {
    ranked.iter().find_map(|preferred| {
        available
            .iter()
            .find(|stylist| stylist.id == preferred.stylist_id)
            .cloned()
    })
}
