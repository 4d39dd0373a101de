use super::super::domain::{Stylist, StylistId};

/// Orders stylists by rating, highest first, with stylist id as the tie-break.
pub(crate) fn rank_by_rating(mut stylists: Vec<Stylist>) -> Vec<Stylist> {
    stylists.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then_with(|| a.id.cmp(&b.id))
    });
    stylists
}

/// Splits `stylists` into the chosen one and the rest, keeping the rest's order.
pub(crate) fn split_chosen(
    stylists: Vec<Stylist>,
    chosen: &StylistId,
) -> Option<(Stylist, Vec<Stylist>)> {
    let mut picked = None;
    let mut rest = Vec::with_capacity(stylists.len().saturating_sub(1));
    for stylist in stylists {
        if picked.is_none() && &stylist.id == chosen {
            picked = Some(stylist);
        } else {
            rest.push(stylist);
        }
    }
    picked.map(|stylist| (stylist, rest))
}
