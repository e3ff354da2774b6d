//! Price-window construction
//!
//! A price amount's rate can change mid-cycle. Usage must be split and rated
//! separately per sub-interval so each line reflects the rate in effect at
//! that instant. Boundary collection runs over a sorted set of instants, so
//! the split is linear in the number of boundaries.

use std::collections::BTreeSet;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{RatingError, Result};
use crate::models::PriceAmount;
use crate::window::RatingWindow;

/// One sub-interval of a rating window with the price amount in effect over
/// all of it.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub amount: PriceAmount,
}

/// Split `window` at every effective-date boundary of `amounts` and resolve
/// the amount in force for each piece.
///
/// `amounts` holds every candidate row for the item's price and currency,
/// both meter-specific and meter-agnostic, overlapping the window. A piece
/// with no resolvable amount fails the whole run.
pub fn build_price_windows(
    price_id: Uuid,
    meter_id: Option<Uuid>,
    window: RatingWindow,
    amounts: &[PriceAmount],
) -> Result<Vec<PriceWindow>> {
    let mut boundaries: BTreeSet<OffsetDateTime> = BTreeSet::new();
    boundaries.insert(window.start);
    boundaries.insert(window.end);

    for amount in amounts {
        if amount.effective_from > window.start && amount.effective_from < window.end {
            boundaries.insert(amount.effective_from);
        }
        if let Some(to) = amount.effective_to {
            if to > window.start && to < window.end {
                boundaries.insert(to);
            }
        }
    }

    let instants: Vec<OffsetDateTime> = boundaries.into_iter().collect();
    let mut windows = Vec::with_capacity(instants.len().saturating_sub(1));

    for pair in instants.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let amount = resolve_amount_at(price_id, meter_id, start, amounts)?;
        windows.push(PriceWindow {
            start,
            end,
            amount: amount.clone(),
        });
    }

    Ok(windows)
}

/// Resolve the price amount in effect at `at`, preferring a meter-specific
/// row and falling back to the meter-agnostic default. Among several
/// candidates in one group the earliest `effective_from` wins.
pub fn resolve_amount_at(
    price_id: Uuid,
    meter_id: Option<Uuid>,
    at: OffsetDateTime,
    amounts: &[PriceAmount],
) -> Result<&PriceAmount> {
    let effective = amounts.iter().filter(|a| a.is_effective_at(at));

    let mut meter_specific: Option<&PriceAmount> = None;
    let mut default: Option<&PriceAmount> = None;

    for amount in effective {
        let slot = if amount.meter_id.is_some() && amount.meter_id == meter_id {
            &mut meter_specific
        } else if amount.meter_id.is_none() {
            &mut default
        } else {
            continue;
        };
        match slot {
            Some(existing) if existing.effective_from <= amount.effective_from => {}
            _ => *slot = Some(amount),
        }
    }

    meter_specific
        .or(default)
        .ok_or(RatingError::MissingPriceAmount {
            price_id,
            at: at.to_string(),
        })
}
