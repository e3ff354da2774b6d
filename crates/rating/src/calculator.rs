//! Pricing calculators
//!
//! One calculator per pricing model. All of them work in minor currency
//! units: quantities may be fractional, final amounts are integers produced
//! by round-half-up. For tiered-graduated pricing the rounding happens per
//! tier portion before summation, never on the total.

use crate::error::{RatingError, Result};
use crate::models::{PriceAmount, PriceTier};
use uuid::Uuid;

/// Outcome of rating one window: the final amount and the effective unit
/// price, both in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatedAmount {
    pub amount: i64,
    pub unit_price: i64,
}

/// Round-half-up to an integer minor-currency amount: `floor(x + 0.5)`.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Flat charge scaled by the active fraction of the cycle.
pub fn flat(unit_amount: f64, proration_factor: f64) -> RatedAmount {
    RatedAmount {
        amount: round_half_up(unit_amount * proration_factor),
        unit_price: round_half_up(unit_amount),
    }
}

/// Usage multiplied by the unit rate, clamped to the price amount's
/// minimum/maximum when present.
pub fn per_unit(quantity: f64, amount: &PriceAmount) -> Result<RatedAmount> {
    ensure_billable_quantity(quantity)?;

    let mut total = round_half_up(quantity * amount.unit_amount);
    if let Some(min) = amount.min_amount {
        total = total.max(min);
    }
    if let Some(max) = amount.max_amount {
        total = total.min(max);
    }

    Ok(RatedAmount {
        amount: total,
        unit_price: round_half_up(amount.unit_amount),
    })
}

/// Rate the whole quantity at the single tier containing it.
///
/// `tiers` must be ordered by `start_quantity`. A quantity outside every
/// tier's bounds is an error, never silently rated at zero.
pub fn tiered_volume(price_id: Uuid, quantity: f64, tiers: &[PriceTier]) -> Result<RatedAmount> {
    ensure_billable_quantity(quantity)?;
    if tiers.is_empty() {
        return Err(RatingError::MissingPriceTiers(price_id));
    }

    let tier = tiers
        .iter()
        .find(|t| t.contains(quantity))
        .ok_or(RatingError::NoMatchingTier { price_id, quantity })?;

    let amount =
        round_half_up(quantity * tier.unit_amount.unwrap_or(0.0)) + tier.flat_amount.unwrap_or(0);

    Ok(RatedAmount {
        amount,
        unit_price: effective_unit_price(amount, quantity),
    })
}

/// Distribute the quantity across tiers in ascending `start_quantity`,
/// rating each touched portion at its own rate.
///
/// A tier's portion spans `[start, min(end, quantity)]` with inclusive
/// bounds, so its size is `upper - start + 1`, clamped to zero.
pub fn tiered_graduated(
    price_id: Uuid,
    quantity: f64,
    tiers: &[PriceTier],
) -> Result<RatedAmount> {
    ensure_billable_quantity(quantity)?;
    if tiers.is_empty() {
        return Err(RatingError::MissingPriceTiers(price_id));
    }

    let mut total: i64 = 0;
    let mut touched = false;

    for tier in tiers {
        if tier.start_quantity > quantity {
            continue;
        }
        touched = true;

        let upper = tier.end_quantity.map_or(quantity, |end| quantity.min(end));
        let portion = (upper - tier.start_quantity + 1.0).max(0.0);

        total += round_half_up(portion * tier.unit_amount.unwrap_or(0.0))
            + tier.flat_amount.unwrap_or(0);
    }

    if !touched {
        return Err(RatingError::NoMatchingTier { price_id, quantity });
    }

    Ok(RatedAmount {
        amount: total,
        unit_price: effective_unit_price(total, quantity),
    })
}

fn effective_unit_price(total: i64, quantity: f64) -> i64 {
    if quantity == 0.0 {
        return 0;
    }
    round_half_up(total as f64 / quantity)
}

fn ensure_billable_quantity(quantity: f64) -> Result<()> {
    if quantity < 0.0 {
        return Err(RatingError::InvalidQuantity(quantity));
    }
    Ok(())
}
