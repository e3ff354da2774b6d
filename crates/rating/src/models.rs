//! Domain models consumed and produced by the rating engine
//!
//! Status and model columns are stored as text and parsed at the point of
//! use; see `meterline_shared::types` for the corresponding enums.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A closed time period for one subscription awaiting rating.
/// The period is half-open: `[period_start, period_end)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingCycle {
    pub id: Uuid,
    pub org_id: Uuid,
    pub subscription_id: Uuid,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub org_id: Uuid,
    pub customer_id: Uuid,
    /// Overrides the customer/organization default currency when set
    pub currency: Option<String>,
    pub start_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Upper lifetime bound: `min(ended_at, canceled_at)`, unbounded when
    /// neither is set. No usage is rated past this instant.
    pub fn lifetime_end(&self) -> Option<OffsetDateTime> {
        match (self.ended_at, self.canceled_at) {
            (Some(ended), Some(canceled)) => Some(ended.min(canceled)),
            (Some(ended), None) => Some(ended),
            (None, Some(canceled)) => Some(canceled),
            (None, None) => None,
        }
    }
}

/// A priced component of a subscription. `meter_id` is `None` for
/// flat/recurring charges and set for metered charges.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionItem {
    pub id: Uuid,
    pub org_id: Uuid,
    pub subscription_id: Uuid,
    pub price_id: Uuid,
    pub meter_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Grants a feature code to a meter or product over
/// `[effective_from, effective_to)` (open-ended when `effective_to` is null).
///
/// Absence of a matching entitlement never blocks rating; it only leaves the
/// feature code empty and the window unconstrained.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionEntitlement {
    pub id: Uuid,
    pub org_id: Uuid,
    pub subscription_id: Uuid,
    pub feature_code: String,
    pub meter_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub effective_from: OffsetDateTime,
    pub effective_to: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Price {
    pub id: Uuid,
    pub org_id: Uuid,
    pub product_id: Uuid,
    pub pricing_model: String,
    pub created_at: OffsetDateTime,
}

/// Currency- and meter-scoped monetary rule valid over
/// `[effective_from, effective_to)`.
///
/// `unit_amount` is in minor currency units per unit and may be fractional;
/// `min_amount`/`max_amount` clamp the final per-unit amount when present.
/// A row with `meter_id = None` is the meter-agnostic default.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceAmount {
    pub id: Uuid,
    pub org_id: Uuid,
    pub price_id: Uuid,
    pub meter_id: Option<Uuid>,
    pub currency: String,
    pub unit_amount: f64,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub effective_from: OffsetDateTime,
    pub effective_to: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PriceAmount {
    /// Whether this amount is in effect at `at`
    pub fn is_effective_at(&self, at: OffsetDateTime) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }
}

/// One row of a tiered schedule: `[start_quantity, end_quantity]`, both ends
/// inclusive, `end_quantity = None` meaning unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceTier {
    pub id: Uuid,
    pub org_id: Uuid,
    pub price_id: Uuid,
    pub start_quantity: f64,
    pub end_quantity: Option<f64>,
    pub unit_amount: Option<f64>,
    pub flat_amount: Option<i64>,
    pub created_at: OffsetDateTime,
}

impl PriceTier {
    /// Whether `quantity` falls inside this tier's bounds
    pub fn contains(&self, quantity: f64) -> bool {
        quantity >= self.start_quantity && self.end_quantity.map_or(true, |end| quantity <= end)
    }
}

/// A priced line item, the ledger/invoice source of truth.
///
/// Created only by the orchestrator inside the rating transaction; the
/// checksum is the natural key that makes re-insertion idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingResult {
    pub id: Uuid,
    pub org_id: Uuid,
    pub subscription_id: Uuid,
    pub billing_cycle_id: Uuid,
    pub price_id: Uuid,
    pub meter_id: Option<Uuid>,
    pub feature_code: String,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub currency: String,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub source: String,
    pub checksum: String,
    pub created_at: OffsetDateTime,
}
