//! Rating error types

use thiserror::Error;
use uuid::Uuid;

/// Rating-specific errors
///
/// Every variant is terminal for the current run; the engine never retries
/// internally. Precondition failures carry enough context for callers to
/// branch on cause without string matching.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Billing cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("Billing cycle {cycle_id} is not closing (status: {status})")]
    CycleNotClosing { cycle_id: Uuid, status: String },

    #[error("Organization {org_id} is not active (status: {status})")]
    OrganizationInactive { org_id: Uuid, status: String },

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    #[error("No subscription items for subscription {0}")]
    NoSubscriptionItems(Uuid),

    #[error("Price not found: {0}")]
    PriceNotFound(Uuid),

    #[error("No effective price amount for price {price_id} at {at}")]
    MissingPriceAmount { price_id: Uuid, at: String },

    #[error("No price tiers configured for price {0}")]
    MissingPriceTiers(Uuid),

    #[error("No price tier matches quantity {quantity} for price {price_id}")]
    NoMatchingTier { price_id: Uuid, quantity: f64 },

    #[error("Subscription item {item_id} has no meter but price {price_id} is {model}")]
    MissingMeter {
        item_id: Uuid,
        price_id: Uuid,
        model: String,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),

    #[error("Invalid pricing model: {0}")]
    InvalidPricingModel(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Concurrent modification detected: {0}")]
    ConcurrentModification(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RatingError>;
