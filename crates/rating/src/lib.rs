// Rating crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Rating dispatch threads cycle/item/window context together
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Meterline Rating Engine
//!
//! Deterministically converts raw usage events, subscription entitlements,
//! and time-varying price definitions into priced line items for a closed
//! billing cycle.
//!
//! ## Features
//!
//! - **Time-Window Resolution**: Intersect cycle, subscription lifetime, and
//!   entitlement validity; prorate partially-covered cycles
//! - **Price Windows**: Split a cycle at price-amount effective-date
//!   boundaries so every line reflects the rate in force at that instant
//! - **Pricing Calculators**: flat, per-unit, tiered-volume, and
//!   tiered-graduated models with exact round-half-up semantics
//! - **Idempotent Output**: checksum-keyed results, delete-then-reinsert in
//!   one transaction per cycle; retries are always safe
//! - **Organization Gate**: lifecycle-backed activity check consulted before
//!   the rating transaction opens

pub mod calculator;
pub mod checksum;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod price_window;
pub mod repo;
pub mod service;
pub mod window;

// Calculators
pub use calculator::{flat, per_unit, round_half_up, tiered_graduated, tiered_volume, RatedAmount};

// Checksum
pub use checksum::rating_checksum;

// Config
pub use config::{RatingConfig, DEFAULT_FALLBACK_CURRENCY};

// Error
pub use error::{RatingError, Result};

// Gate
pub use gate::{transition_org_status, OrganizationGate, PgOrganizationGate};

// Models
pub use models::{
    BillingCycle, Price, PriceAmount, PriceTier, RatingResult, Subscription,
    SubscriptionEntitlement, SubscriptionItem,
};

// Price windows
pub use price_window::{build_price_windows, resolve_amount_at, PriceWindow};

// Service
pub use service::RatingService;

// Windows
pub use window::{proration_factor, resolve_item_window, RatingWindow};
