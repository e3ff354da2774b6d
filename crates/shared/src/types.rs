//! Common types used across Meterline

use serde::{Deserialize, Serialize};

// =============================================================================
// Organization lifecycle
// =============================================================================

/// Organization lifecycle status
///
/// Persisted as text on `organizations.status`. Transitions are restricted to
/// the table in [`OrgStatus::can_transition_to`]; `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgStatus {
    /// Freshly created, schema bootstrap not finished
    Initializing,
    /// In good standing, may be rated and served
    Active,
    /// Temporarily disabled (billing problem, admin action)
    Suspended,
    /// Permanently closed
    Terminated,
}

impl OrgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
        }
    }

    /// Whether the organization may use billable platform features
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Allowed lifecycle transitions
    pub fn can_transition_to(&self, next: OrgStatus) -> bool {
        matches!(
            (*self, next),
            (Self::Initializing, Self::Active)
                | (Self::Initializing, Self::Terminated)
                | (Self::Active, Self::Suspended)
                | (Self::Active, Self::Terminated)
                | (Self::Suspended, Self::Active)
                | (Self::Suspended, Self::Terminated)
        )
    }
}

impl std::fmt::Display for OrgStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrgStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initializing" => Ok(Self::Initializing),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Invalid organization status: {}", s)),
        }
    }
}

// =============================================================================
// Billing cycles
// =============================================================================

/// Billing cycle status
///
/// The rating engine only consumes cycles in `Closing`; every other state is
/// owned by external components (cycle scheduling, invoicing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycleStatus {
    Open,
    Closing,
    Rated,
    Invoiced,
}

impl BillingCycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Rated => "rated",
            Self::Invoiced => "invoiced",
        }
    }
}

impl std::fmt::Display for BillingCycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BillingCycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closing" => Ok(Self::Closing),
            "rated" => Ok(Self::Rated),
            "invoiced" => Ok(Self::Invoiced),
            _ => Err(format!("Invalid billing cycle status: {}", s)),
        }
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// Pricing model attached to a price
///
/// Determines which calculator rates a subscription item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// Fixed recurring charge, prorated over the active fraction of the cycle
    Flat,
    /// Usage multiplied by a unit rate, optionally clamped
    PerUnit,
    /// Single tier selected by total quantity
    TieredVolume,
    /// Quantity distributed across tiers, each rated at its own rate
    TieredGraduated,
}

impl PricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::PerUnit => "per_unit",
            Self::TieredVolume => "tiered_volume",
            Self::TieredGraduated => "tiered_graduated",
        }
    }

    /// Whether items with this model bill from aggregated usage
    pub fn is_metered(&self) -> bool {
        !matches!(self, Self::Flat)
    }
}

impl std::fmt::Display for PricingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PricingModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "per_unit" => Ok(Self::PerUnit),
            "tiered_volume" => Ok(Self::TieredVolume),
            "tiered_graduated" => Ok(Self::TieredGraduated),
            _ => Err(format!("Invalid pricing model: {}", s)),
        }
    }
}

/// Source tag stamped on every rating result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingSource {
    FlatRate,
    UsageEvents,
    TieredVolume,
    TieredGraduated,
}

impl RatingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlatRate => "flat_rate",
            Self::UsageEvents => "usage_events",
            Self::TieredVolume => "tiered_volume",
            Self::TieredGraduated => "tiered_graduated",
        }
    }
}

impl std::fmt::Display for RatingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage event lifecycle state
///
/// Only `Enriched` events are billable; the enrichment pipeline that moves
/// events through these states is external to the rating engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventState {
    Received,
    Enriched,
    Rejected,
}

impl UsageEventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Enriched => "enriched",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for UsageEventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
