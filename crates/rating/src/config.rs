//! Rating engine configuration

use std::env;

/// Currency applied when neither subscription, customer, nor organization
/// define one.
pub const DEFAULT_FALLBACK_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct RatingConfig {
    pub fallback_currency: String,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            fallback_currency: DEFAULT_FALLBACK_CURRENCY.to_string(),
        }
    }
}

impl RatingConfig {
    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        Self {
            fallback_currency: env::var("RATING_FALLBACK_CURRENCY")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_CURRENCY.to_string()),
        }
    }
}
