//! Time-window resolution
//!
//! Intersects the billing cycle period with the subscription lifetime and
//! the matched entitlement's validity range, and computes the proration
//! factor for partially-covered cycles.

use time::OffsetDateTime;

use crate::models::{BillingCycle, Subscription, SubscriptionEntitlement};

/// The resolved rating interval for one subscription item, half-open
/// `[start, end)`. An empty or inverted interval means the item contributes
/// nothing to this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl RatingWindow {
    pub fn is_active(&self) -> bool {
        self.end > self.start
    }
}

/// Intersect cycle, subscription lifetime, and entitlement validity.
///
/// `start = max(cycle start, subscription start, entitlement from)` and
/// `end = min(cycle end, subscription ended, subscription canceled,
/// entitlement to)`, absent bounds treated as unconstrained. The caller
/// checks [`RatingWindow::is_active`] and skips the item when it is false.
pub fn resolve_item_window(
    cycle: &BillingCycle,
    subscription: &Subscription,
    entitlement: Option<&SubscriptionEntitlement>,
) -> RatingWindow {
    let mut start = cycle.period_start.max(subscription.start_at);
    let mut end = cycle.period_end;

    if let Some(lifetime_end) = subscription.lifetime_end() {
        end = end.min(lifetime_end);
    }

    if let Some(ent) = entitlement {
        start = start.max(ent.effective_from);
        if let Some(to) = ent.effective_to {
            end = end.min(to);
        }
    }

    RatingWindow { start, end }
}

/// Fraction of the cycle covered by `window`, clamped to `[0, 1]`.
///
/// Used only for flat-rate items, where it doubles as the result quantity.
pub fn proration_factor(window: RatingWindow, cycle: &BillingCycle) -> f64 {
    let cycle_seconds = (cycle.period_end - cycle.period_start).as_seconds_f64();
    if cycle_seconds <= 0.0 {
        return 0.0;
    }
    let active_seconds = (window.end - window.start).as_seconds_f64();
    (active_seconds / cycle_seconds).clamp(0.0, 1.0)
}
