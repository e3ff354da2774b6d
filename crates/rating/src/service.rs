//! Rating orchestration
//!
//! Drives the end-to-end recomputation of one billing cycle: validates
//! preconditions, purges prior results, iterates subscription items, invokes
//! the window resolver, price-window builder, and pricing calculators, and
//! persists the rating results. Everything after the precondition phase runs
//! inside a single database transaction, so a failed run leaves the cycle's
//! prior results untouched and a successful run replaces them atomically.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use meterline_shared::{BillingCycleStatus, PricingModel, RatingSource};

use crate::calculator::{self, RatedAmount};
use crate::checksum::rating_checksum;
use crate::config::RatingConfig;
use crate::error::{RatingError, Result};
use crate::gate::OrganizationGate;
use crate::models::{
    BillingCycle, Price, RatingResult, Subscription, SubscriptionEntitlement, SubscriptionItem,
};
use crate::price_window::{build_price_windows, resolve_amount_at};
use crate::repo;
use crate::window::{proration_factor, resolve_item_window, RatingWindow};

/// Rating engine entry point.
///
/// Re-invocation is always safe: results are deleted and reinserted within
/// one transaction, and the checksum key turns duplicate inserts into
/// no-ops.
pub struct RatingService {
    pool: PgPool,
    gate: Option<Arc<dyn OrganizationGate>>,
    config: RatingConfig,
}

impl RatingService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            gate: None,
            config: RatingConfig::from_env(),
        }
    }

    /// Enforce an organization-activity gate before every run.
    pub fn with_gate(mut self, gate: Arc<dyn OrganizationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_config(mut self, config: RatingConfig) -> Self {
        self.config = config;
        self
    }

    /// Rate one billing cycle.
    ///
    /// The cycle must be in `closing` status. Any error aborts the entire
    /// run; partial output is never observable.
    pub async fn run_rating(&self, billing_cycle_id: Uuid) -> Result<()> {
        let cycle = repo::get_billing_cycle(&self.pool, billing_cycle_id)
            .await?
            .ok_or(RatingError::CycleNotFound(billing_cycle_id))?;

        match BillingCycleStatus::from_str(&cycle.status) {
            Ok(BillingCycleStatus::Closing) => {}
            _ => {
                return Err(RatingError::CycleNotClosing {
                    cycle_id: cycle.id,
                    status: cycle.status.clone(),
                })
            }
        }

        // Gate check happens before any mutation and never inside the
        // rating transaction.
        if let Some(gate) = &self.gate {
            gate.must_be_active(cycle.org_id).await?;
        }

        let subscription = repo::get_subscription(&self.pool, cycle.org_id, cycle.subscription_id)
            .await?
            .ok_or(RatingError::SubscriptionNotFound(cycle.subscription_id))?;

        let items =
            repo::list_subscription_items(&self.pool, cycle.org_id, subscription.id).await?;
        if items.is_empty() {
            return Err(RatingError::NoSubscriptionItems(subscription.id));
        }

        tracing::info!(
            billing_cycle_id = %cycle.id,
            org_id = %cycle.org_id,
            subscription_id = %subscription.id,
            items = items.len(),
            "Starting rating run"
        );

        let mut tx = self.pool.begin().await?;

        let purged = repo::delete_rating_results(&mut *tx, cycle.id).await?;
        let entitlements = repo::list_entitlements(
            &mut *tx,
            cycle.org_id,
            subscription.id,
            cycle.period_start,
            cycle.period_end,
        )
        .await?;
        let currency = self.resolve_currency(&mut tx, &subscription).await?;

        let mut inserted = 0usize;
        let mut skipped = 0usize;

        for item in &items {
            let price = repo::get_price(&mut *tx, cycle.org_id, item.price_id)
                .await?
                .ok_or(RatingError::PriceNotFound(item.price_id))?;
            let model = PricingModel::from_str(&price.pricing_model)
                .map_err(|_| RatingError::InvalidPricingModel(price.pricing_model.clone()))?;

            let entitlement = match_entitlement(&entitlements, item, &price);
            let window = resolve_item_window(&cycle, &subscription, entitlement);
            if !window.is_active() {
                skipped += 1;
                tracing::debug!(
                    item_id = %item.id,
                    price_id = %price.id,
                    "Item inactive for this cycle, skipping"
                );
                continue;
            }

            let feature_code = entitlement
                .map(|e| e.feature_code.clone())
                .unwrap_or_default();

            match model {
                PricingModel::Flat => {
                    inserted += usize::from(
                        self.rate_flat_item(
                            &mut tx,
                            &cycle,
                            &subscription,
                            item,
                            &price,
                            &currency,
                            &feature_code,
                            window,
                        )
                        .await?,
                    );
                }
                _ => {
                    let meter_id = item.meter_id.ok_or(RatingError::MissingMeter {
                        item_id: item.id,
                        price_id: price.id,
                        model: model.to_string(),
                    })?;
                    inserted += self
                        .rate_metered_item(
                            &mut tx,
                            &cycle,
                            &subscription,
                            item,
                            &price,
                            model,
                            meter_id,
                            &currency,
                            &feature_code,
                            window,
                        )
                        .await?;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            billing_cycle_id = %cycle.id,
            purged = purged,
            inserted = inserted,
            skipped_items = skipped,
            currency = %currency,
            "Rating run complete"
        );

        Ok(())
    }

    /// One result per flat item per cycle. The proration factor doubles as
    /// the result quantity.
    async fn rate_flat_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cycle: &BillingCycle,
        subscription: &Subscription,
        item: &SubscriptionItem,
        price: &Price,
        currency: &str,
        feature_code: &str,
        window: RatingWindow,
    ) -> Result<bool> {
        let amounts = repo::list_price_amounts(
            &mut **tx,
            cycle.org_id,
            price.id,
            None,
            currency,
            window.start,
            window.end,
        )
        .await?;
        let amount = resolve_amount_at(price.id, None, window.start, &amounts)?;

        let factor = proration_factor(window, cycle);
        let rated = calculator::flat(amount.unit_amount, factor);

        let result = build_result(
            cycle,
            subscription,
            item,
            None,
            feature_code,
            factor,
            rated,
            currency,
            window.start,
            window.end,
            RatingSource::FlatRate,
        )?;
        Ok(repo::insert_rating_result(&mut **tx, &result).await?)
    }

    /// One result per price window. Usage is aggregated per window from the
    /// enriched event stream, then dispatched to the model's calculator.
    async fn rate_metered_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cycle: &BillingCycle,
        subscription: &Subscription,
        item: &SubscriptionItem,
        price: &Price,
        model: PricingModel,
        meter_id: Uuid,
        currency: &str,
        feature_code: &str,
        window: RatingWindow,
    ) -> Result<usize> {
        let amounts = repo::list_price_amounts(
            &mut **tx,
            cycle.org_id,
            price.id,
            Some(meter_id),
            currency,
            window.start,
            window.end,
        )
        .await?;
        let price_windows = build_price_windows(price.id, Some(meter_id), window, &amounts)?;

        let tiers = match model {
            PricingModel::TieredVolume | PricingModel::TieredGraduated => {
                repo::list_price_tiers(&mut **tx, cycle.org_id, price.id).await?
            }
            _ => Vec::new(),
        };

        let mut inserted = 0usize;

        for piece in &price_windows {
            let quantity = repo::aggregate_usage(
                &mut **tx,
                cycle.org_id,
                subscription.id,
                meter_id,
                piece.start,
                piece.end,
            )
            .await?;

            let (rated, source) = match model {
                PricingModel::PerUnit => (
                    calculator::per_unit(quantity, &piece.amount)?,
                    RatingSource::UsageEvents,
                ),
                PricingModel::TieredVolume => (
                    calculator::tiered_volume(price.id, quantity, &tiers)?,
                    RatingSource::TieredVolume,
                ),
                PricingModel::TieredGraduated => (
                    calculator::tiered_graduated(price.id, quantity, &tiers)?,
                    RatingSource::TieredGraduated,
                ),
                PricingModel::Flat => {
                    return Err(RatingError::Internal(
                        "flat price dispatched to metered path".to_string(),
                    ))
                }
            };

            let result = build_result(
                cycle,
                subscription,
                item,
                Some(meter_id),
                feature_code,
                quantity,
                rated,
                currency,
                piece.start,
                piece.end,
                source,
            )?;
            inserted += usize::from(repo::insert_rating_result(&mut **tx, &result).await?);
        }

        Ok(inserted)
    }

    /// Rating currency precedence: subscription override, then customer
    /// default, then organization default, then the configured fallback.
    async fn resolve_currency(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        subscription: &Subscription,
    ) -> Result<String> {
        let customer = repo::get_customer_currency(
            &mut **tx,
            subscription.org_id,
            subscription.customer_id,
        )
        .await?;
        let organization = repo::get_org_currency(&mut **tx, subscription.org_id).await?;

        Ok(pick_currency(
            subscription.currency.as_deref(),
            customer.as_deref(),
            organization.as_deref(),
            &self.config.fallback_currency,
        ))
    }
}

fn pick_currency(
    subscription: Option<&str>,
    customer: Option<&str>,
    organization: Option<&str>,
    fallback: &str,
) -> String {
    subscription
        .or(customer)
        .or(organization)
        .unwrap_or(fallback)
        .to_string()
}

/// First entitlement matching the item, in `effective_from` order: metered
/// items match on the meter, flat items on the price's product.
fn match_entitlement<'a>(
    entitlements: &'a [SubscriptionEntitlement],
    item: &SubscriptionItem,
    price: &Price,
) -> Option<&'a SubscriptionEntitlement> {
    match item.meter_id {
        Some(meter_id) => entitlements.iter().find(|e| e.meter_id == Some(meter_id)),
        None => entitlements
            .iter()
            .find(|e| e.product_id == Some(price.product_id)),
    }
}

fn build_result(
    cycle: &BillingCycle,
    subscription: &Subscription,
    item: &SubscriptionItem,
    meter_id: Option<Uuid>,
    feature_code: &str,
    quantity: f64,
    rated: RatedAmount,
    currency: &str,
    period_start: OffsetDateTime,
    period_end: OffsetDateTime,
    source: RatingSource,
) -> Result<RatingResult> {
    let checksum = rating_checksum(
        cycle.id,
        subscription.id,
        meter_id,
        item.price_id,
        feature_code,
        period_start,
        period_end,
    )?;

    Ok(RatingResult {
        id: Uuid::new_v4(),
        org_id: cycle.org_id,
        subscription_id: subscription.id,
        billing_cycle_id: cycle.id,
        price_id: item.price_id,
        meter_id,
        feature_code: feature_code.to_string(),
        quantity,
        unit_price: rated.unit_price,
        amount: rated.amount,
        currency: currency.to_string(),
        period_start,
        period_end,
        source: source.as_str().to_string(),
        checksum,
        created_at: OffsetDateTime::now_utc(),
    })
}
