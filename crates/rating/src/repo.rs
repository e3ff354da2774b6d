//! Repository access for the rating engine
//!
//! Every function takes `impl PgExecutor<'_>`, so the orchestrator can run
//! the precondition phase against the pool and the rating phase against the
//! open transaction with the same code. Errors surface as raw `sqlx::Error`
//! and roll the whole run back.

use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use meterline_shared::UsageEventState;

use crate::models::{
    BillingCycle, Price, PriceAmount, PriceTier, RatingResult, Subscription, SubscriptionEntitlement,
    SubscriptionItem,
};

pub async fn get_billing_cycle(
    executor: impl PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<BillingCycle>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, subscription_id, period_start, period_end, status, created_at
        FROM billing_cycles
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn get_subscription(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    id: Uuid,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, customer_id, currency, start_at, ended_at, canceled_at, created_at
        FROM subscriptions
        WHERE org_id = $1 AND id = $2
        "#,
    )
    .bind(org_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn list_subscription_items(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    subscription_id: Uuid,
) -> Result<Vec<SubscriptionItem>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, subscription_id, price_id, meter_id, created_at
        FROM subscription_items
        WHERE org_id = $1 AND subscription_id = $2
        ORDER BY created_at, id
        "#,
    )
    .bind(org_id)
    .bind(subscription_id)
    .fetch_all(executor)
    .await
}

/// Entitlements valid anywhere inside `[start, end)`.
pub async fn list_entitlements(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    subscription_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<SubscriptionEntitlement>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, subscription_id, feature_code, meter_id, product_id,
               effective_from, effective_to, created_at
        FROM subscription_entitlements
        WHERE org_id = $1
          AND subscription_id = $2
          AND effective_from < $4
          AND (effective_to IS NULL OR effective_to > $3)
        ORDER BY effective_from, id
        "#,
    )
    .bind(org_id)
    .bind(subscription_id)
    .bind(start)
    .bind(end)
    .fetch_all(executor)
    .await
}

pub async fn get_price(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    id: Uuid,
) -> Result<Option<Price>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, product_id, pricing_model, created_at
        FROM prices
        WHERE org_id = $1 AND id = $2
        "#,
    )
    .bind(org_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Price amounts for one price and currency overlapping `[start, end)`:
/// rows scoped to `meter_id` plus the meter-agnostic default rows.
pub async fn list_price_amounts(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    price_id: Uuid,
    meter_id: Option<Uuid>,
    currency: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<PriceAmount>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, price_id, meter_id, currency, unit_amount,
               min_amount, max_amount, effective_from, effective_to, created_at
        FROM price_amounts
        WHERE org_id = $1
          AND price_id = $2
          AND currency = $3
          AND (meter_id IS NULL OR meter_id IS NOT DISTINCT FROM $4)
          AND effective_from < $6
          AND (effective_to IS NULL OR effective_to > $5)
        ORDER BY effective_from, id
        "#,
    )
    .bind(org_id)
    .bind(price_id)
    .bind(currency)
    .bind(meter_id)
    .bind(start)
    .bind(end)
    .fetch_all(executor)
    .await
}

pub async fn list_price_tiers(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    price_id: Uuid,
) -> Result<Vec<PriceTier>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, org_id, price_id, start_quantity, end_quantity,
               unit_amount, flat_amount, created_at
        FROM price_tiers
        WHERE org_id = $1 AND price_id = $2
        ORDER BY start_quantity
        "#,
    )
    .bind(org_id)
    .bind(price_id)
    .fetch_all(executor)
    .await
}

/// Sum of billable usage over `[start, end)` for one meter. Only events that
/// reached the enriched state count.
pub async fn aggregate_usage(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    subscription_id: Uuid,
    meter_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<f64, sqlx::Error> {
    let result: Option<(f64,)> = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(quantity), 0)::FLOAT8 as total
        FROM usage_events
        WHERE org_id = $1
          AND subscription_id = $2
          AND meter_id = $3
          AND state = $4
          AND occurred_at >= $5
          AND occurred_at < $6
        "#,
    )
    .bind(org_id)
    .bind(subscription_id)
    .bind(meter_id)
    .bind(UsageEventState::Enriched.as_str())
    .bind(start)
    .bind(end)
    .fetch_optional(executor)
    .await?;

    Ok(result.map(|(t,)| t).unwrap_or(0.0))
}

/// Purge all prior results for a cycle. Runs first inside the rating
/// transaction; recomputation replaces, never accumulates.
pub async fn delete_rating_results(
    executor: impl PgExecutor<'_>,
    billing_cycle_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rating_results WHERE billing_cycle_id = $1")
        .bind(billing_cycle_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Insert one rating result. A duplicate checksum is a silent no-op; returns
/// whether a row was actually written.
pub async fn insert_rating_result(
    executor: impl PgExecutor<'_>,
    result: &RatingResult,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        r#"
        INSERT INTO rating_results (
            id, org_id, subscription_id, billing_cycle_id, price_id, meter_id,
            feature_code, quantity, unit_price, amount, currency,
            period_start, period_end, source, checksum, created_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
        )
        ON CONFLICT (checksum) DO NOTHING
        "#,
    )
    .bind(result.id)
    .bind(result.org_id)
    .bind(result.subscription_id)
    .bind(result.billing_cycle_id)
    .bind(result.price_id)
    .bind(result.meter_id)
    .bind(&result.feature_code)
    .bind(result.quantity)
    .bind(result.unit_price)
    .bind(result.amount)
    .bind(&result.currency)
    .bind(result.period_start)
    .bind(result.period_end)
    .bind(&result.source)
    .bind(&result.checksum)
    .bind(result.created_at)
    .execute(executor)
    .await?;

    Ok(outcome.rows_affected() > 0)
}

pub async fn get_customer_currency(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    customer_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT default_currency FROM customers WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(customer_id)
            .fetch_optional(executor)
            .await?;
    Ok(row.and_then(|(currency,)| currency))
}

pub async fn get_org_currency(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT default_currency FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(executor)
            .await?;
    Ok(row.and_then(|(currency,)| currency))
}

pub async fn get_org_status(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM organizations WHERE id = $1")
        .bind(org_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(status,)| status))
}

/// Optimistic status update: succeeds only when the row is still in `from`.
pub async fn update_org_status(
    executor: impl PgExecutor<'_>,
    org_id: Uuid,
    from: &str,
    to: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE organizations SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
    )
    .bind(org_id)
    .bind(from)
    .bind(to)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
