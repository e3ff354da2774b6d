//! Integration tests for end-to-end rating runs
//!
//! These tests verify the transactional rating flow against a real database:
//! idempotent recomputation, window containment, and all-or-nothing failure.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/meterline_test"
//! cargo test --test rating_flow -- --test-threads=1
//! ```

use meterline_rating::{RatingConfig, RatingError, RatingService};
use sqlx::PgPool;
use time::macros::datetime;
use time::OffsetDateTime;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

const PERIOD_START: OffsetDateTime = datetime!(2024-03-01 00:00 UTC);
const PERIOD_END: OffsetDateTime = datetime!(2024-04-01 00:00 UTC);

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

struct Fixture {
    org_id: Uuid,
    customer_id: Uuid,
    product_id: Uuid,
    meter_id: Uuid,
    subscription_id: Uuid,
    cycle_id: Uuid,
}

/// Create an active org with one customer, product, and meter, plus a
/// subscription covering the whole test period and a closing billing cycle.
async fn create_fixture(pool: &PgPool) -> Fixture {
    let org_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();
    let meter_id = Uuid::new_v4();
    let subscription_id = Uuid::new_v4();
    let cycle_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO organizations (id, name, status, default_currency) VALUES ($1, $2, 'active', 'USD')",
    )
    .bind(org_id)
    .bind(format!("test-org-{}", org_id))
    .execute(pool)
    .await
    .expect("Failed to create test organization");

    sqlx::query("INSERT INTO customers (id, org_id, name) VALUES ($1, $2, 'Test Customer')")
        .bind(customer_id)
        .bind(org_id)
        .execute(pool)
        .await
        .expect("Failed to create test customer");

    sqlx::query("INSERT INTO products (id, org_id, name) VALUES ($1, $2, 'Test Product')")
        .bind(product_id)
        .bind(org_id)
        .execute(pool)
        .await
        .expect("Failed to create test product");

    sqlx::query("INSERT INTO meters (id, org_id, code, name) VALUES ($1, $2, $3, 'API Calls')")
        .bind(meter_id)
        .bind(org_id)
        .bind(format!("api_calls_{}", meter_id))
        .execute(pool)
        .await
        .expect("Failed to create test meter");

    sqlx::query(
        "INSERT INTO subscriptions (id, org_id, customer_id, start_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(subscription_id)
    .bind(org_id)
    .bind(customer_id)
    .bind(datetime!(2023-01-01 00:00 UTC))
    .execute(pool)
    .await
    .expect("Failed to create test subscription");

    sqlx::query(
        r#"
        INSERT INTO billing_cycles (id, org_id, subscription_id, period_start, period_end, status)
        VALUES ($1, $2, $3, $4, $5, 'closing')
        "#,
    )
    .bind(cycle_id)
    .bind(org_id)
    .bind(subscription_id)
    .bind(PERIOD_START)
    .bind(PERIOD_END)
    .execute(pool)
    .await
    .expect("Failed to create test billing cycle");

    Fixture {
        org_id,
        customer_id,
        product_id,
        meter_id,
        subscription_id,
        cycle_id,
    }
}

async fn add_price(pool: &PgPool, f: &Fixture, pricing_model: &str) -> Uuid {
    let price_id = Uuid::new_v4();
    sqlx::query("INSERT INTO prices (id, org_id, product_id, pricing_model) VALUES ($1, $2, $3, $4)")
        .bind(price_id)
        .bind(f.org_id)
        .bind(f.product_id)
        .bind(pricing_model)
        .execute(pool)
        .await
        .expect("Failed to create test price");
    price_id
}

async fn add_price_amount(pool: &PgPool, f: &Fixture, price_id: Uuid, unit_amount: f64) {
    sqlx::query(
        r#"
        INSERT INTO price_amounts (id, org_id, price_id, currency, unit_amount, effective_from)
        VALUES ($1, $2, $3, 'USD', $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(f.org_id)
    .bind(price_id)
    .bind(unit_amount)
    .bind(datetime!(2023-01-01 00:00 UTC))
    .execute(pool)
    .await
    .expect("Failed to create test price amount");
}

async fn add_item(pool: &PgPool, f: &Fixture, price_id: Uuid, meter_id: Option<Uuid>) -> Uuid {
    let item_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO subscription_items (id, org_id, subscription_id, price_id, meter_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(item_id)
    .bind(f.org_id)
    .bind(f.subscription_id)
    .bind(price_id)
    .bind(meter_id)
    .execute(pool)
    .await
    .expect("Failed to create test subscription item");
    item_id
}

async fn add_usage(pool: &PgPool, f: &Fixture, quantity: f64, occurred_at: OffsetDateTime) {
    sqlx::query(
        r#"
        INSERT INTO usage_events (id, org_id, subscription_id, meter_id, quantity, state, occurred_at)
        VALUES ($1, $2, $3, $4, $5, 'enriched', $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(f.org_id)
    .bind(f.subscription_id)
    .bind(f.meter_id)
    .bind(quantity)
    .bind(occurred_at)
    .execute(pool)
    .await
    .expect("Failed to create test usage event");
}

async fn fetch_results(pool: &PgPool, cycle_id: Uuid) -> Vec<(String, i64, f64)> {
    sqlx::query_as(
        r#"
        SELECT checksum, amount, quantity
        FROM rating_results
        WHERE billing_cycle_id = $1
        ORDER BY checksum
        "#,
    )
    .bind(cycle_id)
    .fetch_all(pool)
    .await
    .expect("Failed to fetch rating results")
}

async fn cleanup(pool: &PgPool, f: &Fixture) {
    for statement in [
        "DELETE FROM rating_results WHERE org_id = $1",
        "DELETE FROM usage_events WHERE org_id = $1",
        "DELETE FROM billing_cycles WHERE org_id = $1",
        "DELETE FROM subscription_entitlements WHERE org_id = $1",
        "DELETE FROM subscription_items WHERE org_id = $1",
        "DELETE FROM subscriptions WHERE org_id = $1",
        "DELETE FROM price_tiers WHERE org_id = $1",
        "DELETE FROM price_amounts WHERE org_id = $1",
        "DELETE FROM prices WHERE org_id = $1",
        "DELETE FROM meters WHERE org_id = $1",
        "DELETE FROM products WHERE org_id = $1",
        "DELETE FROM customers WHERE org_id = $1",
        "DELETE FROM organizations WHERE id = $1",
    ] {
        sqlx::query(statement)
            .bind(f.org_id)
            .execute(pool)
            .await
            .expect("Failed to clean up test data");
    }
}

fn service(pool: &PgPool) -> RatingService {
    RatingService::new(pool.clone()).with_config(RatingConfig::default())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_rating_run_is_idempotent() {
    let pool = setup_pool().await;
    let fixture = create_fixture(&pool).await;

    let flat_price = add_price(&pool, &fixture, "flat").await;
    add_price_amount(&pool, &fixture, flat_price, 2_000.0).await;
    add_item(&pool, &fixture, flat_price, None).await;

    let per_unit_price = add_price(&pool, &fixture, "per_unit").await;
    add_price_amount(&pool, &fixture, per_unit_price, 3.0).await;
    add_item(&pool, &fixture, per_unit_price, Some(fixture.meter_id)).await;
    add_usage(&pool, &fixture, 100.0, datetime!(2024-03-10 00:00 UTC)).await;

    let svc = service(&pool);
    svc.run_rating(fixture.cycle_id).await.expect("first run failed");
    let first = fetch_results(&pool, fixture.cycle_id).await;
    assert_eq!(first.len(), 2);

    svc.run_rating(fixture.cycle_id).await.expect("second run failed");
    let second = fetch_results(&pool, fixture.cycle_id).await;

    // Byte-identical result set: same checksums, amounts, quantities
    assert_eq!(first, second);

    cleanup(&pool, &fixture).await;
}

#[tokio::test]
async fn test_results_contained_in_cycle_period() {
    let pool = setup_pool().await;
    let fixture = create_fixture(&pool).await;

    let price = add_price(&pool, &fixture, "per_unit").await;
    add_price_amount(&pool, &fixture, price, 5.0).await;
    add_item(&pool, &fixture, price, Some(fixture.meter_id)).await;
    add_usage(&pool, &fixture, 10.0, datetime!(2024-03-05 00:00 UTC)).await;

    service(&pool)
        .run_rating(fixture.cycle_id)
        .await
        .expect("run failed");

    let rows: Vec<(OffsetDateTime, OffsetDateTime)> = sqlx::query_as(
        "SELECT period_start, period_end FROM rating_results WHERE billing_cycle_id = $1",
    )
    .bind(fixture.cycle_id)
    .fetch_all(&pool)
    .await
    .expect("Failed to fetch result periods");

    assert!(!rows.is_empty());
    for (start, end) in rows {
        assert!(start >= PERIOD_START);
        assert!(end <= PERIOD_END);
        assert!(start < end);
    }

    cleanup(&pool, &fixture).await;
}

#[tokio::test]
async fn test_missing_price_amount_preserves_prior_results() {
    let pool = setup_pool().await;
    let fixture = create_fixture(&pool).await;

    let price = add_price(&pool, &fixture, "per_unit").await;
    add_price_amount(&pool, &fixture, price, 5.0).await;
    add_item(&pool, &fixture, price, Some(fixture.meter_id)).await;
    add_usage(&pool, &fixture, 10.0, datetime!(2024-03-05 00:00 UTC)).await;

    let svc = service(&pool);
    svc.run_rating(fixture.cycle_id).await.expect("seed run failed");
    let before = fetch_results(&pool, fixture.cycle_id).await;

    // A second metered item whose price has no amount rows: the next run
    // must fail and leave the first run's output untouched.
    let broken_price = add_price(&pool, &fixture, "per_unit").await;
    add_item(&pool, &fixture, broken_price, Some(fixture.meter_id)).await;

    let err = svc.run_rating(fixture.cycle_id).await.unwrap_err();
    assert!(matches!(err, RatingError::MissingPriceAmount { .. }));

    let after = fetch_results(&pool, fixture.cycle_id).await;
    assert_eq!(before, after);

    cleanup(&pool, &fixture).await;
}

#[tokio::test]
async fn test_cycle_must_be_closing() {
    let pool = setup_pool().await;
    let fixture = create_fixture(&pool).await;

    sqlx::query("UPDATE billing_cycles SET status = 'open' WHERE id = $1")
        .bind(fixture.cycle_id)
        .execute(&pool)
        .await
        .expect("Failed to update cycle status");

    let err = service(&pool).run_rating(fixture.cycle_id).await.unwrap_err();
    assert!(matches!(err, RatingError::CycleNotClosing { .. }));

    cleanup(&pool, &fixture).await;
}

#[tokio::test]
async fn test_unknown_cycle_fails() {
    let pool = setup_pool().await;
    let err = service(&pool).run_rating(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RatingError::CycleNotFound(_)));
}
