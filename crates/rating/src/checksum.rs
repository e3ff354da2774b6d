//! Rating-result fingerprints
//!
//! Every rating result carries a deterministic SHA-256 fingerprint over its
//! identity fields. The fingerprint is the natural key in storage: re-running
//! rating with unchanged inputs reproduces identical checksums, so a
//! duplicate insert is a silent no-op and retries stay idempotent.

use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::error::{RatingError, Result};

/// Field delimiter; not expected in any fingerprinted field.
const DELIMITER: &str = "|";

/// Stands in for the meter ID on flat (unmetered) results.
const FLAT_METER_MARKER: &str = "flat";

/// Compute the fingerprint for one rating result.
pub fn rating_checksum(
    billing_cycle_id: Uuid,
    subscription_id: Uuid,
    meter_id: Option<Uuid>,
    price_id: Uuid,
    feature_code: &str,
    period_start: OffsetDateTime,
    period_end: OffsetDateTime,
) -> Result<String> {
    let meter = meter_id.map_or_else(|| FLAT_METER_MARKER.to_string(), |id| id.to_string());

    let payload = [
        billing_cycle_id.to_string(),
        subscription_id.to_string(),
        meter,
        price_id.to_string(),
        feature_code.to_string(),
        canonical_timestamp(period_start)?,
        canonical_timestamp(period_end)?,
    ]
    .join(DELIMITER);

    Ok(hex::encode(Sha256::digest(payload.as_bytes())))
}

/// RFC 3339 in UTC, the canonical timestamp form inside fingerprints.
fn canonical_timestamp(at: OffsetDateTime) -> Result<String> {
    at.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| RatingError::Internal(format!("timestamp formatting failed: {}", e)))
}
