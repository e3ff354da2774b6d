//! Organization-activity gate
//!
//! The rating engine consumes the organization lifecycle only through
//! [`OrganizationGate::must_be_active`]. The gate is checked before the
//! rating transaction opens and never while holding it. The lifecycle itself
//! is a persisted state machine over `organizations.status`; transitions go
//! through [`transition_org_status`] and follow the table in
//! [`OrgStatus::can_transition_to`].

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use meterline_shared::OrgStatus;

use crate::error::{RatingError, Result};
use crate::repo;

/// Read-only, non-blocking activity check for one organization.
#[async_trait]
pub trait OrganizationGate: Send + Sync {
    /// Returns `Ok(())` when the organization may be billed and served.
    async fn must_be_active(&self, org_id: Uuid) -> Result<()>;
}

/// Gate backed by the persisted organization status.
#[derive(Clone)]
pub struct PgOrganizationGate {
    pool: PgPool,
}

impl PgOrganizationGate {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationGate for PgOrganizationGate {
    async fn must_be_active(&self, org_id: Uuid) -> Result<()> {
        let raw = repo::get_org_status(&self.pool, org_id)
            .await?
            .ok_or_else(|| RatingError::OrganizationInactive {
                org_id,
                status: "missing".to_string(),
            })?;

        match OrgStatus::from_str(&raw) {
            Ok(status) if status.is_active() => Ok(()),
            _ => Err(RatingError::OrganizationInactive {
                org_id,
                status: raw,
            }),
        }
    }
}

/// Move an organization to `next`, enforcing the lifecycle transition table.
///
/// The update is optimistic: it only applies while the row still holds the
/// status that was read, so two concurrent transitions cannot both win.
pub async fn transition_org_status(
    pool: &PgPool,
    org_id: Uuid,
    next: OrgStatus,
) -> Result<OrgStatus> {
    let raw = repo::get_org_status(pool, org_id)
        .await?
        .ok_or_else(|| RatingError::OrganizationInactive {
            org_id,
            status: "missing".to_string(),
        })?;

    let current = OrgStatus::from_str(&raw).map_err(RatingError::Internal)?;

    if !current.can_transition_to(next) {
        return Err(RatingError::InvalidStatusTransition {
            from: current.to_string(),
            to: next.to_string(),
        });
    }

    let updated = repo::update_org_status(pool, org_id, current.as_str(), next.as_str()).await?;
    if updated == 0 {
        return Err(RatingError::ConcurrentModification(format!(
            "organization {} status changed during transition",
            org_id
        )));
    }

    tracing::info!(
        org_id = %org_id,
        from = %current,
        to = %next,
        "Organization status transitioned"
    );

    Ok(next)
}
