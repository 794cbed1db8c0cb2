//! Periodic cleanup of stale OTP records and reset tokens.

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, SYSTEM_ACTOR};
use barakah_storage::Store;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::otp::OtpPolicy;
use crate::reset::RESET_TOKEN_TTL;
use crate::upstream::{bounded, UpstreamError, DEFAULT_UPSTREAM_TIMEOUT};

#[derive(Clone, Debug)]
pub struct SweepPolicy {
    /// OTP records created longer ago than this are removed, unless they are
    /// still locking their address.
    pub otp_horizon: Duration,
    pub reset_horizon: Duration,
    pub page_size: u32,
    pub lockout: OtpPolicy,
    pub upstream_timeout: std::time::Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            otp_horizon: Duration::minutes(5),
            reset_horizon: RESET_TOKEN_TTL,
            page_size: 500,
            lockout: OtpPolicy::default(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub otps_deleted: u64,
    pub tokens_deleted: u64,
}

pub struct Sweeper {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    policy: SweepPolicy,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        policy: SweepPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            policy,
        }
    }

    /// One pass over both collections: a keyset-paginated read, then one
    /// batch delete per page.
    pub async fn run_once(&self) -> Result<SweepReport, UpstreamError> {
        let otps_deleted = self.sweep_otps().await?;
        let tokens_deleted = self.sweep_reset_tokens().await?;
        info!(otps_deleted, tokens_deleted, "sweep finished");
        Ok(SweepReport {
            otps_deleted,
            tokens_deleted,
        })
    }

    async fn sweep_otps(&self) -> Result<u64, UpstreamError> {
        let now = self.clock.now();
        let cutoff = now - self.policy.otp_horizon;
        let timeout = self.policy.upstream_timeout;
        let mut after: Option<String> = None;
        let mut deleted = 0u64;
        let mut retained = 0u64;

        loop {
            let page = bounded(
                timeout,
                "store",
                self.store
                    .list_otps_created_before(cutoff, after.clone(), self.policy.page_size),
            )
            .await?;
            let Some(last) = page.last() else { break };
            after = Some(last.email.clone());
            let full_page = page.len() as u32 == self.policy.page_size;

            let (locked, stale): (Vec<_>, Vec<_>) = page
                .into_iter()
                .partition(|r| self.policy.lockout.lock_status(r, now).locked);
            retained += locked.len() as u64;

            if !stale.is_empty() {
                let emails: Vec<String> = stale.into_iter().map(|r| r.email).collect();
                deleted += bounded(timeout, "store", self.store.delete_otps(&emails)).await?;
            }
            debug!(deleted, retained, "otp sweep page done");
            if !full_page {
                break;
            }
        }

        self.audit(AuditAction::SweepOtps, deleted, retained).await;
        Ok(deleted)
    }

    async fn sweep_reset_tokens(&self) -> Result<u64, UpstreamError> {
        let cutoff = self.clock.now() - self.policy.reset_horizon;
        let timeout = self.policy.upstream_timeout;
        let mut after: Option<String> = None;
        let mut deleted = 0u64;

        loop {
            let page = bounded(
                timeout,
                "store",
                self.store.list_reset_tokens_created_before(
                    cutoff,
                    after.clone(),
                    self.policy.page_size,
                ),
            )
            .await?;
            let Some(last) = page.last() else { break };
            after = Some(last.email.clone());
            let full_page = page.len() as u32 == self.policy.page_size;

            let emails: Vec<String> = page.into_iter().map(|t| t.email).collect();
            deleted += bounded(timeout, "store", self.store.delete_reset_tokens(&emails)).await?;
            if !full_page {
                break;
            }
        }

        self.audit(AuditAction::SweepResetTokens, deleted, 0).await;
        Ok(deleted)
    }

    async fn audit(&self, action: AuditAction, deleted: u64, retained: u64) {
        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(SYSTEM_ACTOR, action)
                .details(serde_json::json!({ "deleted": deleted, "retained": retained }))
                .build(),
        )
        .await;
    }
}
