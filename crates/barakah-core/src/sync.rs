//! Pull the bank feed into the local transaction store.

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, AuditResult};
use barakah_bank::{BankClient, BankTransaction, TransactionFilter};
use barakah_storage::{CreateTransactionParams, Store, StoreError, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::classify::classify;
use crate::clock::Clock;
use crate::upstream::{bounded, UpstreamError};

const SOURCE_DATE_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y - %H:%M";
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Reconciles the bank feed against stored transactions.
///
/// Running two syncs for the same user at once is the caller's problem; the
/// SQLite store's unique index turns a racing duplicate into a skip.
#[derive(Clone)]
pub struct TransactionSync {
    store: Arc<dyn Store>,
    bank: Arc<dyn BankClient>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TransactionSync {
    pub fn new(
        store: Arc<dyn Store>,
        bank: Arc<dyn BankClient>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            bank,
            audit,
            clock,
            timeout,
        }
    }

    /// Fetch every transaction the token can see and insert the new ones.
    /// Returns how many were inserted.
    pub async fn sync_transactions(
        &self,
        user_id: &UserId,
        access_token: &str,
    ) -> Result<usize, SyncError> {
        let filter = TransactionFilter::default();
        let fetched = match bounded(
            self.timeout,
            "bank",
            self.bank.list_transactions(access_token, &filter),
        )
        .await
        {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to fetch transactions");
                self.audit_failure(user_id, &e).await;
                return Err(e.into());
            }
        };

        let mut inserted = 0usize;
        let mut skipped = 0usize;
        for transaction in &fetched {
            let exists = bounded(
                self.timeout,
                "store",
                self.store
                    .transaction_exists(user_id, &transaction.transaction_id),
            )
            .await?;
            if exists {
                skipped += 1;
                continue;
            }

            let params = self.to_params(user_id, transaction);
            match bounded(self.timeout, "store", self.store.insert_transaction(&params)).await {
                Ok(_) => inserted += 1,
                Err(UpstreamError::Store(StoreError::AlreadyExists)) => skipped += 1,
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "failed to store transaction");
                    self.audit_failure(user_id, &e).await;
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            fetched = fetched.len(),
            inserted,
            skipped,
            "transaction sync finished"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(user_id.to_string(), AuditAction::TransactionSync)
                .user_id(Some(user_id))
                .resource("transactions", user_id.to_string())
                .details(serde_json::json!({
                    "fetched": fetched.len(),
                    "inserted": inserted,
                    "skipped": skipped,
                }))
                .build(),
        )
        .await;

        Ok(inserted)
    }

    fn to_params(&self, user_id: &UserId, transaction: &BankTransaction) -> CreateTransactionParams {
        let (timestamp, display_date) = match parse_posted_date(&transaction.posted_date) {
            Some(ts) => (ts, ts.format(DISPLAY_DATE_FORMAT).to_string()),
            None => {
                tracing::debug!(
                    source_id = %transaction.transaction_id,
                    raw = %transaction.posted_date,
                    "unparsable posted date, using current time"
                );
                (self.clock.now(), transaction.posted_date.clone())
            }
        };

        let category = if transaction.categories.is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            transaction.categories.join(", ")
        };

        CreateTransactionParams {
            user_id: user_id.clone(),
            source_transaction_id: transaction.transaction_id.clone(),
            merchant_name: transaction.display_merchant().to_string(),
            category,
            amount: transaction.amount.abs(),
            timestamp,
            display_date,
            compliance_status: classify(transaction),
        }
    }

    async fn audit_failure(&self, user_id: &UserId, error: &UpstreamError) {
        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(user_id.to_string(), AuditAction::TransactionSync)
                .user_id(Some(user_id))
                .resource("transactions", user_id.to_string())
                .result(AuditResult::Error)
                .reason(error.to_string())
                .build(),
        )
        .await;
    }
}

/// `yyyy-MM-dd` at midnight UTC.
fn parse_posted_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), SOURCE_DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
