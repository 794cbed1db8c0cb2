//! Bank account linking: Unlinked -> Linking -> Linked -> Unlinked.
//!
//! Credentials for a linked account live in secure storage as a single JSON
//! entry, so unlinking removes every field at once.

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, AuditResult};
use barakah_bank::{BankAccount, BankClient};
use barakah_storage::UserId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::code::generate_link_state;
use crate::secure_storage::{SecureStorage, SecureStorageError};
use crate::sync::{SyncError, TransactionSync};
use crate::upstream::{bounded, UpstreamError};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no bank account is linked")]
    NotLinked,
    #[error("the bank returned no accounts for this authorization")]
    NoAccounts,
    #[error(transparent)]
    Storage(#[from] SecureStorageError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("stored link is unreadable: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linking {
        connect_url: String,
    },
    Linked {
        institution_name: String,
        account_mask: String,
        linked_at: DateTime<Utc>,
    },
}

/// Everything stored for a linked account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedBankAccount {
    pub account_id: String,
    pub institution_name: String,
    /// Last four digits only.
    pub account_mask: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub linked_at: DateTime<Utc>,
}

impl std::fmt::Debug for LinkedBankAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedBankAccount")
            .field("account_id", &self.account_id)
            .field("institution_name", &self.institution_name)
            .field("account_mask", &self.account_mask)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("linked_at", &self.linked_at)
            .finish()
    }
}

fn storage_key(user_id: &UserId) -> String {
    format!("bank_link:{}", user_id)
}

pub struct BankLink {
    bank: Arc<dyn BankClient>,
    secure: Arc<dyn SecureStorage>,
    sync: TransactionSync,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    // Connect URLs handed out and not yet completed, per user
    pending: DashMap<UserId, String>,
}

impl BankLink {
    pub fn new(
        bank: Arc<dyn BankClient>,
        secure: Arc<dyn SecureStorage>,
        sync: TransactionSync,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            bank,
            secure,
            sync,
            audit,
            clock,
            timeout,
            pending: DashMap::new(),
        }
    }

    pub fn state(&self, user_id: &UserId) -> Result<LinkState, LinkError> {
        if let Some(linked) = self.linked_account(user_id)? {
            return Ok(LinkState::Linked {
                institution_name: linked.institution_name,
                account_mask: linked.account_mask,
                linked_at: linked.linked_at,
            });
        }
        Ok(match self.pending.get(user_id) {
            Some(url) => LinkState::Linking {
                connect_url: url.value().clone(),
            },
            None => LinkState::Unlinked,
        })
    }

    pub fn linked_account(&self, user_id: &UserId) -> Result<Option<LinkedBankAccount>, LinkError> {
        let Some(raw) = self.secure.get(&storage_key(user_id))? else {
            return Ok(None);
        };
        serde_json::from_str(raw.as_str())
            .map(Some)
            .map_err(|e| LinkError::Decode(e.to_string()))
    }

    /// Build the hosted connect URL and move to `Linking`.
    pub fn begin_link(&self, user_id: &UserId) -> Result<String, LinkError> {
        let url = self
            .bank
            .connect_url(&generate_link_state())
            .map_err(UpstreamError::from)?;
        self.pending.insert(user_id.clone(), url.clone());
        tracing::debug!(user_id = %user_id, "bank link started");
        Ok(url)
    }

    /// Complete linking with the authorization `code` from the connect page.
    ///
    /// After the credentials are stored, one account listing and one sync run;
    /// their failures are logged and do not undo the link.
    pub async fn link_account(
        &self,
        user_id: &UserId,
        code: &str,
    ) -> Result<LinkedBankAccount, LinkError> {
        let result = self.store_link(user_id, code).await;
        let linked = match result {
            Ok(linked) => linked,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "bank link failed");
                self.audit(user_id, AuditAction::BankLink, AuditResult::Error, Some(e.to_string()))
                    .await;
                return Err(e);
            }
        };
        self.pending.remove(user_id);
        tracing::info!(
            user_id = %user_id,
            institution = %linked.institution_name,
            "bank account linked"
        );
        self.audit(user_id, AuditAction::BankLink, AuditResult::Success, None)
            .await;

        if let Err(e) = self.fetch_accounts(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "post-link account fetch failed");
        }
        if let Err(e) = self
            .sync
            .sync_transactions(user_id, &linked.access_token)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "post-link transaction sync failed");
        }

        Ok(linked)
    }

    async fn store_link(&self, user_id: &UserId, code: &str) -> Result<LinkedBankAccount, LinkError> {
        let tokens = bounded(self.timeout, "bank", self.bank.exchange_code(code)).await?;
        let accounts = bounded(
            self.timeout,
            "bank",
            self.bank.list_accounts(&tokens.access_token),
        )
        .await?;
        let first = accounts.first().ok_or(LinkError::NoAccounts)?;

        let linked = LinkedBankAccount {
            account_id: first.account_id.clone(),
            institution_name: first.institution_name.clone(),
            account_mask: first.mask(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            linked_at: self.clock.now(),
        };
        let json = serde_json::to_string(&linked).map_err(|e| LinkError::Decode(e.to_string()))?;
        self.secure.set(&storage_key(user_id), &json)?;
        Ok(linked)
    }

    /// Accounts visible through the stored access token.
    pub async fn fetch_accounts(&self, user_id: &UserId) -> Result<Vec<BankAccount>, LinkError> {
        let linked = self.linked_account(user_id)?.ok_or(LinkError::NotLinked)?;
        Ok(bounded(
            self.timeout,
            "bank",
            self.bank.list_accounts(&linked.access_token),
        )
        .await?)
    }

    /// Sync transactions with the stored access token.
    pub async fn sync_now(&self, user_id: &UserId) -> Result<usize, LinkError> {
        let linked = self.linked_account(user_id)?.ok_or(LinkError::NotLinked)?;
        Ok(self
            .sync
            .sync_transactions(user_id, &linked.access_token)
            .await?)
    }

    /// Forget the stored credentials. The bank is not told.
    pub async fn unlink(&self, user_id: &UserId) -> Result<(), LinkError> {
        self.secure.delete(&storage_key(user_id))?;
        self.pending.remove(user_id);
        tracing::info!(user_id = %user_id, "bank account unlinked");
        self.audit(user_id, AuditAction::BankUnlink, AuditResult::Success, None)
            .await;
        Ok(())
    }

    async fn audit(
        &self,
        user_id: &UserId,
        action: AuditAction,
        result: AuditResult,
        reason: Option<String>,
    ) {
        let mut builder = AuditEvent::builder(user_id.to_string(), action)
            .user_id(Some(user_id))
            .resource("bank_link", user_id.to_string())
            .result(result);
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        record_best_effort(self.audit.as_ref(), builder.build()).await;
    }
}
