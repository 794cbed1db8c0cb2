//! Failures of collaborators, and the time bound applied to every call.

use barakah_bank::BankError;
use barakah_email::EmailError;
use barakah_storage::{IdentityError, StoreError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Default ceiling for a single store, email, identity or bank call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("email: {0}")]
    Email(#[from] EmailError),
    #[error("identity: {0}")]
    Identity(#[from] IdentityError),
    #[error("bank: {0}")]
    Bank(#[from] BankError),
    #[error("{what} timed out after {limit:?}")]
    Timeout { what: &'static str, limit: Duration },
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            UpstreamError::Store(StoreError::NotFound)
                | UpstreamError::Identity(IdentityError::NotFound)
        )
    }
}

/// Await `fut` for at most `limit`. Exceeding it is a failure; nothing is retried.
pub async fn bounded<T, E, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<UpstreamError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(what, limit_secs = limit.as_secs(), "upstream call timed out");
            Err(UpstreamError::Timeout { what, limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(31)).await;
            Ok::<_, StoreError>(())
        };
        let err = bounded(DEFAULT_UPSTREAM_TIMEOUT, "store", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { what: "store", .. }));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let ok = bounded(DEFAULT_UPSTREAM_TIMEOUT, "store", async {
            Ok::<_, StoreError>(7)
        })
        .await
        .unwrap();
        assert_eq!(ok, 7);

        let err = bounded(DEFAULT_UPSTREAM_TIMEOUT, "store", async {
            Err::<(), _>(StoreError::NotFound)
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}
