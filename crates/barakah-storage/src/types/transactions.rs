//! Synced bank transactions and their compliance label.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{TransactionId, UserId};

/// Compliance label assigned by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Halal,
    Haram,
    Unknown,
}

/// Error type for parsing ComplianceStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseComplianceStatusError(pub String);

impl std::fmt::Display for ParseComplianceStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid compliance status: {}", self.0)
    }
}

impl std::error::Error for ParseComplianceStatusError {}

impl FromStr for ComplianceStatus {
    type Err = ParseComplianceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halal" => Ok(ComplianceStatus::Halal),
            "haram" => Ok(ComplianceStatus::Haram),
            "unknown" => Ok(ComplianceStatus::Unknown),
            _ => Err(ParseComplianceStatusError(s.to_string())),
        }
    }
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Halal => "halal",
            ComplianceStatus::Haram => "haram",
            ComplianceStatus::Unknown => "unknown",
        }
    }
}

/// A transaction ingested from the bank feed.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub user_id: UserId,
    pub source_transaction_id: String, // Dedup key together with user_id
    pub merchant_name: String,
    pub category: String,
    pub amount: f64, // Absolute value
    pub timestamp: DateTime<Utc>,
    pub display_date: String, // dd/MM/yyyy - HH:mm, or the raw source date
    pub compliance_status: ComplianceStatus,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a transaction
#[derive(Clone, Debug)]
pub struct CreateTransactionParams {
    pub user_id: UserId,
    pub source_transaction_id: String,
    pub merchant_name: String,
    pub category: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub display_date: String,
    pub compliance_status: ComplianceStatus,
}
