//! Wire types of the aggregation API.

use serde::{Deserialize, Serialize};

/// Tokens returned by the code exchange.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// An account at a linked institution.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BankAccount {
    pub account_id: String,
    pub institution_name: String,
    /// Full account number as returned by the API; never persisted.
    pub account_number: String,
    #[serde(default)]
    pub account_name: Option<String>,
}

impl BankAccount {
    /// Last four characters of the account number.
    pub fn mask(&self) -> String {
        let chars: Vec<char> = self.account_number.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    }
}

/// One transaction from the feed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BankTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Signed; negative values are debits.
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    /// `yyyy-MM-dd`
    pub posted_date: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl BankTransaction {
    /// Merchant name, falling back to the free-text description.
    pub fn display_merchant(&self) -> &str {
        match self.merchant_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.description,
        }
    }
}

/// Optional narrowing for transaction listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransactionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// `yyyy-MM-dd`, inclusive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    /// `yyyy-MM-dd`, inclusive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct AccountsResponse {
    pub accounts: Vec<BankAccount>,
}

#[derive(Deserialize)]
pub(crate) struct TransactionsResponse {
    pub transactions: Vec<BankTransaction>,
}
