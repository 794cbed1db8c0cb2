//! Password reset tokens.

use chrono::{DateTime, Utc};

/// Short-lived token that authorises one administrative password update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordResetToken {
    pub email: String, // Lowercased, primary key
    pub token: String, // 64 hex chars
    pub created_at: DateTime<Utc>,
}
