//! One-time passcode records.

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Which flow an OTP was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    SignUp,
    Login,
    ForgotPassword,
}

/// Error type for parsing OtpPurpose from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOtpPurposeError(pub String);

impl std::fmt::Display for ParseOtpPurposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid otp purpose: {}", self.0)
    }
}

impl std::error::Error for ParseOtpPurposeError {}

impl FromStr for OtpPurpose {
    type Err = ParseOtpPurposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign_up" => Ok(OtpPurpose::SignUp),
            "login" => Ok(OtpPurpose::Login),
            "forgot_password" => Ok(OtpPurpose::ForgotPassword),
            _ => Err(ParseOtpPurposeError(s.to_string())),
        }
    }
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::SignUp => "sign_up",
            OtpPurpose::Login => "login",
            OtpPurpose::ForgotPassword => "forgot_password",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active OTP for an email address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpRecord {
    pub email: String, // Lowercased, primary key
    pub code: String,  // 6 ASCII digits
    pub purpose: OtpPurpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: u32, // Failed comparisons, never decremented
    pub verified: bool,     // One-way false -> true
}

impl OtpRecord {
    /// Whether `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Parameters for creating/overwriting the OTP for an address.
///
/// Upserting always resets `attempt_count` to 0 and `verified` to false.
#[derive(Clone, Debug)]
pub struct UpsertOtpParams {
    pub email: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
