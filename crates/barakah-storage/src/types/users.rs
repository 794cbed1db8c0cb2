//! User profile types.

use chrono::{DateTime, Utc};

use super::UserId;

/// Profile document stored alongside the identity-provider account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub email_verified: bool,
    pub profile_complete: bool,
}

/// Parameters for creating a profile
#[derive(Clone, Debug)]
pub struct CreateProfileParams {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
}
