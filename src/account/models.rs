//! Account models

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core_types::OwnerId;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AccountRole {
    User = 1,
    Admin = 2,
}

impl From<i16> for AccountRole {
    fn from(v: i16) -> Self {
        match v {
            2 => AccountRole::Admin,
            _ => AccountRole::User,
        }
    }
}

/// Card owner account
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub account_id: OwnerId,
    pub login: String,
    pub role: AccountRole,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}
