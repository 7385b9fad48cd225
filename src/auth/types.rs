// Authentication types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token pair returned by the login and refresh endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "refresh")]
    pub refresh_token: String,
    pub access_expiration: String,
    pub refresh_expiration: String,
}

/// Refresh endpoint request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Session state derived from the persisted credential record
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Nothing stored
    Anonymous,

    /// Access token usable as-is
    Authenticated(String),

    /// Access token missing or near expiry, refresh token still valid
    NeedsRefresh,

    /// Refresh token past its expiry
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Anonymous => write!(f, "not logged in"),
            SessionState::Authenticated(_) => write!(f, "logged in"),
            SessionState::NeedsRefresh => write!(f, "logged in (access token will be refreshed)"),
            SessionState::Expired => write!(f, "session expired"),
        }
    }
}
