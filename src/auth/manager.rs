use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::credentials::CredentialStore;
use super::types::{SessionState, TokenPair};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// An access token must outlive "now" by this many seconds to be used
pub const ACCESS_TOKEN_MARGIN_SECS: i64 = 60;

/// Access token is usable when no expiry is recorded or it is beyond the margin
fn access_usable(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expiry {
        None => true,
        Some(exp) => exp > now + Duration::seconds(ACCESS_TOKEN_MARGIN_SECS),
    }
}

/// Refresh token is expired only once its expiry is strictly in the past
fn refresh_expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expiry, Some(exp) if exp < now)
}

/// Session manager
/// Single source of truth for "is there a usable token". Holds no in-memory
/// token state: every evaluation reads the persisted record.
#[derive(Clone)]
pub struct SessionManager {
    credentials: CredentialStore,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            credentials: CredentialStore::new(store),
        }
    }

    /// Persist a token pair; user data is written only when provided
    pub async fn set_tokens(&self, tokens: &TokenPair, user_data: Option<&Value>) -> Result<()> {
        self.credentials.write_tokens(tokens).await?;

        if let Some(user) = user_data.filter(|user| !user.is_null()) {
            self.credentials.write_user_data(&user.to_string()).await?;
        }

        tracing::debug!(
            access_expiration = %tokens.access_expiration,
            refresh_expiration = %tokens.refresh_expiration,
            "Stored session tokens"
        );
        Ok(())
    }

    /// Stored access token, unless it expires within the safety margin
    pub async fn get_access_token(&self) -> Result<Option<String>> {
        let Some(token) = self.credentials.access_token().await? else {
            return Ok(None);
        };

        let expiry = self.credentials.access_expiry().await?;
        if !access_usable(expiry, Utc::now()) {
            tracing::debug!("Access token expired or expiring soon");
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Stored refresh token; an expired one invalidates the whole session
    pub async fn get_refresh_token(&self) -> Result<Option<String>> {
        let Some(token) = self.credentials.refresh_token().await? else {
            return Ok(None);
        };

        let expiry = self.credentials.refresh_expiry().await?;
        if refresh_expired(expiry, Utc::now()) {
            tracing::info!("Refresh token expired, clearing session");
            self.clear_tokens().await?;
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Cached identity; malformed JSON reads as absent
    pub async fn get_user_data(&self) -> Result<Option<Value>> {
        let Some(raw) = self.credentials.user_data().await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring malformed cached user data: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn clear_tokens(&self) -> Result<()> {
        self.credentials.remove_all().await
    }

    /// Derive the current session state without touching storage
    pub async fn state(&self) -> Result<SessionState> {
        let now = Utc::now();

        if let Some(token) = self.credentials.access_token().await? {
            if access_usable(self.credentials.access_expiry().await?, now) {
                return Ok(SessionState::Authenticated(token));
            }
        }

        if self.credentials.refresh_token().await?.is_none() {
            return Ok(SessionState::Anonymous);
        }

        if refresh_expired(self.credentials.refresh_expiry().await?, now) {
            Ok(SessionState::Expired)
        } else {
            Ok(SessionState::NeedsRefresh)
        }
    }
}
