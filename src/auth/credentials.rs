// Typed access to the persisted credential record

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;

use super::types::TokenPair;
use crate::error::Result;
use crate::storage::{keys, KeyValueStore};

/// Keys making up the credential record, in clearing order
const CREDENTIAL_KEYS: [&str; 5] = [
    keys::ACCESS_TOKEN,
    keys::REFRESH_TOKEN,
    keys::ACCESS_EXPIRY,
    keys::REFRESH_EXPIRY,
    keys::USER_DATA,
];

/// Parse a server-provided expiry timestamp
///
/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date
/// (midnight UTC). Returns `None` for anything else.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    None
}

/// CRUD over the discrete credential keys
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        self.non_empty(keys::ACCESS_TOKEN).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.non_empty(keys::REFRESH_TOKEN).await
    }

    pub async fn access_expiry(&self) -> Result<Option<DateTime<Utc>>> {
        self.expiry(keys::ACCESS_EXPIRY).await
    }

    pub async fn refresh_expiry(&self) -> Result<Option<DateTime<Utc>>> {
        self.expiry(keys::REFRESH_EXPIRY).await
    }

    /// Raw serialized user data
    pub async fn user_data(&self) -> Result<Option<String>> {
        self.non_empty(keys::USER_DATA).await
    }

    /// Write the four token fields
    pub async fn write_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.store
            .set(keys::ACCESS_TOKEN, &tokens.access_token)
            .await?;
        self.store
            .set(keys::REFRESH_TOKEN, &tokens.refresh_token)
            .await?;
        self.store
            .set(keys::ACCESS_EXPIRY, &tokens.access_expiration)
            .await?;
        self.store
            .set(keys::REFRESH_EXPIRY, &tokens.refresh_expiration)
            .await
    }

    pub async fn write_user_data(&self, serialized: &str) -> Result<()> {
        self.store.set(keys::USER_DATA, serialized).await
    }

    /// Remove every credential key; absent keys are fine
    pub async fn remove_all(&self) -> Result<()> {
        for key in CREDENTIAL_KEYS {
            self.store.remove(key).await?;
        }
        Ok(())
    }

    async fn non_empty(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(key).await?.filter(|v| !v.is_empty()))
    }

    async fn expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.non_empty(key).await? else {
            return Ok(None);
        };

        let parsed = parse_expiry(&raw);
        if parsed.is_none() {
            tracing::warn!("Ignoring unparseable {} value: {}", key, raw);
        }
        Ok(parsed)
    }
}
