// Storage module
// String-keyed persistence the session and draft cache are built on

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Keys used in the key-value store
pub mod keys {
    pub const LAST_USED_EMAIL: &str = "last_used_email";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const ACCESS_EXPIRY: &str = "access_token_expiry";
    pub const REFRESH_EXPIRY: &str = "refresh_token_expiry";
    pub const USER_DATA: &str = "user_data";
    pub const LAST_LOG_DATA: &str = "last_log_data";
}

/// Asynchronous, fallible string store
///
/// Removing an absent key is not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
