// Authentication module
// Credential persistence, session lifecycle and single-flight token refresh

mod credentials;
mod manager;
mod refresh;
mod types;

pub use credentials::{parse_expiry, CredentialStore};
pub use manager::{SessionManager, ACCESS_TOKEN_MARGIN_SECS};
pub use refresh::{refresh_session, RefreshGate};
pub use types::{RefreshRequest, SessionState, TokenPair};
