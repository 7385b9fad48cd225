// Token refresh logic and single-flight coordination

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::manager::SessionManager;
use super::types::{RefreshRequest, TokenPair};
use crate::error::{ClientError, Result};
use crate::http_client::{HttpRequest, Transport};

type PendingRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Single-flight gate around the refresh procedure
///
/// While an attempt is outstanding every caller attaches to the same shared
/// future. The attempt empties the slot itself as it settles, so the next
/// caller after settlement always starts a new attempt.
#[derive(Default)]
pub struct RefreshGate {
    pending: Arc<Mutex<Option<PendingRefresh>>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the outstanding attempt, or start one with `start`
    pub async fn run<F>(&self, start: F) -> Result<String>
    where
        F: FnOnce() -> BoxFuture<'static, Result<String>>,
    {
        let pending = {
            let mut slot = self.pending.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    tracing::debug!("Starting token refresh");
                    let attempt = start();
                    let handle = Arc::clone(&self.pending);
                    let pending = async move {
                        let outcome = attempt.await;
                        handle.lock().await.take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Whether an attempt is currently outstanding
    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}

/// Exchange the stored refresh token for a new pair
///
/// A rejected refresh clears the session. On success the previously cached
/// user data is written back together with the new pair, since refresh
/// responses do not carry identity.
pub async fn refresh_session(
    transport: Arc<dyn Transport>,
    session: SessionManager,
    url: String,
) -> Result<String> {
    let refresh_token = session
        .get_refresh_token()
        .await?
        .ok_or(ClientError::AuthRequired)?;

    tracing::info!("Refreshing access token...");

    let body = serde_json::to_value(RefreshRequest {
        refresh: &refresh_token,
    })
    .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
    let response = transport
        .execute(HttpRequest::new(Method::POST, url).json(body))
        .await?;

    if !response.is_success() {
        tracing::error!(
            status = response.status,
            body = %response.body,
            "Token refresh rejected, clearing session"
        );
        session.clear_tokens().await?;
        return Err(ClientError::SessionExpired);
    }

    let tokens: TokenPair = response.json()?;
    let user_data = session.get_user_data().await?;
    session.set_tokens(&tokens, user_data.as_ref()).await?;

    tracing::info!(
        "Token refreshed, access token expires: {}",
        tokens.access_expiration
    );

    Ok(tokens.access_token)
}
