// Authenticated request pipeline
// Token attachment, refresh on demand and one bounded retry per call

use futures::future::FutureExt;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{refresh_session, RefreshGate, SessionManager};
use crate::error::{ClientError, Result};
use crate::http_client::{HttpRequest, HttpResponse, Transport};

pub const REFRESH_ENDPOINT: &str = "/rest-auth/token/refresh/";

/// Which send a refresh or request belongs to.
/// `Retry` has no transition back into a refresh, which bounds every call
/// to a single refresh-then-retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// Per-call state machine
enum CallState {
    Authorize,
    Refresh(Attempt),
    Send { token: String, attempt: Attempt },
}

impl CallState {
    fn label(&self) -> &'static str {
        match self {
            CallState::Authorize => "authorize",
            CallState::Refresh(Attempt::First) => "refresh",
            CallState::Refresh(Attempt::Retry) => "refresh-after-401",
            CallState::Send {
                attempt: Attempt::First,
                ..
            } => "send",
            CallState::Send {
                attempt: Attempt::Retry,
                ..
            } => "retry-send",
        }
    }
}

/// Executes API calls against one Organizer backend and one session
pub struct RequestPipeline {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: SessionManager,
    gate: RefreshGate,
}

impl RequestPipeline {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>, session: SessionManager) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session,
            gate: RefreshGate::new(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Send an authenticated request, refreshing and retrying once on 401
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse> {
        let mut state = CallState::Authorize;

        loop {
            tracing::debug!(step = state.label(), endpoint, "Pipeline step");

            state = match state {
                CallState::Authorize => {
                    if let Some(token) = self.session.get_access_token().await? {
                        CallState::Send {
                            token,
                            attempt: Attempt::First,
                        }
                    } else if self.session.get_refresh_token().await?.is_some() {
                        CallState::Refresh(Attempt::First)
                    } else {
                        return Err(ClientError::AuthRequired);
                    }
                }

                CallState::Refresh(attempt) => match self.refresh_access_token().await {
                    Ok(token) => CallState::Send { token, attempt },
                    Err(ClientError::Storage(msg)) => return Err(ClientError::Storage(msg)),
                    Err(e) => {
                        tracing::warn!("Token refresh failed: {}", e);
                        if attempt == Attempt::Retry {
                            self.session.clear_tokens().await?;
                        }
                        return Err(ClientError::SessionExpired);
                    }
                },

                CallState::Send { token, attempt } => {
                    let request = self.build(method.clone(), endpoint, body.clone()).bearer(&token);
                    let response = self.transport.execute(request).await?;

                    if response.is_success() {
                        return Ok(response);
                    }

                    if response.is_unauthorized() && attempt == Attempt::First {
                        tracing::warn!("Received 401, refreshing token and retrying...");
                        CallState::Refresh(Attempt::Retry)
                    } else if response.is_unauthorized() {
                        tracing::error!(endpoint, "Still unauthorized after refresh, ending session");
                        self.session.clear_tokens().await?;
                        return Err(response.into_api_error());
                    } else {
                        tracing::error!(
                            status = response.status,
                            endpoint,
                            retried = attempt == Attempt::Retry,
                            "API request failed"
                        );
                        return Err(response.into_api_error());
                    }
                }
            };
        }
    }

    /// Send a request without credentials; never triggers a refresh
    pub async fn send_public(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse> {
        let response = self.transport.execute(self.build(method, endpoint, body)).await?;

        if response.is_success() {
            Ok(response)
        } else {
            tracing::error!(status = response.status, endpoint, "Public request failed");
            Err(response.into_api_error())
        }
    }

    /// Renew the access token through the single-flight gate
    pub async fn refresh_access_token(&self) -> Result<String> {
        let transport = Arc::clone(&self.transport);
        let session = self.session.clone();
        let url = self.url(REFRESH_ENDPOINT);

        self.gate
            .run(move || refresh_session(transport, session, url).boxed())
            .await
    }

    fn build(&self, method: Method, endpoint: &str, body: Option<Value>) -> HttpRequest {
        let request = HttpRequest::new(method, self.url(endpoint));
        match body {
            Some(body) => request.json(body),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenPair;
    use crate::http_client::mock::{MockReply, MockTransport};
    use crate::storage::{keys, KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: &str = "http://organizer.test";
    const MY_REQUESTS: &str = "/calendar/employee-requests/my/";

    /// MemoryStore wrapper counting writes
    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemoryStore,
        sets: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl KeyValueStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    struct Fixture {
        pipeline: Arc<RequestPipeline>,
        transport: Arc<MockTransport>,
        store: CountingStore,
    }

    async fn fixture(access_in: Option<Duration>, user: Option<Value>) -> Fixture {
        let store = CountingStore::default();
        let session = SessionManager::new(Arc::new(store.clone()));
        if let Some(access_in) = access_in {
            let now = Utc::now();
            session
                .set_tokens(
                    &TokenPair {
                        access_token: "old-access".to_string(),
                        refresh_token: "old-refresh".to_string(),
                        access_expiration: (now + access_in).to_rfc3339(),
                        refresh_expiration: (now + Duration::days(1)).to_rfc3339(),
                    },
                    user.as_ref(),
                )
                .await
                .unwrap();
        }
        store.sets.store(0, Ordering::SeqCst);

        let transport = Arc::new(MockTransport::new(BASE));
        let pipeline = Arc::new(RequestPipeline::new(BASE, transport.clone(), session));
        Fixture {
            pipeline,
            transport,
            store,
        }
    }

    fn refreshed() -> MockReply {
        MockReply::json(
            200,
            json!({
                "access": "new-access",
                "refresh": "new-refresh",
                "accessExpiration": (Utc::now() + Duration::hours(1)).to_rfc3339(),
                "refreshExpiration": (Utc::now() + Duration::days(7)).to_rfc3339(),
            }),
        )
    }

    fn page() -> MockReply {
        MockReply::json(200, json!({"count": 1, "next": null, "previous": null, "results": [{"id": 1}]}))
    }

    #[tokio::test]
    async fn test_valid_token_is_attached() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        let response = f.pipeline.send(Method::GET, MY_REQUESTS, None).await.unwrap();

        assert_eq!(response.status, 200);
        let calls = f.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].header_value("Authorization"), Some("Bearer old-access"));
        assert_eq!(calls[0].header_value("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_no_tokens_requires_auth() {
        let f = fixture(None, None).await;

        let result = f.pipeline.send(Method::GET, MY_REQUESTS, None).await;

        assert_eq!(result, Err(ClientError::AuthRequired));
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_access_refreshes_before_send() {
        let f = fixture(Some(Duration::minutes(-5)), Some(json!({"id": 9}))).await;
        f.transport.reply(Method::POST, REFRESH_ENDPOINT, refreshed());
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        f.pipeline.send(Method::GET, MY_REQUESTS, None).await.unwrap();

        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
        assert_eq!(f.transport.count(MY_REQUESTS), 1);
        let calls = f.transport.calls();
        assert_eq!(calls[1].header_value("Authorization"), Some("Bearer new-access"));

        let session = f.pipeline.session();
        assert_eq!(
            session.get_refresh_token().await.unwrap(),
            Some("new-refresh".to_string())
        );
        assert_eq!(session.get_user_data().await.unwrap(), Some(json!({"id": 9})));
        assert_eq!(f.store.sets.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_refresh_failure_before_send_is_session_expired() {
        let f = fixture(Some(Duration::minutes(-5)), Some(json!({"id": 9}))).await;
        f.transport
            .reply(Method::POST, REFRESH_ENDPOINT, MockReply::status(401));

        let result = f.pipeline.send(Method::GET, MY_REQUESTS, None).await;

        assert_eq!(result, Err(ClientError::SessionExpired));
        assert_eq!(f.transport.count(MY_REQUESTS), 0);
        assert!(f.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_401_refreshes_and_retries_once() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        f.transport.reply(Method::POST, REFRESH_ENDPOINT, refreshed());
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        let response = f.pipeline.send(Method::GET, MY_REQUESTS, None).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(f.transport.calls().len(), 3);
        let calls = f.transport.calls();
        assert_eq!(calls[2].header_value("Authorization"), Some("Bearer new-access"));
    }

    #[tokio::test]
    async fn test_second_401_is_terminal() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        f.transport.reply(Method::POST, REFRESH_ENDPOINT, refreshed());
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        // Would be consumed by a third attempt
        f.transport.reply(Method::POST, REFRESH_ENDPOINT, refreshed());
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        let result = f.pipeline.send(Method::GET, MY_REQUESTS, None).await;

        assert_eq!(
            result,
            Err(ClientError::Api {
                status: 401,
                message: "Unauthorized".to_string()
            })
        );
        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
        assert_eq!(f.transport.count(MY_REQUESTS), 2);
        assert_eq!(f.pipeline.session().get_refresh_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_after_401_clears_session() {
        let f = fixture(Some(Duration::hours(1)), Some(json!({"id": 9}))).await;
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        f.transport.reply(
            Method::POST,
            REFRESH_ENDPOINT,
            MockReply::json(400, json!({"detail": "Invalid refresh token"})),
        );

        let result = f.pipeline.send(Method::GET, MY_REQUESTS, None).await;

        assert_eq!(result, Err(ClientError::SessionExpired));
        let session = f.pipeline.session();
        assert_eq!(session.get_access_token().await.unwrap(), None);
        assert_eq!(session.get_refresh_token().await.unwrap(), None);
        assert_eq!(session.get_user_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_network_failure_during_retry_refresh_clears_session() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        // No refresh reply scripted: the mock reports a network error

        let result = f.pipeline.send(Method::GET, MY_REQUESTS, None).await;

        assert_eq!(result, Err(ClientError::SessionExpired));
        assert!(f.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_non_401_error_is_not_retried() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport.reply(
            Method::POST,
            "/calendar/employee-requests/",
            MockReply::status(400),
        );

        let result = f
            .pipeline
            .send(Method::POST, "/calendar/employee-requests/", Some(json!({})))
            .await;

        assert_eq!(
            result,
            Err(ClientError::Api {
                status: 400,
                message: "Bad Request".to_string()
            })
        );
        assert_eq!(f.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_refresh() {
        let f = fixture(Some(Duration::minutes(-5)), Some(json!({"id": 9}))).await;
        f.transport.reply(
            Method::POST,
            REFRESH_ENDPOINT,
            refreshed().delayed(std::time::Duration::from_millis(50)),
        );
        f.transport.reply(Method::GET, MY_REQUESTS, page());
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        let (a, b) = tokio::join!(
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
        assert_eq!(f.transport.count(MY_REQUESTS), 2);
        // One setTokens: four token fields plus the carried-forward user data
        assert_eq!(f.store.sets.load(Ordering::SeqCst), 5);
        for call in f.transport.calls().iter().filter(|c| c.url.ends_with(MY_REQUESTS)) {
            assert_eq!(call.header_value("Authorization"), Some("Bearer new-access"));
        }
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        f.transport
            .reply(Method::GET, MY_REQUESTS, MockReply::status(401));
        f.transport.reply(
            Method::POST,
            REFRESH_ENDPOINT,
            refreshed().delayed(std::time::Duration::from_millis(50)),
        );
        f.transport.reply(Method::GET, MY_REQUESTS, page());
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        let (a, b) = tokio::join!(
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        // 2 initial 401s, 1 refresh, 2 retries
        assert_eq!(f.transport.calls().len(), 5);
        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_refresh_failure() {
        let f = fixture(Some(Duration::minutes(-5)), None).await;
        f.transport.reply(
            Method::POST,
            REFRESH_ENDPOINT,
            MockReply::status(400).delayed(std::time::Duration::from_millis(50)),
        );

        let (a, b) = tokio::join!(
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
            f.pipeline.send(Method::GET, MY_REQUESTS, None),
        );

        assert_eq!(a, Err(ClientError::SessionExpired));
        assert_eq!(b, Err(ClientError::SessionExpired));
        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
        assert_eq!(f.transport.count(MY_REQUESTS), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_under_parallel_tasks() {
        let f = fixture(Some(Duration::minutes(-5)), None).await;
        f.transport.reply(
            Method::POST,
            REFRESH_ENDPOINT,
            refreshed().delayed(std::time::Duration::from_millis(300)),
        );
        for _ in 0..6 {
            f.transport.reply(Method::GET, MY_REQUESTS, page());
        }

        let barrier = Arc::new(tokio::sync::Barrier::new(6));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let pipeline = f.pipeline.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                pipeline.send(Method::GET, MY_REQUESTS, None).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(f.transport.count(REFRESH_ENDPOINT), 1);
        assert_eq!(f.transport.count(MY_REQUESTS), 6);
    }

    #[tokio::test]
    async fn test_public_request_never_refreshes() {
        let f = fixture(None, None).await;
        f.transport.reply(
            Method::POST,
            "/rest-auth/login/",
            MockReply::status(401),
        );

        let result = f
            .pipeline
            .send_public(Method::POST, "/rest-auth/login/", Some(json!({})))
            .await;

        assert_eq!(
            result,
            Err(ClientError::Api {
                status: 401,
                message: "Unauthorized".to_string()
            })
        );
        assert_eq!(f.transport.calls().len(), 1);
        assert_eq!(f.transport.calls()[0].header_value("Authorization"), None);
    }

    #[tokio::test]
    async fn test_storage_keys_untouched_by_successful_send() {
        let f = fixture(Some(Duration::hours(1)), None).await;
        f.transport.reply(Method::GET, MY_REQUESTS, page());

        f.pipeline.send(Method::GET, MY_REQUESTS, None).await.unwrap();

        assert_eq!(f.store.sets.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.store.inner.get(keys::ACCESS_TOKEN).await.unwrap(),
            Some("old-access".to_string())
        );
    }
}
