use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Transport-level request: everything needed to issue one HTTP call
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header value, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status, reason phrase and raw body of a completed call
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub const NO_CONTENT: u16 = 204;
    pub const UNAUTHORIZED: u16 = 401;

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Self::UNAUTHORIZED
    }

    pub fn is_no_content(&self) -> bool {
        self.status == Self::NO_CONTENT
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ClientError::InvalidResponse(format!("failed to decode {} body: {}", self.status, e))
        })
    }

    /// Convert a non-2xx response into an API error, preferring the body text
    pub fn into_api_error(self) -> ClientError {
        let message = if self.body.trim().is_empty() {
            self.reason
        } else {
            self.body
        };
        ClientError::Api {
            status: self.status,
            message,
        }
    }
}

/// "Send request, get status + body" capability the pipeline depends on
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport with connection pooling and timeouts
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: u64, request_timeout: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            "Sending HTTP request"
        );

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            // Categorize the error for better debugging
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else if e.is_request() {
                "request_error"
            } else {
                "unknown"
            };

            tracing::warn!(
                error_kind = error_kind,
                error = %e,
                url = %request.url,
                "HTTP request error"
            );

            ClientError::Network(format!("{} (kind: {})", e, error_kind))
        })?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(format!("failed to read response body: {}", e)))?;

        tracing::debug!(status = %status, "Received HTTP response");

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

/// Scripted transport for tests: replies are queued per `METHOD path`
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct MockReply {
        pub status: u16,
        pub body: String,
        pub delay: Option<Duration>,
    }

    impl MockReply {
        pub fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: None,
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                body: String::new(),
                delay: None,
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[derive(Default)]
    pub struct MockTransport {
        base_url: String,
        replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
        calls: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new(base_url: &str) -> Self {
            Self {
                base_url: base_url.to_string(),
                ..Self::default()
            }
        }

        /// Queue a reply for the next call to `method path`
        pub fn reply(&self, method: Method, path: &str, reply: MockReply) {
            self.replies
                .lock()
                .unwrap()
                .entry(format!("{} {}", method, path))
                .or_default()
                .push_back(reply);
        }

        pub fn calls(&self) -> Vec<HttpRequest> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of calls made to `path` with any method
        pub fn count(&self, path: &str) -> usize {
            let url = format!("{}{}", self.base_url, path);
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.url == url)
                .count()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push(request.clone());

            let path = request
                .url
                .strip_prefix(&self.base_url)
                .unwrap_or(&request.url)
                .to_string();
            let key = format!("{} {}", request.method, path);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(&key)
                .and_then(|queue| queue.pop_front());

            let Some(reply) = reply else {
                return Err(ClientError::Network(format!("no mock reply for {}", key)));
            };

            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }

            let reason = reqwest::StatusCode::from_u16(reply.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or_default()
                .to_string();

            Ok(HttpResponse {
                status: reply.status,
                reason,
                body: reply.body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_headers() {
        let request = HttpRequest::new(Method::GET, "http://example.test/x")
            .bearer("abc")
            .header("content-type", "text/plain");

        assert_eq!(request.header_value("Authorization"), Some("Bearer abc"));
        assert_eq!(request.header_value("Content-Type"), Some("text/plain"));
        assert_eq!(request.headers.len(), 2);
    }

    #[test]
    fn test_bearer_replaces_previous_token() {
        let request = HttpRequest::new(Method::GET, "http://example.test/x")
            .bearer("old")
            .bearer("new");
        assert_eq!(request.header_value("authorization"), Some("Bearer new"));
    }

    #[test]
    fn test_response_classification() {
        let ok = HttpResponse {
            status: 204,
            reason: "No Content".to_string(),
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(ok.is_no_content());
        assert!(!ok.is_unauthorized());

        let unauthorized = HttpResponse {
            status: 401,
            reason: "Unauthorized".to_string(),
            body: String::new(),
        };
        assert!(!unauthorized.is_success());
        assert!(unauthorized.is_unauthorized());
    }

    #[test]
    fn test_api_error_prefers_body_text() {
        let response = HttpResponse {
            status: 400,
            reason: "Bad Request".to_string(),
            body: "{\"detail\":\"end before start\"}".to_string(),
        };
        assert_eq!(
            response.into_api_error(),
            ClientError::Api {
                status: 400,
                message: "{\"detail\":\"end before start\"}".to_string()
            }
        );

        let response = HttpResponse {
            status: 404,
            reason: "Not Found".to_string(),
            body: "  ".to_string(),
        };
        assert_eq!(
            response.into_api_error(),
            ClientError::Api {
                status: 404,
                message: "Not Found".to_string()
            }
        );
    }

    #[test]
    fn test_json_decode_error() {
        let response = HttpResponse {
            status: 200,
            reason: "OK".to_string(),
            body: "not json".to_string(),
        };
        let result: Result<Value> = response.json();
        assert!(matches!(result, Err(ClientError::InvalidResponse(_))));

        let response = HttpResponse {
            status: 200,
            reason: "OK".to_string(),
            body: json!({"a": 1}).to_string(),
        };
        let value: Value = response.json().unwrap();
        assert_eq!(value["a"], 1);
    }
}
