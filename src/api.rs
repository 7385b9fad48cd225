// Typed Organizer API operations built on the request pipeline

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{SessionManager, SessionState, TokenPair};
use crate::error::{ClientError, Result};
use crate::http_client::{HttpResponse, Transport};
use crate::models::{
    CreateRequestData, EmployeeRequest, LoginResponse, Page, Project, TimeLogEntry,
};
use crate::pipeline::RequestPipeline;
use crate::storage::{keys, KeyValueStore};

/// API endpoint paths
pub mod endpoints {
    pub const LOGIN: &str = "/rest-auth/login/";
    pub const REFRESH: &str = crate::pipeline::REFRESH_ENDPOINT;
    pub const MY_REQUESTS: &str = "/calendar/employee-requests/my/";
    pub const EMPLOYEE_REQUESTS: &str = "/calendar/employee-requests/";
    pub const PROJECTS: &str = "/projects/";
    pub const TIME_LOGS: &str = "/time-logs/";

    pub fn cancel_request(id: u64) -> String {
        format!("/calendar/employee-requests/{}/cancel-request/", id)
    }

    pub fn time_log(id: u64) -> String {
        format!("/time-logs/{}/", id)
    }

    pub fn time_logs_between(from: &str, to: &str) -> String {
        format!("/time-logs/?startDate={}&endDate={}", from, to)
    }
}

/// Organizer API client
pub struct OrganizerClient {
    pipeline: RequestPipeline,
    store: Arc<dyn KeyValueStore>,
}

impl OrganizerClient {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>, store: Arc<dyn KeyValueStore>) -> Self {
        let session = SessionManager::new(Arc::clone(&store));
        Self {
            pipeline: RequestPipeline::new(base_url, transport, session),
            store,
        }
    }

    pub fn session(&self) -> &SessionManager {
        self.pipeline.session()
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// Log in with email and password and persist the new session
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "Please enter both username and password".to_string(),
            ));
        }

        let response = self
            .pipeline
            .send_public(
                Method::POST,
                endpoints::LOGIN,
                Some(json!({ "email": email, "password": password })),
            )
            .await?;
        let login: LoginResponse = response.json()?;

        self.store.set(keys::LAST_USED_EMAIL, email).await?;
        self.session()
            .set_tokens(
                &TokenPair {
                    access_token: login.access.clone(),
                    refresh_token: login.refresh.clone(),
                    access_expiration: login.access_expiration.clone(),
                    refresh_expiration: login.refresh_expiration.clone(),
                },
                Some(&login.user),
            )
            .await?;

        tracing::info!("Logged in as {}", email);
        Ok(login)
    }

    pub async fn logout(&self) -> Result<()> {
        self.session().clear_tokens().await?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Email used for the last successful login
    pub async fn last_used_email(&self) -> Result<Option<String>> {
        self.store.get(keys::LAST_USED_EMAIL).await
    }

    pub async fn session_state(&self) -> Result<SessionState> {
        self.session().state().await
    }

    pub async fn my_requests(&self) -> Result<Vec<EmployeeRequest>> {
        let page: Page<EmployeeRequest> = self.get(endpoints::MY_REQUESTS).await?;
        Ok(page.results)
    }

    pub async fn create_request(&self, data: &CreateRequestData) -> Result<EmployeeRequest> {
        self.send_json(Method::POST, endpoints::EMPLOYEE_REQUESTS, data)
            .await
    }

    pub async fn cancel_request(&self, id: u64) -> Result<()> {
        self.pipeline
            .send(Method::POST, &endpoints::cancel_request(id), None)
            .await?;
        Ok(())
    }

    pub async fn projects(&self) -> Result<Page<Project>> {
        self.get(endpoints::PROJECTS).await
    }

    /// Time log entries between two `YYYY-MM-DD` dates, inclusive
    pub async fn time_logs(&self, from: &str, to: &str) -> Result<Vec<TimeLogEntry>> {
        self.get(&endpoints::time_logs_between(from, to)).await
    }

    pub async fn log_time(&self, entry: &TimeLogEntry) -> Result<TimeLogEntry> {
        self.send_json(Method::POST, endpoints::TIME_LOGS, entry).await
    }

    pub async fn update_time_log(&self, id: u64, entry: &TimeLogEntry) -> Result<TimeLogEntry> {
        self.send_json(Method::PUT, &endpoints::time_log(id), entry)
            .await
    }

    pub async fn delete_time_log(&self, id: u64) -> Result<()> {
        self.pipeline
            .send(Method::DELETE, &endpoints::time_log(id), None)
            .await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let response = self.pipeline.send(Method::GET, endpoint, None).await?;
        decode(response)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let body: Value = serde_json::to_value(body)
            .map_err(|e| ClientError::Validation(format!("unserializable request body: {}", e)))?;
        let response = self.pipeline.send(method, endpoint, Some(body)).await?;
        decode(response)
    }
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if response.is_no_content() {
        return Err(ClientError::InvalidResponse(
            "expected a JSON body, got 204 No Content".to_string(),
        ));
    }
    response.json()
}
