// Organizer API data models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request status codes used by the API
pub mod request_status {
    pub const ACCEPTED: &str = "AC";
    pub const PENDING: &str = "PD";
    pub const DECLINED: &str = "DC";
    pub const CANCELLED: &str = "CD";
}

/// Request type codes used by the API
pub mod request_type {
    pub const REMOTE_WORK: &str = "RW";
    pub const REMOTE_ON_DEMAND: &str = "RD";
    pub const VACATION: &str = "VC";
    pub const BUSINESS: &str = "BS";
    pub const VACATION_ON_DEMAND: &str = "OD";
    pub const CUSTOM_TIME: &str = "CT";
    pub const UNIVERSITY: &str = "UW";
}

/// Paginated list envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_commercial: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBreak {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWarning {
    pub id: u64,
    pub warning_type: String,
    pub project: String,
}

/// Employee request (vacation, remote work, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRequest {
    pub id: u64,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub request_type: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub check_by: Option<String>,
    #[serde(default)]
    pub admin_note: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub employee: Option<Employee>,
    #[serde(default)]
    pub breaks: Vec<RequestBreak>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub warnings: Vec<RequestWarning>,
}

/// Body for creating an employee request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestData {
    pub request_type: String,
    pub start_date: String,
    pub end_date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaks: Vec<RequestBreak>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Time log entry, both as submitted and as returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_task_title: Option<String>,
    pub start_at: String,
    pub finish_at: String,
    pub is_overtime: bool,
    pub project: u64,
}

/// Login endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub access_expiration: String,
    pub refresh_expiration: String,
    pub user: Value,
}

impl LoginResponse {
    /// First name of the logged-in user, when the identity carries one
    pub fn first_name(&self) -> Option<&str> {
        self.user.get("firstName").and_then(|v| v.as_str())
    }
}
