// Display helpers for requests and time logs

use chrono::{DateTime, Local, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

use crate::models::{request_status, request_type, EmployeeRequest};

pub fn status_label(status: &str) -> &str {
    match status {
        request_status::ACCEPTED => "Accepted",
        request_status::PENDING => "Pending",
        request_status::DECLINED => "Declined",
        request_status::CANCELLED => "Cancelled",
        other => other,
    }
}

pub fn request_type_label(kind: &str) -> &str {
    match kind {
        request_type::REMOTE_WORK => "Remote Work",
        request_type::REMOTE_ON_DEMAND => "Remote Work (OD)",
        request_type::VACATION => "Vacation",
        request_type::BUSINESS => "Business",
        request_type::VACATION_ON_DEMAND => "Vacation on Demand",
        request_type::CUSTOM_TIME => "Custom Time",
        request_type::UNIVERSITY => "University",
        "DY" => "Day Off",
        "SL" => "Sick Leave",
        other => other,
    }
}

/// "Jan 15, 2024" for a date or timestamp; anything unparseable is returned as-is
pub fn format_date(raw: &str) -> String {
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());

    match date {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => raw.to_string(),
    }
}

/// "45m", "2h" or "1h 30m"
pub fn format_duration(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Minutes between two RFC 3339 timestamps
pub fn duration_minutes(start: &str, finish: &str) -> Option<i64> {
    let start = DateTime::parse_from_rfc3339(start).ok()?;
    let finish = DateTime::parse_from_rfc3339(finish).ok()?;
    Some((finish - start).num_minutes())
}

/// Normalize loose time input ("8", "18", "830", "0830") to "HH:MM"
///
/// Returns an empty string when the input cannot be read as a valid time.
pub fn normalize_time_input(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    let (hour, minute) = match digits.len() {
        4 => (&digits[..2], &digits[2..]),
        3 => (&digits[..1], &digits[1..]),
        1 | 2 => (digits.as_str(), "00"),
        _ => return String::new(),
    };

    match (hour.parse::<u32>(), minute.parse::<u32>()) {
        (Ok(h), Ok(m)) if h <= 23 && m <= 59 => format!("{:02}:{:02}", h, m),
        _ => String::new(),
    }
}

/// Local wall-clock `date` + `HH:MM` as an RFC 3339 UTC timestamp
pub fn local_time_to_utc(date: NaiveDate, time: &str) -> Option<String> {
    let time = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    let local = Local.from_local_datetime(&date.and_time(time)).earliest()?;
    Some(
        local
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Local `HH:MM` of an RFC 3339 timestamp
pub fn utc_to_local_time(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(parsed.with_timezone(&Local).format("%H:%M").to_string())
}

pub fn request_title(request: &EmployeeRequest) -> String {
    format!(
        "{} - {} to {}",
        request_type_label(&request.request_type),
        format_date(&request.start_date),
        format_date(&request.end_date)
    )
}

pub fn request_subtitle(request: &EmployeeRequest) -> String {
    let projects = request
        .projects
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    if projects.is_empty() {
        format!("Status: {}", status_label(&request.status))
    } else {
        format!(
            "Status: {} | Projects: {}",
            status_label(&request.status),
            projects
        )
    }
}
