use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "https://api.organizer.profil-software.com";

/// Organizer - command line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Organizer API base URL
    #[arg(short = 'u', long, env = "ORGANIZER_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Path to the local session store (SQLite)
    #[arg(short = 's', long, env = "ORGANIZER_STORE_FILE")]
    pub store: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Remember the last time log values per project
    #[arg(long, env = "ORGANIZER_USE_DRAFTS", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_drafts: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and store the session
    Login {
        /// Account email (defaults to the last one used)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the current session state
    Status,

    /// List my employee requests
    Requests,

    /// Create an employee request
    Create {
        /// Request type code (RW, RD, VC, BS, OD, CT, UW)
        #[arg(long = "type")]
        request_type: String,

        /// First day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        /// Last day (YYYY-MM-DD), defaults to the first day
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Start time, e.g. 0830
        #[arg(long)]
        start_time: Option<String>,

        /// End time, e.g. 1630
        #[arg(long)]
        end_time: Option<String>,

        /// Break start time
        #[arg(long, requires = "break_end")]
        break_start: Option<String>,

        /// Break end time
        #[arg(long, requires = "break_start")]
        break_end: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Cancel an employee request
    Cancel { id: u64 },

    /// List projects
    Projects,

    /// List time log entries
    Logs {
        /// First day (YYYY-MM-DD), defaults to a week ago
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },

    /// Log time on a project
    LogTime(TimeLogArgs),

    /// Update an existing time log entry
    UpdateLog {
        id: u64,

        #[command(flatten)]
        entry: TimeLogArgs,
    },

    /// Delete a time log entry
    DeleteLog { id: u64 },
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct TimeLogArgs {
    /// Project id
    #[arg(long)]
    pub project: u64,

    /// Day of the entry (YYYY-MM-DD), defaults to today
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Local start time; falls back to the last entry for the project
    #[arg(long)]
    pub start: Option<String>,

    /// Local finish time; falls back to the last entry for the project
    #[arg(long)]
    pub finish: Option<String>,

    #[arg(long)]
    pub overtime: bool,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_url: String,

    // Local session store
    pub store_file: PathBuf,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Behaviour
    pub use_drafts: bool,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let store_file = match args.store {
            Some(path) => expand_tilde(&path),
            None => default_store_path().context("Could not determine a default store location")?,
        };

        Ok(Config {
            api_url: args.api_url.trim_end_matches('/').to_string(),
            store_file,
            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,
            use_drafts: args.use_drafts,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!(
                "ORGANIZER_API_URL must be an http(s) URL, got: {}",
                self.api_url
            );
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }
}

/// Default store location inside the platform data directory
fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("organizer").join("store.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("expected YYYY-MM-DD, got {}", s))
}
