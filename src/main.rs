use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use dialoguer::{Input, Password};
use std::sync::Arc;

use organizer_client::api::OrganizerClient;
use organizer_client::config::{Command, Config, TimeLogArgs};
use organizer_client::drafts::LogDrafts;
use organizer_client::error::ClientError;
use organizer_client::format;
use organizer_client::http_client::ReqwestTransport;
use organizer_client::models::{CreateRequestData, RequestBreak, TimeLogEntry};
use organizer_client::storage::{KeyValueStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("API: {}", config.api_url);
    tracing::debug!("Store: {}", config.store_file.display());

    let store: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&config.store_file).with_context(|| {
            format!(
                "Failed to open session store at {}",
                config.store_file.display()
            )
        })?,
    );
    let transport = Arc::new(ReqwestTransport::new(
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    let client = OrganizerClient::new(&config.api_url, transport, store);

    if let Err(e) = run(&client, &config, command).await {
        if let Some(err) = e.downcast_ref::<ClientError>() {
            if err.requires_login() {
                eprintln!("❌ {}", err);
                eprintln!("   Run `organizer login` to sign in.");
                std::process::exit(1);
            }
        }
        return Err(e);
    }

    Ok(())
}

async fn run(client: &OrganizerClient, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(client, email).await?,

        Command::Logout => {
            client.logout().await?;
            println!("👋 Logged out");
        }

        Command::Status => {
            let state = client.session_state().await?;
            let email = client.last_used_email().await?;
            println!("Session: {}", state);
            if let Some(email) = email {
                println!("Account: {}", email);
            }
        }

        Command::Requests => {
            let requests = client.my_requests().await?;
            if requests.is_empty() {
                println!("No requests");
            }
            for request in &requests {
                println!("#{} {}", request.id, format::request_title(request));
                println!("    {}", format::request_subtitle(request));
            }
        }

        Command::Create {
            request_type,
            start,
            end,
            start_time,
            end_time,
            break_start,
            break_end,
            note,
        } => {
            let breaks = match (break_start, break_end) {
                (Some(from), Some(until)) => vec![RequestBreak {
                    id: None,
                    start: parse_time(&from)?,
                    end: parse_time(&until)?,
                }],
                _ => vec![],
            };

            let data = CreateRequestData {
                request_type: request_type.to_uppercase(),
                start_date: start.to_string(),
                end_date: end.unwrap_or(start).to_string(),
                start_time: start_time.as_deref().map(parse_time).transpose()?,
                end_time: end_time.as_deref().map(parse_time).transpose()?,
                breaks,
                note,
            };

            let created = client.create_request(&data).await?;
            println!("✅ Created #{} {}", created.id, format::request_title(&created));
        }

        Command::Cancel { id } => {
            client.cancel_request(id).await?;
            println!("✅ Request #{} cancelled", id);
        }

        Command::Projects => {
            let page = client.projects().await?;
            for project in &page.results {
                println!("#{} {}", project.id, project.name);
            }
        }

        Command::Logs { from, to } => {
            let to = to.unwrap_or_else(|| Local::now().date_naive());
            let from = from.unwrap_or(to - Duration::days(7));
            let entries = client
                .time_logs(&from.to_string(), &to.to_string())
                .await?;

            if entries.is_empty() {
                println!("No time logged between {} and {}", from, to);
            }
            for entry in &entries {
                print_entry(entry);
            }
        }

        Command::LogTime(args) => {
            let entry = build_entry(client, config, args).await?;
            let saved = client.log_time(&entry).await?;
            remember(client, config, &entry).await;
            print_entry(&saved);
        }

        Command::UpdateLog { id, entry } => {
            let entry = build_entry(client, config, entry).await?;
            let saved = client.update_time_log(id, &entry).await?;
            remember(client, config, &entry).await;
            print_entry(&saved);
        }

        Command::DeleteLog { id } => {
            client.delete_time_log(id).await?;
            println!("✅ Time log #{} deleted", id);
        }
    }

    Ok(())
}

async fn login(client: &OrganizerClient, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => {
            let mut prompt = Input::<String>::new().with_prompt("Email");
            if let Some(last) = client.last_used_email().await? {
                prompt = prompt.default(last);
            }
            prompt.interact_text().context("Failed to read email")?
        }
    };

    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    let response = client.login(email.trim(), &password).await?;
    match response.first_name() {
        Some(name) => println!("✅ Welcome, {}!", name),
        None => println!("✅ Logged in as {}", email.trim()),
    }

    Ok(())
}

/// Time log entry from CLI arguments, filling gaps from the project's last entry
async fn build_entry(
    client: &OrganizerClient,
    config: &Config,
    args: TimeLogArgs,
) -> Result<TimeLogEntry> {
    let draft = if config.use_drafts {
        LogDrafts::new(client.store()).last_for(args.project).await?
    } else {
        None
    };

    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let start = pick_time(args.start, draft.as_ref().map(|d| d.start_at.as_str()), "--start")?;
    let finish = pick_time(args.finish, draft.as_ref().map(|d| d.finish_at.as_str()), "--finish")?;

    let description = args
        .description
        .or_else(|| draft.map(|d| d.description))
        .unwrap_or_default();

    Ok(TimeLogEntry {
        id: None,
        description,
        custom_task_title: None,
        start_at: to_utc(date, &start)?,
        finish_at: to_utc(date, &finish)?,
        is_overtime: args.overtime,
        project: args.project,
    })
}

fn pick_time(given: Option<String>, draft: Option<&str>, flag: &str) -> Result<String> {
    match (given, draft.and_then(format::utc_to_local_time)) {
        (Some(raw), _) => parse_time(&raw),
        (None, Some(previous)) => Ok(previous),
        (None, None) => anyhow::bail!("{} is required (no previous entry for this project)", flag),
    }
}

fn parse_time(raw: &str) -> Result<String> {
    let time = format::normalize_time_input(raw);
    if time.is_empty() {
        anyhow::bail!("Invalid time: {}", raw);
    }
    Ok(time)
}

fn to_utc(date: NaiveDate, time: &str) -> Result<String> {
    format::local_time_to_utc(date, time)
        .with_context(|| format!("{} {} does not exist in the local timezone", date, time))
}

async fn remember(client: &OrganizerClient, config: &Config, entry: &TimeLogEntry) {
    if !config.use_drafts {
        return;
    }
    if let Err(e) = LogDrafts::new(client.store()).remember(entry).await {
        tracing::warn!("Failed to remember time log draft: {}", e);
    }
}

fn print_entry(entry: &TimeLogEntry) {
    let id = entry.id.map(|id| format!("#{} ", id)).unwrap_or_default();
    let start = format::utc_to_local_time(&entry.start_at).unwrap_or_else(|| entry.start_at.clone());
    let finish =
        format::utc_to_local_time(&entry.finish_at).unwrap_or_else(|| entry.finish_at.clone());
    let duration = format::duration_minutes(&entry.start_at, &entry.finish_at)
        .map(format::format_duration)
        .unwrap_or_default();
    let overtime = if entry.is_overtime { " [overtime]" } else { "" };

    println!(
        "{}{} {}-{} ({}) project {}{}: {}",
        id,
        format::format_date(&entry.start_at),
        start,
        finish,
        duration,
        entry.project,
        overtime,
        entry.description
    );
}
