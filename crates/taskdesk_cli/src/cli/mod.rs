use clap::{Parser, Subcommand};
use taskdesk_core::error::{AppError, AppResult};
use taskdesk_core::model::Theme;
use time::macros::format_description;
use time::{Date, Time};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

/// Optional task fields shared by `add` and `edit`.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct TaskFields {
    /// Due date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub due: Option<Date>,
    /// Due time (HH:MM)
    #[arg(long, value_parser = parse_time)]
    pub time: Option<Time>,
    /// Reminder time (YYYY-MM-DDTHH:MM, local time)
    #[arg(long)]
    pub reminder: Option<String>,
    /// Category id
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub remarks: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: taskdesk add "Buy milk" --due 2025-12-20 --reminder 2025-12-20T09:00
    Add {
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Edit a task
    ///
    /// Example: taskdesk edit task-1 --title "Buy oat milk" --time 18:00
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
        /// Remove the reminder
        #[arg(long, conflicts_with = "reminder")]
        clear_reminder: bool,
    },
    /// Mark a task as finished
    ///
    /// Example: taskdesk done task-1
    Done { id: String },
    /// Mark a finished task as pending again
    ///
    /// Example: taskdesk reopen task-1
    Reopen { id: String },
    /// Delete a task
    ///
    /// Example: taskdesk delete task-1
    Delete { id: String },
    /// Show details of a task
    ///
    /// Example: taskdesk show task-1
    Show { id: String },
    /// List tasks, optionally only those due on one date
    ///
    /// Example: taskdesk list --date 2025-12-20
    List {
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// Pending tasks due today or earlier
    Today,
    /// The next pending tasks after today
    ///
    /// Example: taskdesk upcoming --limit 3
    Upcoming {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// List categories
    Categories,
    /// Show or update the profile
    ///
    /// Example: taskdesk profile --first-name Ada --theme dark
    Profile {
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// New profile picture, as an encoded source such as a data URL
        #[arg(long, value_name = "SOURCE")]
        image: Option<String>,
        #[arg(long, conflicts_with = "image")]
        clear_image: bool,
    },
    /// Keep running and show reminders as they fire
    Watch,
}

pub fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

pub fn parse_time(raw: &str) -> Result<Time, String> {
    Time::parse(raw.trim(), format_description!("[hour]:[minute]"))
        .map_err(|_| format!("invalid time '{raw}', expected HH:MM"))
}

pub fn parse_theme(raw: &str) -> Result<Theme, String> {
    Theme::from_name(raw).ok_or_else(|| format!("unknown theme '{raw}', expected light or dark"))
}

pub fn normalize_parse_error(err: &clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::validation(message)
}

/// Rejects a present-but-blank title the same way the coordinator would,
/// before anything is loaded.
pub fn required_title(title: Option<String>) -> AppResult<String> {
    match title {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::validation("title is required")),
    }
}
