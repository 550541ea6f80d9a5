use crate::error::{AppError, AppResult};
use crate::model::{CategoryId, TaskId};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(hour_minute, Time, "[hour]:[minute]");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub category_id: CategoryId,
    #[serde(with = "calendar_date")]
    pub due_date: Date,
    #[serde(default, with = "hour_minute::option")]
    pub due_time: Option<Time>,
    #[serde(default)]
    pub reminder_time: Option<String>,
    pub status: TaskStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    #[serde(alias = "completed")]
    Finished,
}

/// What a caller supplies to create a task. Everything the cache maintains
/// itself (id, status, timestamps) is filled in on submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInput {
    pub title: String,
    pub remarks: Option<String>,
    pub category_id: CategoryId,
    pub due_date: Option<Date>,
    pub due_time: Option<Time>,
    pub reminder_time: Option<String>,
}

fn validated_title(title: &str) -> AppResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("title is required"));
    }
    Ok(trimmed.to_string())
}

fn normalized_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

impl TaskInput {
    pub fn new<T: Into<String>>(title: T, due_date: Date) -> Self {
        Self {
            title: title.into(),
            due_date: Some(due_date),
            ..Self::default()
        }
    }

    /// Checks the input and builds the pending task it describes.
    pub fn into_task(self, id: TaskId, now: OffsetDateTime) -> AppResult<Task> {
        let title = validated_title(&self.title)?;
        let due_date = self
            .due_date
            .ok_or_else(|| AppError::validation("due date is required"))?;

        Ok(Task {
            id,
            title,
            remarks: normalized_text(self.remarks.as_deref()),
            category_id: self.category_id,
            due_date,
            due_time: self.due_time,
            reminder_time: normalized_text(self.reminder_time.as_deref()),
            status: TaskStatus::Pending,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Task {
    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Finished
    }

    /// Rejects edits that would leave the task without a usable title.
    pub fn validate(&self) -> AppResult<()> {
        validated_title(&self.title).map(|_| ())
    }

    /// Applies the bookkeeping an edit implies relative to `previous`:
    /// `created_at` is kept, `updated_at` moves to `now`, and moving into
    /// `Finished` stamps `completed_at`. An existing stamp is never cleared.
    pub fn stamped_after(mut self, previous: &Task, now: OffsetDateTime) -> Task {
        self.title = self.title.trim().to_string();
        self.created_at = previous.created_at;
        self.updated_at = now;
        self.completed_at = match (previous.status, self.status) {
            (TaskStatus::Pending, TaskStatus::Finished) => Some(now),
            _ => self.completed_at.or(previous.completed_at),
        };
        self
    }

    /// The moment the reminder should fire, or `None` when there is no
    /// reminder or the stored value cannot be read.
    pub fn reminder_at(&self, offset: UtcOffset) -> Option<OffsetDateTime> {
        self.reminder_time
            .as_deref()
            .and_then(|raw| parse_reminder_time(raw, offset))
    }
}

/// Reads a reminder time. Values without an explicit offset are local times
/// in `offset`.
pub fn parse_reminder_time(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(at) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(at);
    }

    PrimitiveDateTime::parse(
        trimmed,
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            trimmed,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .ok()
    .map(|local| local.assume_offset(offset))
}
