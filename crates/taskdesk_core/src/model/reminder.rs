use crate::model::TaskId;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// A fired reminder. Lives only in scheduler memory and is never sent to the
/// gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub task_id: TaskId,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fired_at: OffsetDateTime,
}

impl Reminder {
    pub fn new(task_id: TaskId, title: &str, remaining: Duration, fired_at: OffsetDateTime) -> Self {
        Self {
            task_id,
            message: reminder_message(title, remaining),
            fired_at,
        }
    }
}

fn reminder_message(title: &str, remaining: Duration) -> String {
    let total = remaining.whole_seconds().max(0);
    format!("Task {} is due in {}m {}s!", title, total / 60, total % 60)
}
