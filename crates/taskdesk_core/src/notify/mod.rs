use crate::error::{AppError, AppResult};
use crate::model::Reminder;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsNotifier;

const DISABLE_ENV_VAR: &str = "TASKDESK_DISABLE_NOTIFICATIONS";
const APP_NAME: &str = "taskdesk";

/// Surfaces a fired reminder to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, reminder: &Reminder) -> AppResult<()>;

    fn notify_with_action(&self, reminder: &Reminder, action: &str) -> AppResult<()> {
        let _ = action;
        self.notify(reminder)
    }
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, reminder: &Reminder) -> AppResult<()> {
        tracing::debug!(task_id = %reminder.task_id, "notifications disabled, reminder not shown");
        Ok(())
    }
}

pub fn notifier_from_env() -> AppResult<Box<dyn Notifier>> {
    if std::env::var(DISABLE_ENV_VAR).is_ok() {
        return Ok(Box::new(NoopNotifier));
    }

    match platform_notifier() {
        Ok(notifier) => Ok(notifier),
        Err(AppError::InvalidData(reason)) => {
            tracing::warn!(%reason, "falling back to silent notifications");
            Ok(Box::new(NoopNotifier))
        }
        Err(other) => Err(other),
    }
}

const ACTION_PREFIX: &str = "show:";

pub fn activation_argument(task_id: &str) -> String {
    format!("{ACTION_PREFIX}{task_id}")
}

pub fn parse_activation_argument(argument: &str) -> Option<String> {
    argument
        .strip_prefix(ACTION_PREFIX)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Opens the task behind a clicked notification by running `taskdesk show <id>`.
pub fn launch_show(task_id: &str) -> AppResult<()> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .arg("show")
        .arg(task_id)
        .spawn()?;
    Ok(())
}

#[cfg(target_os = "linux")]
pub fn platform_notifier() -> AppResult<Box<dyn Notifier>> {
    Ok(Box::new(LinuxNotifier))
}

#[cfg(windows)]
pub fn platform_notifier() -> AppResult<Box<dyn Notifier>> {
    Ok(Box::new(WindowsNotifier))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_notifier() -> AppResult<Box<dyn Notifier>> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::{NoopNotifier, Notifier, activation_argument, parse_activation_argument};
    use crate::model::{Reminder, TaskId};
    use time::macros::datetime;

    #[test]
    fn activation_argument_carries_task_id() {
        let argument = activation_argument("task-1");
        assert_eq!(argument, "show:task-1");
        assert_eq!(parse_activation_argument(&argument).as_deref(), Some("task-1"));
    }

    #[test]
    fn parse_activation_argument_rejects_other_values() {
        assert!(parse_activation_argument("other:task-1").is_none());
        assert!(parse_activation_argument("show:  ").is_none());
    }

    #[test]
    fn noop_notifier_accepts_everything() {
        let reminder = Reminder::new(
            TaskId::new("task-1"),
            "stretch",
            time::Duration::seconds(90),
            datetime!(2025-12-20 09:00 UTC),
        );
        assert!(NoopNotifier.notify_with_action(&reminder, "show:task-1").is_ok());
    }
}
