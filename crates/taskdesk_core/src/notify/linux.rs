use super::{APP_NAME, Notifier, launch_show, parse_activation_argument};
use crate::error::{AppError, AppResult};
use crate::model::Reminder;
use notify_rust::Notification;

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    fn notify(&self, reminder: &Reminder) -> AppResult<()> {
        self.notify_with_action(reminder, "")
    }

    fn notify_with_action(&self, reminder: &Reminder, action: &str) -> AppResult<()> {
        let mut notification = Notification::new();
        notification.summary(APP_NAME);
        notification.body(&reminder.message);
        if !action.trim().is_empty() {
            notification.action(action, "Open");
        }

        let handle = notification
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;

        if !action.trim().is_empty() {
            let action_key = action.to_string();
            let task_id = reminder.task_id.to_string();
            std::thread::spawn(move || {
                let _ = handle.wait_for_action(|selected| {
                    let target = if selected == action_key || selected == "default" {
                        Some(task_id.clone())
                    } else {
                        parse_activation_argument(selected)
                    };
                    if let Some(id) = target
                        && let Err(err) = launch_show(&id)
                    {
                        tracing::warn!(task_id = %id, error = %err, "failed to open task");
                    }
                });
            });
        }

        Ok(())
    }
}
