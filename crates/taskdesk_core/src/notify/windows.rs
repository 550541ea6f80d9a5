use super::{APP_NAME, Notifier, launch_show, parse_activation_argument};
use crate::error::{AppError, AppResult};
use crate::model::Reminder;
use tauri_winrt_notification::Toast;

pub struct WindowsNotifier;

fn open(task_id: &str) {
    if let Err(err) = launch_show(task_id) {
        tracing::warn!(task_id, error = %err, "failed to open task");
    }
}

impl Notifier for WindowsNotifier {
    fn notify(&self, reminder: &Reminder) -> AppResult<()> {
        self.notify_with_action(reminder, "")
    }

    fn notify_with_action(&self, reminder: &Reminder, action: &str) -> AppResult<()> {
        let task_id = reminder.task_id.to_string();
        let action_value = action.to_string();
        let mut toast = Toast::new(Toast::POWERSHELL_APP_ID)
            .title(APP_NAME)
            .text1(&reminder.message);

        if !action_value.trim().is_empty() {
            toast = toast.add_button("Open", &action_value);
        }

        toast
            .on_activated(move |args| {
                match args.as_deref().map(str::trim) {
                    Some(args) if !args.is_empty() && args != action_value => {
                        if let Some(id) = parse_activation_argument(args) {
                            open(&id);
                        }
                    }
                    _ => open(&task_id),
                }
                Ok(())
            })
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;
        Ok(())
    }
}
