mod category;
mod id;
mod profile;
mod reminder;
mod task;

pub use category::{Category, UNKNOWN_CATEGORY_COLOR, UNKNOWN_CATEGORY_NAME};
pub use id::{CategoryId, TaskId};
pub use profile::{PROFILE_IMAGE_KEY, PROFILE_KEY, Profile, ProfileImage, Theme};
pub use reminder::Reminder;
pub use task::{Task, TaskInput, TaskStatus, parse_reminder_time};

/// Anything the entity cache can hold. `key` identifies the entity inside its
/// collection; at most one entity per key is ever stored.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    fn key(&self) -> &str;
}

impl Entity for Task {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Entity for Category {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Entity for Profile {
    fn key(&self) -> &str {
        PROFILE_KEY
    }
}

impl Entity for ProfileImage {
    fn key(&self) -> &str {
        PROFILE_IMAGE_KEY
    }
}
