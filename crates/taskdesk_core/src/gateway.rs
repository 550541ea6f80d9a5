//! The remote side of the data layer.
//!
//! The cache and the coordinator only ever talk to the backend through this
//! trait, so the transport (HTTP, a local file, a test double) stays swappable.

use crate::error::AppResult;
use crate::model::{Category, Profile, ProfileImage, Task, TaskId};
use async_trait::async_trait;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_tasks(&self) -> AppResult<Vec<Task>>;

    async fn fetch_profile(&self) -> AppResult<Profile>;

    async fn fetch_categories(&self) -> AppResult<Vec<Category>>;

    /// Persists a new task and returns it as stored, with the id the backend
    /// assigned.
    async fn create_task(&self, task: &Task) -> AppResult<Task>;

    async fn update_task(&self, task: &Task) -> AppResult<Task>;

    async fn delete_task(&self, id: &TaskId) -> AppResult<()>;

    async fn save_profile(&self, profile: &Profile) -> AppResult<Profile>;

    /// `None` when no picture has been uploaded.
    async fn fetch_profile_image(&self) -> AppResult<Option<ProfileImage>>;

    async fn save_profile_image(&self, image: &ProfileImage) -> AppResult<ProfileImage>;

    async fn delete_profile_image(&self) -> AppResult<()>;
}
