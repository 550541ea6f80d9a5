use crate::error::{AppError, AppResult};
use crate::gateway::Gateway;
use crate::model::{Category, Profile, ProfileImage, Task, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredData {
    schema_version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    profile: Profile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile_image: Option<ProfileImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    pub profile: Profile,
    pub profile_image: Option<ProfileImage>,
}

pub fn load_state(path: &Path) -> AppResult<StoreState> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredData = serde_json::from_str(&content)?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    Ok(StoreState {
        tasks: stored.tasks,
        categories: stored.categories,
        profile: stored.profile,
        profile_image: stored.profile_image,
    })
}

pub fn save_state(path: &Path, state: &StoreState) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredData {
        schema_version: SCHEMA_VERSION,
        tasks: state.tasks.clone(),
        categories: state.categories.clone(),
        profile: state.profile.clone(),
        profile_image: state.profile_image.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)?;
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)?;
    }

    Ok(())
}

/// A gateway backed by a single JSON file. It stands in for a remote backend
/// on a single machine; every call reads or rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileGateway {
    path: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl JsonFileGateway {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modify<R, F>(&self, edit: F) -> AppResult<R>
    where
        F: FnOnce(&mut StoreState) -> AppResult<R>,
    {
        let _guard = self.guard.lock().await;
        let mut state = load_state(&self.path)?;
        let result = edit(&mut state)?;
        save_state(&self.path, &state)?;
        Ok(result)
    }
}

fn assigned_id(task: &Task) -> TaskId {
    if task.id.is_empty() || task.id.is_temporary() {
        TaskId::new(format!(
            "task-{}",
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        ))
    } else {
        task.id.clone()
    }
}

#[async_trait]
impl Gateway for JsonFileGateway {
    async fn fetch_tasks(&self) -> AppResult<Vec<Task>> {
        let _guard = self.guard.lock().await;
        Ok(load_state(&self.path)?.tasks)
    }

    async fn fetch_profile(&self) -> AppResult<Profile> {
        let _guard = self.guard.lock().await;
        Ok(load_state(&self.path)?.profile)
    }

    async fn fetch_categories(&self) -> AppResult<Vec<Category>> {
        let _guard = self.guard.lock().await;
        Ok(load_state(&self.path)?.categories)
    }

    async fn create_task(&self, task: &Task) -> AppResult<Task> {
        let mut created = task.clone();
        created.id = assigned_id(task);
        self.modify(move |state| {
            if state.tasks.iter().any(|existing| existing.id == created.id) {
                return Err(AppError::conflict("task id already exists"));
            }
            state.tasks.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_task(&self, task: &Task) -> AppResult<Task> {
        let updated = task.clone();
        self.modify(move |state| {
            let slot = state
                .tasks
                .iter_mut()
                .find(|existing| existing.id == updated.id)
                .ok_or_else(|| AppError::not_found("task not found"))?;
            *slot = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn delete_task(&self, id: &TaskId) -> AppResult<()> {
        let id = id.clone();
        self.modify(move |state| {
            let index = state
                .tasks
                .iter()
                .position(|task| task.id == id)
                .ok_or_else(|| AppError::not_found("task not found"))?;
            state.tasks.remove(index);
            Ok(())
        })
        .await
    }

    async fn save_profile(&self, profile: &Profile) -> AppResult<Profile> {
        let saved = profile.clone();
        self.modify(move |state| {
            state.profile = saved.clone();
            Ok(saved)
        })
        .await
    }

    async fn fetch_profile_image(&self) -> AppResult<Option<ProfileImage>> {
        let _guard = self.guard.lock().await;
        Ok(load_state(&self.path)?.profile_image)
    }

    async fn save_profile_image(&self, image: &ProfileImage) -> AppResult<ProfileImage> {
        let saved = image.clone();
        self.modify(move |state| {
            state.profile_image = Some(saved.clone());
            Ok(saved)
        })
        .await
    }

    async fn delete_profile_image(&self) -> AppResult<()> {
        self.modify(|state| {
            state.profile_image = None;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonFileGateway, SCHEMA_VERSION, StoreState, load_state, save_state};
    use crate::gateway::Gateway;
    use crate::model::{Category, CategoryId, Profile, ProfileImage, Task, TaskId, TaskInput, TaskStatus};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::macros::{date, datetime};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("taskdesk-{nanos}-{file_name}"))
    }

    fn draft(id: &str, title: &str) -> Task {
        TaskInput::new(title, date!(2025 - 12 - 20))
            .into_task(TaskId::new(id), datetime!(2025-12-20 08:00 UTC))
            .unwrap()
    }

    #[test]
    fn missing_file_loads_as_empty_state() {
        let state = load_state(&temp_path("missing-store.json")).unwrap();
        assert_eq!(state, StoreState::default());
    }

    #[test]
    fn accepts_store_without_categories_or_profile() {
        let path = temp_path("minimal-store.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"title\": \"demo\",\n      \"due_date\": \"2025-12-20\",\n      \"status\": \"pending\",\n      \"created_at\": \"2025-12-20T00:00:00Z\",\n      \"updated_at\": \"2025-12-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(state.tasks.len(), 1);
        assert!(state.categories.is_empty());
        assert_eq!(state.tasks[0].category_id, CategoryId::default());
    }

    #[test]
    fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"tasks\": []\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_unknown_status() {
        let path = temp_path("bad-status.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"title\": \"demo\",\n      \"due_date\": \"2025-12-20\",\n      \"status\": \"someday\",\n      \"created_at\": \"2025-12-20T00:00:00Z\",\n      \"updated_at\": \"2025-12-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[tokio::test]
    async fn create_assigns_permanent_id_to_temporary_task() {
        let path = temp_path("gateway-create.json");
        let gateway = JsonFileGateway::new(path.clone());

        let created = gateway.create_task(&draft("tmp-1", "demo")).await.unwrap();
        let stored = gateway.fetch_tasks().await.unwrap();
        fs::remove_file(&path).ok();

        assert!(created.id.as_str().starts_with("task-"));
        assert_eq!(stored, vec![created]);
    }

    #[tokio::test]
    async fn update_and_delete_unknown_task_are_not_found() {
        let path = temp_path("gateway-missing.json");
        let gateway = JsonFileGateway::new(path.clone());

        let err = gateway.update_task(&draft("task-9", "ghost")).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = gateway.delete_task(&TaskId::new("task-9")).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn update_replaces_stored_task() {
        let path = temp_path("gateway-update.json");
        save_state(
            &path,
            &StoreState {
                tasks: vec![draft("task-1", "old")],
                categories: vec![Category::new(CategoryId::new("1"), "Work", "#ff0000")],
                ..StoreState::default()
            },
        )
        .unwrap();
        let gateway = JsonFileGateway::new(path.clone());

        let mut edit = draft("task-1", "new");
        edit.status = TaskStatus::Finished;
        gateway.update_task(&edit).await.unwrap();
        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(state.tasks[0].title, "new");
        assert_eq!(state.tasks[0].status, TaskStatus::Finished);
        assert_eq!(state.categories.len(), 1);
    }

    #[tokio::test]
    async fn profile_image_is_saved_and_deleted_without_touching_the_profile() {
        let path = temp_path("gateway-image.json");
        let gateway = JsonFileGateway::new(path.clone());
        assert_eq!(gateway.fetch_profile_image().await.unwrap(), None);

        let image = ProfileImage::new("data:image/png;base64,AAAA");
        gateway.save_profile_image(&image).await.unwrap();
        let saved = gateway.fetch_profile_image().await.unwrap();
        let raw = fs::read_to_string(&path).unwrap();

        gateway.delete_profile_image().await.unwrap();
        let deleted = gateway.fetch_profile_image().await.unwrap();
        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(saved, Some(image));
        assert!(raw.contains("\"profile_image\": \"data:image/png;base64,AAAA\""));
        assert_eq!(deleted, None);
        assert_eq!(state.profile, Profile::default());
    }
}
