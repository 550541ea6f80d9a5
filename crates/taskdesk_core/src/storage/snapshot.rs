use crate::cache::Snapshot;
use crate::error::{AppError, AppResult};
use crate::model::{Category, Profile, ProfileImage, Task};
use crate::observe::lock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredSnapshot {
    schema_version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile_image: Option<ProfileImage>,
}

/// The collections as they were last seen, kept so the next session can
/// render before its first fetch resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub tasks: Vec<Task>,
    pub profile: Option<Profile>,
    pub categories: Vec<Category>,
    pub profile_image: Option<ProfileImage>,
}

pub fn load_snapshot(path: &Path) -> AppResult<CacheSnapshot> {
    if !path.exists() {
        return Ok(CacheSnapshot::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredSnapshot = serde_json::from_str(&content)?;
    if stored.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(AppError::invalid_data("snapshot schema_version mismatch"));
    }

    Ok(CacheSnapshot {
        tasks: stored.tasks,
        profile: stored.profile,
        categories: stored.categories,
        profile_image: stored.profile_image,
    })
}

pub fn save_snapshot(path: &Path, snapshot: &CacheSnapshot) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        tasks: snapshot.tasks.clone(),
        profile: snapshot.profile.clone(),
        categories: snapshot.categories.clone(),
        profile_image: snapshot.profile_image.clone(),
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

struct SnapshotFile {
    path: PathBuf,
    current: Mutex<CacheSnapshot>,
    io: Mutex<()>,
}

impl SnapshotFile {
    /// Writes whatever is current when the file lock is taken, so the last
    /// write to finish always carries the newest state.
    fn flush(&self) {
        let _io = lock(&self.io);
        let snapshot = lock(&self.current).clone();
        if let Err(err) = save_snapshot(&self.path, &snapshot) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to write cache snapshot");
        }
    }
}

/// Keeps the on-disk snapshot in step with the cache. Each `record_*` call
/// replaces one collection in memory; the file is rewritten by a background
/// task, one write at a time, coalescing bursts of changes. Without a runtime
/// the file is written in place. Write failures are logged and never reach
/// the cache.
pub(crate) struct SnapshotWriter {
    file: Arc<SnapshotFile>,
    wake: Option<mpsc::UnboundedSender<()>>,
}

impl SnapshotWriter {
    pub(crate) fn new(path: PathBuf, current: CacheSnapshot) -> Self {
        let file = Arc::new(SnapshotFile {
            path,
            current: Mutex::new(current),
            io: Mutex::new(()),
        });
        let wake = tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| spawn_flusher(&handle, Arc::clone(&file)));
        Self { file, wake }
    }

    pub(crate) fn record_tasks(&self, items: &Snapshot<Task>) {
        self.record(|snapshot| snapshot.tasks = items.iter().map(|t| (**t).clone()).collect());
    }

    pub(crate) fn record_profile(&self, items: &Snapshot<Profile>) {
        self.record(|snapshot| snapshot.profile = items.first().map(|p| (**p).clone()));
    }

    pub(crate) fn record_categories(&self, items: &Snapshot<Category>) {
        self.record(|snapshot| {
            snapshot.categories = items.iter().map(|c| (**c).clone()).collect();
        });
    }

    pub(crate) fn record_profile_image(&self, items: &Snapshot<ProfileImage>) {
        self.record(|snapshot| snapshot.profile_image = items.first().map(|i| (**i).clone()));
    }

    /// Writes the current state now, on the calling thread.
    pub(crate) fn flush(&self) {
        self.file.flush();
    }

    fn record<F: FnOnce(&mut CacheSnapshot)>(&self, update: F) {
        update(&mut lock(&self.file.current));
        let queued = self
            .wake
            .as_ref()
            .is_some_and(|wake| wake.send(()).is_ok());
        if !queued {
            self.file.flush();
        }
    }
}

fn spawn_flusher(
    handle: &tokio::runtime::Handle,
    file: Arc<SnapshotFile>,
) -> mpsc::UnboundedSender<()> {
    let (wake, mut woken) = mpsc::unbounded_channel::<()>();
    handle.spawn(async move {
        while woken.recv().await.is_some() {
            while woken.try_recv().is_ok() {}
            let file = Arc::clone(&file);
            if let Err(err) = tokio::task::spawn_blocking(move || file.flush()).await {
                tracing::warn!(error = %err, "cache snapshot writer stopped");
            }
        }
    });
    wake
}
