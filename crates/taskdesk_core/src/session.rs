//! One client session: the entity cache, the mutation coordinator writing to
//! it and the reminder scheduler reading from it, started and torn down
//! together.

use crate::cache::{CacheOptions, Cached, Collection, EntityCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::coordinator::MutationCoordinator;
use crate::error::AppResult;
use crate::gateway::Gateway;
use crate::model::{Category, Profile, ProfileImage, Reminder, Task, TaskId, TaskInput};
use crate::observe::Subscription;
use crate::reminder::{ReminderConfig, ReminderScheduler};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub cache: CacheOptions,
    pub reminders: ReminderConfig,
}

impl SessionOptions {
    pub fn from_config(config: &Config, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            cache: config.cache_options(snapshot_path),
            reminders: config.reminder_config(),
        }
    }
}

pub struct Session {
    cache: Arc<EntityCache>,
    coordinator: MutationCoordinator,
    scheduler: ReminderScheduler,
}

impl Session {
    /// Builds the session without touching the gateway or spawning anything.
    /// The cache already holds the local snapshot, if one is configured.
    pub fn new(gateway: Arc<dyn Gateway>, options: SessionOptions, clock: Arc<dyn Clock>) -> Self {
        let cache = EntityCache::init(gateway, options.cache);
        let coordinator = MutationCoordinator::new(Arc::clone(&cache), Arc::clone(&clock));
        let scheduler = ReminderScheduler::new(Arc::clone(&cache), clock, options.reminders);
        Self {
            cache,
            coordinator,
            scheduler,
        }
    }

    /// Starts background work: the initial load of every collection and the
    /// reminder ticker. Needs a tokio runtime.
    pub fn start(&self) {
        for collection in Collection::ALL {
            self.cache.revalidate(collection);
        }
        self.scheduler.start();
    }

    /// Loads every collection and waits for the result.
    pub async fn load(&self) -> AppResult<()> {
        self.cache.refresh_all().await
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn use_tasks(&self) -> Cached<Task> {
        self.cache.use_tasks()
    }

    pub fn use_profile(&self) -> Cached<Profile> {
        self.cache.use_profile()
    }

    pub fn use_categories(&self) -> Cached<Category> {
        self.cache.use_categories()
    }

    pub fn use_profile_image(&self) -> Cached<ProfileImage> {
        self.cache.use_profile_image()
    }

    pub fn submit_task_create(
        &self,
        input: TaskInput,
    ) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        self.coordinator.create(input)
    }

    pub fn submit_task_update(
        &self,
        task: Task,
    ) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        self.coordinator.update(task)
    }

    pub fn submit_task_delete(
        &self,
        id: &TaskId,
    ) -> impl Future<Output = AppResult<()>> + Send + use<> {
        self.coordinator.remove(id)
    }

    pub fn subscribe_reminders<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Reminder>) + Send + Sync + 'static,
    {
        self.scheduler.subscribe_reminders(callback)
    }

    /// Stops the scheduler, then closes the cache. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.scheduler.stop();
        self.cache.teardown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cache", &self.cache)
            .field("coordinator", &self.coordinator)
            .field("scheduler_stopped", &self.scheduler.is_stopped())
            .finish()
    }
}
