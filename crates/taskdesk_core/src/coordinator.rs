//! The only write path into the entity cache.
//!
//! Every mutation is applied to the cache before the gateway is called and is
//! either reconciled with the gateway's answer or rolled back. Mutations that
//! target the same id run one at a time, in the order they were submitted.
//!
//! A mutation runs on its own task once submitted. The returned future only
//! reports the outcome; dropping it does not cancel the mutation.

use crate::cache::{EntityCache, Store};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::model::{
    Entity, PROFILE_IMAGE_KEY, PROFILE_KEY, Profile, ProfileImage, Task, TaskId, TaskInput,
    TaskStatus,
};
use crate::observe::lock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

struct Lane {
    ticket: u64,
    tail: Option<oneshot::Receiver<()>>,
}

type Lanes = Arc<Mutex<HashMap<String, Lane>>>;

/// A place in the queue of one entity id. Holding the slot marks the id as
/// pending; dropping it lets the next mutation for the same id proceed.
struct LaneSlot {
    lanes: Lanes,
    key: String,
    ticket: u64,
    predecessor: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl LaneSlot {
    fn enqueue(lanes: &Lanes, key: &str) -> Self {
        let (done, tail) = oneshot::channel();
        let mut map = lock(lanes);
        let lane = map.entry(key.to_string()).or_insert(Lane {
            ticket: 0,
            tail: None,
        });
        lane.ticket += 1;
        let predecessor = lane.tail.replace(tail);

        Self {
            lanes: Arc::clone(lanes),
            key: key.to_string(),
            ticket: lane.ticket,
            predecessor,
            _done: done,
        }
    }

    /// Whether the previous mutation for this id has already settled.
    fn is_clear(&mut self) -> bool {
        let settled = match self.predecessor.as_mut() {
            None => return true,
            Some(predecessor) => !matches!(predecessor.try_recv(), Err(TryRecvError::Empty)),
        };
        if settled {
            self.predecessor = None;
        }
        settled
    }

    /// Waits until the previous mutation for this id has settled.
    async fn ready(&mut self) {
        if let Some(predecessor) = self.predecessor.take() {
            // An error only means the predecessor was dropped, which settles it too.
            let _ = predecessor.await;
        }
    }
}

impl Drop for LaneSlot {
    fn drop(&mut self) {
        let mut map = lock(&self.lanes);
        if map
            .get(&self.key)
            .is_some_and(|lane| lane.ticket == self.ticket)
        {
            map.remove(&self.key);
        }
    }
}

type Spawned<T> = AppResult<JoinHandle<AppResult<T>>>;

/// Awaits a submitted mutation. Submission errors come back as they are.
fn outcome<T: Send + 'static>(
    spawned: Spawned<T>,
) -> impl Future<Output = AppResult<T>> + Send + use<T> {
    async move {
        match spawned?.await {
            Ok(result) => result,
            Err(err) => Err(AppError::io(format!("mutation task failed: {err}"))),
        }
    }
}

pub struct MutationCoordinator {
    cache: Arc<EntityCache>,
    clock: Arc<dyn Clock>,
    lanes: Lanes,
    temporary_ids: AtomicU64,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<EntityCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            clock,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            temporary_ids: AtomicU64::new(0),
        }
    }

    /// Whether a mutation for `key` is queued or in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.lanes).contains_key(key)
    }

    /// Queues a mutation of `key`. `stage` applies the optimistic change to
    /// the cache: right away when nothing else is queued for `key`, otherwise
    /// once the predecessor settles. `confirm` then talks to the gateway on a
    /// spawned task and reconciles or rolls back.
    fn submit<S, T, Stage, Confirm, Fut>(
        &self,
        key: &str,
        stage: Stage,
        confirm: Confirm,
    ) -> Spawned<T>
    where
        S: Send + 'static,
        T: Send + 'static,
        Stage: FnOnce(&EntityCache) -> AppResult<S> + Send + 'static,
        Confirm: FnOnce(Arc<EntityCache>, S) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::io("no async runtime available for mutation"))?;
        let mut slot = LaneSlot::enqueue(&self.lanes, key);
        let cache = Arc::clone(&self.cache);

        if slot.is_clear() {
            let staged = stage(cache.as_ref())?;
            return Ok(runtime.spawn(async move {
                let result = confirm(cache, staged).await;
                drop(slot);
                result
            }));
        }

        Ok(runtime.spawn(async move {
            slot.ready().await;
            let result = match stage(cache.as_ref()) {
                Ok(staged) => confirm(cache, staged).await,
                Err(err) => Err(err),
            };
            drop(slot);
            result
        }))
    }

    /// Creates a task. The input is validated immediately; on success the task
    /// shows up in the cache under a `tmp-` id until the gateway confirms it.
    pub fn create(
        &self,
        input: TaskInput,
    ) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        let sequence = self.temporary_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let spawned = input
            .into_task(TaskId::temporary(sequence), self.clock.now())
            .and_then(|draft| {
                let key = draft.key().to_string();
                self.submit(
                    &key,
                    move |cache| {
                        cache.tasks().upsert(draft.clone());
                        Ok(draft)
                    },
                    confirm_create,
                )
            });
        outcome(spawned)
    }

    /// Replaces a task with `task`. The cache keeps `created_at`, moves
    /// `updated_at`, and stamps `completed_at` when the task becomes finished.
    pub fn update(&self, task: Task) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        let spawned = task.validate().and_then(|()| {
            let id = task.id.clone();
            self.edit(&id, move |_| task)
        });
        outcome(spawned)
    }

    pub fn finish(&self, id: &TaskId) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        self.set_status(id, TaskStatus::Finished)
    }

    pub fn reopen(&self, id: &TaskId) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        self.set_status(id, TaskStatus::Pending)
    }

    fn set_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
    ) -> impl Future<Output = AppResult<Task>> + Send + use<> {
        outcome(self.edit(id, move |current| Task {
            status,
            ..current.clone()
        }))
    }

    fn edit<F>(&self, id: &TaskId, edit: F) -> Spawned<Task>
    where
        F: FnOnce(&Task) -> Task + Send + 'static,
    {
        let clock = Arc::clone(&self.clock);
        let staged_id = id.clone();
        self.submit(
            id.as_str(),
            move |cache| {
                let previous = cache
                    .tasks()
                    .find(staged_id.as_str())
                    .ok_or_else(|| AppError::not_found(format!("task {staged_id} not found")))?;
                let draft = edit(previous.as_ref()).stamped_after(&previous, clock.now());
                cache.tasks().upsert(draft.clone());
                Ok((previous, draft))
            },
            confirm_update,
        )
    }

    /// Deletes a task. It disappears from the cache at once and is put back
    /// at its old position if the gateway refuses.
    pub fn remove(&self, id: &TaskId) -> impl Future<Output = AppResult<()>> + Send + use<> {
        let staged_id = id.clone();
        let spawned = self.submit(
            id.as_str(),
            move |cache| {
                let (index, previous) = cache
                    .tasks()
                    .remove(staged_id.as_str())
                    .ok_or_else(|| AppError::not_found(format!("task {staged_id} not found")))?;
                Ok((staged_id, index, previous))
            },
            |cache, (id, index, previous)| async move {
                match cache.gateway().delete_task(&id).await {
                    Ok(()) => {
                        tracing::info!(task_id = %id, "task deleted");
                        Ok(())
                    }
                    Err(err) => {
                        cache.tasks().restore_at(index, previous);
                        tracing::warn!(task_id = %id, error = %err, "task delete rolled back");
                        Err(err)
                    }
                }
            },
        );
        outcome(spawned)
    }

    pub fn save_profile(
        &self,
        profile: Profile,
    ) -> impl Future<Output = AppResult<Profile>> + Send + use<> {
        let spawned = self.submit(
            PROFILE_KEY,
            move |cache| {
                let previous = cache.profile().find(PROFILE_KEY);
                cache.profile().upsert(profile.clone());
                Ok((previous, profile))
            },
            |cache, (previous, profile)| async move {
                match cache.gateway().save_profile(&profile).await {
                    Ok(saved) => {
                        cache.profile().reconcile(PROFILE_KEY, saved.clone());
                        Ok(saved)
                    }
                    Err(err) => {
                        put_back(cache.profile(), PROFILE_KEY, previous);
                        tracing::warn!(error = %err, "profile save rolled back");
                        Err(err)
                    }
                }
            },
        );
        outcome(spawned)
    }

    /// Uploads a new profile picture, replacing the current one.
    pub fn save_profile_image(
        &self,
        image: ProfileImage,
    ) -> impl Future<Output = AppResult<ProfileImage>> + Send + use<> {
        let spawned = image.validate().and_then(|()| {
            self.submit(
                PROFILE_IMAGE_KEY,
                move |cache| {
                    let previous = cache.profile_image().find(PROFILE_IMAGE_KEY);
                    cache.profile_image().upsert(image.clone());
                    Ok((previous, image))
                },
                |cache, (previous, image)| async move {
                    match cache.gateway().save_profile_image(&image).await {
                        Ok(saved) => {
                            cache.profile_image().reconcile(PROFILE_IMAGE_KEY, saved.clone());
                            tracing::info!("profile image saved");
                            Ok(saved)
                        }
                        Err(err) => {
                            put_back(cache.profile_image(), PROFILE_IMAGE_KEY, previous);
                            tracing::warn!(error = %err, "profile image save rolled back");
                            Err(err)
                        }
                    }
                },
            )
        });
        outcome(spawned)
    }

    /// Removes the profile picture. Deleting when none is set still asks the
    /// gateway, which treats it as done.
    pub fn delete_profile_image(&self) -> impl Future<Output = AppResult<()>> + Send + use<> {
        let spawned = self.submit(
            PROFILE_IMAGE_KEY,
            |cache| Ok(cache.profile_image().remove(PROFILE_IMAGE_KEY)),
            |cache, removed| async move {
                match cache.gateway().delete_profile_image().await {
                    Ok(()) => {
                        tracing::info!("profile image deleted");
                        Ok(())
                    }
                    Err(err) => {
                        if let Some((index, previous)) = removed {
                            cache.profile_image().restore_at(index, previous);
                        }
                        tracing::warn!(error = %err, "profile image delete rolled back");
                        Err(err)
                    }
                }
            },
        );
        outcome(spawned)
    }
}

/// Restores the singleton stored under `key` to `previous`, or removes it
/// when there was nothing before.
fn put_back<T: Entity>(store: &Store<T>, key: &str, previous: Option<Arc<T>>) {
    match previous {
        Some(previous) => {
            store.restore(previous);
        }
        None => {
            store.remove(key);
        }
    }
}

async fn confirm_create(cache: Arc<EntityCache>, draft: Task) -> AppResult<Task> {
    match cache.gateway().create_task(&draft).await {
        Ok(created) => {
            cache.tasks().reconcile(draft.key(), created.clone());
            tracing::info!(temporary_id = %draft.id, task_id = %created.id, "task created");
            Ok(created)
        }
        Err(err) => {
            cache.tasks().remove(draft.key());
            tracing::warn!(temporary_id = %draft.id, error = %err, "task create rolled back");
            Err(err)
        }
    }
}

async fn confirm_update(
    cache: Arc<EntityCache>,
    (previous, draft): (Arc<Task>, Task),
) -> AppResult<Task> {
    let id = draft.id.clone();
    match cache.gateway().update_task(&draft).await {
        Ok(saved) => {
            cache.tasks().reconcile(id.as_str(), saved.clone());
            tracing::info!(task_id = %id, status = ?saved.status, "task update confirmed");
            Ok(saved)
        }
        Err(err) => {
            if cache.tasks().find(id.as_str()).is_some() {
                cache.tasks().restore(previous);
            }
            tracing::warn!(task_id = %id, error = %err, "task update rolled back");
            Err(err)
        }
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("pending", &lock(&self.lanes).len())
            .finish()
    }
}
