//! The entity cache: the in-memory source of truth for tasks, the profile,
//! its picture and categories.
//!
//! Reads never block on the network. A read of a stale collection returns the
//! last known value and kicks off a background refetch; fetch results are
//! ordered by the sequence number taken when the fetch was issued.

mod store;

pub use store::{FetchTicket, Snapshot, Store};

use crate::error::AppResult;
use crate::gateway::Gateway;
use crate::model::{Category, Entity, Profile, ProfileImage, Task};
use crate::observe::{Subscription, lock};
use crate::storage::snapshot::{self, CacheSnapshot, SnapshotWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Profile,
    Categories,
    ProfileImage,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Self::Tasks,
        Self::Profile,
        Self::Categories,
        Self::ProfileImage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Profile => "profile",
            Self::Categories => "categories",
            Self::ProfileImage => "profile_image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub tasks_stale_after: Duration,
    pub profile_stale_after: Duration,
    pub categories_stale_after: Duration,
    /// Zero by default: every read of the picture revalidates it.
    pub profile_image_stale_after: Duration,
    /// Where the local durability snapshot lives; `None` disables it.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            tasks_stale_after: Duration::from_secs(30),
            profile_stale_after: Duration::from_secs(5 * 60),
            categories_stale_after: Duration::from_secs(5 * 60),
            profile_image_stale_after: Duration::ZERO,
            snapshot_path: None,
        }
    }
}

/// What a reader gets back: the current collection and whether it is
/// younger than the staleness threshold.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub items: Snapshot<T>,
    pub fresh: bool,
}

impl<T> Cached<T> {
    pub fn first(&self) -> Option<&Arc<T>> {
        self.items.first()
    }
}

pub struct EntityCache {
    gateway: Arc<dyn Gateway>,
    tasks: Store<Task>,
    profile: Store<Profile>,
    categories: Store<Category>,
    profile_image: Store<ProfileImage>,
    persistence: Mutex<Vec<Subscription>>,
    snapshot_writer: Mutex<Option<Arc<SnapshotWriter>>>,
    closed: AtomicBool,
}

/// Clears a collection's revalidation flag when the background refetch ends,
/// including when it panics or is cancelled.
struct RevalidationGuard {
    cache: Arc<EntityCache>,
    collection: Collection,
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.cache.end_revalidate(self.collection);
    }
}

impl EntityCache {
    /// Builds the cache for one session. When a snapshot path is configured
    /// the collections are seeded from it before any fetch resolves, and every
    /// later change is written back to it.
    pub fn init(gateway: Arc<dyn Gateway>, options: CacheOptions) -> Arc<Self> {
        let cache = Arc::new(Self {
            gateway,
            tasks: Store::new(Collection::Tasks.name(), options.tasks_stale_after),
            profile: Store::new(Collection::Profile.name(), options.profile_stale_after),
            categories: Store::new(
                Collection::Categories.name(),
                options.categories_stale_after,
            ),
            profile_image: Store::new(
                Collection::ProfileImage.name(),
                options.profile_image_stale_after,
            ),
            persistence: Mutex::new(Vec::new()),
            snapshot_writer: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if let Some(path) = options.snapshot_path {
            cache.attach_snapshot(path);
        }

        cache
    }

    fn attach_snapshot(self: &Arc<Self>, path: PathBuf) {
        let seeded = match snapshot::load_snapshot(&path) {
            Ok(seeded) => seeded,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cache snapshot");
                CacheSnapshot::default()
            }
        };

        self.tasks.seed(seeded.tasks.clone());
        self.profile.seed(seeded.profile.clone().into_iter().collect());
        self.categories.seed(seeded.categories.clone());
        self.profile_image
            .seed(seeded.profile_image.clone().into_iter().collect());

        let writer = Arc::new(SnapshotWriter::new(path, seeded));
        // Each callback records the store's contents at the time it runs,
        // not the value it was handed, so a late delivery cannot write back
        // an older collection.
        let subscriptions = vec![
            self.tasks.subscribe(self.recorder::<Task, _>(&writer, |cache, writer| {
                writer.record_tasks(&cache.tasks.get());
            })),
            self.profile.subscribe(self.recorder::<Profile, _>(&writer, |cache, writer| {
                writer.record_profile(&cache.profile.get());
            })),
            self.categories.subscribe(self.recorder::<Category, _>(&writer, |cache, writer| {
                writer.record_categories(&cache.categories.get());
            })),
            self.profile_image
                .subscribe(self.recorder::<ProfileImage, _>(&writer, |cache, writer| {
                    writer.record_profile_image(&cache.profile_image.get());
                })),
        ];
        lock(&self.persistence).extend(subscriptions);
        *lock(&self.snapshot_writer) = Some(writer);
    }

    fn recorder<T, F>(
        self: &Arc<Self>,
        writer: &Arc<SnapshotWriter>,
        record: F,
    ) -> impl Fn(&Snapshot<T>) + Send + Sync + 'static + use<T, F>
    where
        T: Entity,
        F: Fn(&EntityCache, &SnapshotWriter) + Send + Sync + 'static,
    {
        let cache: Weak<EntityCache> = Arc::downgrade(self);
        let writer = Arc::clone(writer);
        move |_: &Snapshot<T>| {
            if let Some(cache) = cache.upgrade() {
                record(&cache, &writer);
            }
        }
    }

    pub fn tasks(&self) -> &Store<Task> {
        &self.tasks
    }

    pub fn profile(&self) -> &Store<Profile> {
        &self.profile
    }

    pub fn categories(&self) -> &Store<Category> {
        &self.categories
    }

    pub fn profile_image(&self) -> &Store<ProfileImage> {
        &self.profile_image
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_fresh(&self, collection: Collection) -> bool {
        match collection {
            Collection::Tasks => self.tasks.is_fresh(),
            Collection::Profile => self.profile.is_fresh(),
            Collection::Categories => self.categories.is_fresh(),
            Collection::ProfileImage => self.profile_image.is_fresh(),
        }
    }

    pub fn use_tasks(self: &Arc<Self>) -> Cached<Task> {
        self.read(&self.tasks, Collection::Tasks)
    }

    pub fn use_profile(self: &Arc<Self>) -> Cached<Profile> {
        self.read(&self.profile, Collection::Profile)
    }

    pub fn use_categories(self: &Arc<Self>) -> Cached<Category> {
        self.read(&self.categories, Collection::Categories)
    }

    /// The picture is a collection of at most one entity; empty means none
    /// has been uploaded.
    pub fn use_profile_image(self: &Arc<Self>) -> Cached<ProfileImage> {
        self.read(&self.profile_image, Collection::ProfileImage)
    }

    fn read<T: Entity>(self: &Arc<Self>, store: &Store<T>, collection: Collection) -> Cached<T> {
        let cached = Cached {
            items: store.get(),
            fresh: store.is_fresh(),
        };
        if !cached.fresh {
            self.revalidate(collection);
        }
        cached
    }

    /// Starts a background refetch of `collection` unless one is already
    /// running. Failures are logged; the cache keeps its last known value.
    pub fn revalidate(self: &Arc<Self>, collection: Collection) {
        if self.is_closed() || !self.begin_revalidate(collection) {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    collection = collection.name(),
                    "no async runtime available, skipping background refresh"
                );
                self.end_revalidate(collection);
                return;
            }
        };

        let guard = RevalidationGuard {
            cache: Arc::clone(self),
            collection,
        };
        handle.spawn(async move {
            if let Err(err) = guard.cache.refresh(collection).await {
                tracing::warn!(
                    collection = collection.name(),
                    error = %err,
                    "background refresh failed"
                );
            }
        });
    }

    fn begin_revalidate(&self, collection: Collection) -> bool {
        match collection {
            Collection::Tasks => self.tasks.try_begin_revalidate(),
            Collection::Profile => self.profile.try_begin_revalidate(),
            Collection::Categories => self.categories.try_begin_revalidate(),
            Collection::ProfileImage => self.profile_image.try_begin_revalidate(),
        }
    }

    fn end_revalidate(&self, collection: Collection) {
        match collection {
            Collection::Tasks => self.tasks.end_revalidate(),
            Collection::Profile => self.profile.end_revalidate(),
            Collection::Categories => self.categories.end_revalidate(),
            Collection::ProfileImage => self.profile_image.end_revalidate(),
        }
    }

    /// Fetches `collection` from the gateway. Returns `Ok(false)` when the
    /// result arrived too late to be applied.
    pub async fn refresh(&self, collection: Collection) -> AppResult<bool> {
        match collection {
            Collection::Tasks => {
                let ticket = self.tasks.begin_fetch();
                let tasks = self.gateway.fetch_tasks().await?;
                Ok(self.settle(&self.tasks, ticket, tasks))
            }
            Collection::Profile => {
                let ticket = self.profile.begin_fetch();
                let profile = self.gateway.fetch_profile().await?;
                Ok(self.settle(&self.profile, ticket, vec![profile]))
            }
            Collection::Categories => {
                let ticket = self.categories.begin_fetch();
                let categories = self.gateway.fetch_categories().await?;
                Ok(self.settle(&self.categories, ticket, categories))
            }
            Collection::ProfileImage => {
                let ticket = self.profile_image.begin_fetch();
                let image = self.gateway.fetch_profile_image().await?;
                Ok(self.settle(&self.profile_image, ticket, image.into_iter().collect()))
            }
        }
    }

    pub async fn refresh_tasks(&self) -> AppResult<bool> {
        self.refresh(Collection::Tasks).await
    }

    pub async fn refresh_profile(&self) -> AppResult<bool> {
        self.refresh(Collection::Profile).await
    }

    pub async fn refresh_categories(&self) -> AppResult<bool> {
        self.refresh(Collection::Categories).await
    }

    pub async fn refresh_profile_image(&self) -> AppResult<bool> {
        self.refresh(Collection::ProfileImage).await
    }

    pub async fn refresh_all(&self) -> AppResult<()> {
        tokio::try_join!(
            self.refresh_tasks(),
            self.refresh_profile(),
            self.refresh_categories(),
            self.refresh_profile_image(),
        )?;
        Ok(())
    }

    fn settle<T: Entity>(&self, store: &Store<T>, ticket: FetchTicket, items: Vec<T>) -> bool {
        if self.is_closed() {
            tracing::debug!(collection = store.name(), "cache closed, dropping fetch result");
            return false;
        }
        store.apply_fetch(ticket, items)
    }

    /// Ends the session: subscribers are dropped, the snapshot gets one last
    /// write and fetches still in flight are discarded when they land. Safe
    /// to call more than once.
    pub fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.persistence).clear();
        if let Some(writer) = lock(&self.snapshot_writer).take() {
            writer.flush();
        }
        self.tasks.clear_subscribers();
        self.profile.clear_subscribers();
        self.categories.clear_subscribers();
        self.profile_image.clear_subscribers();
        tracing::debug!("entity cache torn down");
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("tasks", &self.tasks.get().len())
            .field("categories", &self.categories.get().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
