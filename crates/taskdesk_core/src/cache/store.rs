use crate::model::Entity;
use crate::observe::{Subscribers, Subscription, lock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// An immutable view of a collection. Readers keep it as long as they like;
/// writers publish a new one instead of touching it.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Sequence number taken when a fetch is issued. Results are applied only if
/// nothing newer has been applied since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

struct StoreState<T> {
    items: Snapshot<T>,
    fetched_at: Option<Instant>,
    issued: u64,
    applied: u64,
    revalidating: bool,
}

/// One keyed collection of the entity cache.
pub struct Store<T: Entity> {
    name: &'static str,
    stale_after: Duration,
    state: Mutex<StoreState<T>>,
    subscribers: Subscribers<Snapshot<T>>,
}

fn same_items<T: Entity>(left: &[Arc<T>], right: &[Arc<T>]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
}

/// Keeps at most one entity per key; the first occurrence wins.
fn dedup_by_key<T: Entity>(items: &mut Vec<Arc<T>>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.key().to_string()));
}

impl<T: Entity> Store<T> {
    pub fn new(name: &'static str, stale_after: Duration) -> Self {
        Self {
            name,
            stale_after,
            state: Mutex::new(StoreState {
                items: Arc::new(Vec::new()),
                fetched_at: None,
                issued: 0,
                applied: 0,
                revalidating: false,
            }),
            subscribers: Subscribers::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn get(&self) -> Snapshot<T> {
        Arc::clone(&lock(&self.state).items)
    }

    pub fn find(&self, key: &str) -> Option<Arc<T>> {
        lock(&self.state)
            .items
            .iter()
            .find(|item| item.key() == key)
            .cloned()
    }

    pub fn last_fetched(&self) -> Option<Instant> {
        lock(&self.state).fetched_at
    }

    /// Whether the last fetch is younger than the staleness threshold.
    pub fn is_fresh(&self) -> bool {
        lock(&self.state)
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.stale_after)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot<T>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub(crate) fn clear_subscribers(&self) {
        self.subscribers.clear();
    }

    /// Loads contents without claiming a sequence number, marking them fresh,
    /// or notifying anyone. Used once at startup from the local snapshot.
    pub(crate) fn seed(&self, items: Vec<T>) {
        let mut items: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        dedup_by_key(&mut items);
        lock(&self.state).items = Arc::new(items);
    }

    pub fn begin_fetch(&self) -> FetchTicket {
        let mut state = lock(&self.state);
        state.issued += 1;
        FetchTicket(state.issued)
    }

    /// Applies a fetch result unless a newer result (or a local write made
    /// after the fetch was issued) is already in place. Returns whether the
    /// result was applied.
    pub fn apply_fetch(&self, ticket: FetchTicket, items: Vec<T>) -> bool {
        let published = {
            let mut state = lock(&self.state);
            if ticket.0 <= state.applied {
                tracing::debug!(
                    collection = self.name,
                    sequence = ticket.0,
                    applied = state.applied,
                    "discarding out-of-date fetch result"
                );
                return false;
            }
            state.applied = ticket.0;
            state.fetched_at = Some(Instant::now());
            let next = reuse_unchanged(&state.items, items);
            self.publish(&mut state, next)
        };

        tracing::debug!(collection = self.name, sequence = ticket.0, "applied fetch result");
        self.deliver(published);
        true
    }

    /// Replaces the whole collection. Entities equal to the ones already held
    /// keep their identity; an identical collection notifies nobody. Like
    /// every local write it outranks fetches issued before it.
    pub fn set(&self, items: Vec<T>) {
        let published = {
            let mut state = lock(&self.state);
            state.issued += 1;
            state.applied = state.issued;
            state.fetched_at = Some(Instant::now());
            let next = reuse_unchanged(&state.items, items);
            self.publish(&mut state, next)
        };
        self.deliver(published);
    }

    /// Runs `updater` on the entity stored under `key` and stores the result
    /// in its place. Returns the entity that was replaced, or `None` when the
    /// key is unknown. Every other entity keeps its identity.
    pub fn patch<F>(&self, key: &str, updater: F) -> Option<Arc<T>>
    where
        F: FnOnce(&T) -> T,
    {
        self.write(|items| {
            let index = items.iter().position(|item| item.key() == key)?;
            let previous = Arc::clone(&items[index]);
            let updated = updater(&previous);
            if updated != *previous {
                items[index] = Arc::new(updated);
                dedup_after_replace(items, index);
            }
            Some(previous)
        })
    }

    /// Inserts `entity`, or replaces the entity with the same key in place.
    pub fn upsert(&self, entity: T) -> Option<Arc<T>> {
        self.restore(Arc::new(entity))
    }

    /// Like [`Store::upsert`] but keeps the given allocation, so a rolled
    /// back entity is the very value readers held before.
    pub fn restore(&self, entity: Arc<T>) -> Option<Arc<T>> {
        self.write(|items| match items.iter().position(|item| item.key() == entity.key()) {
            Some(index) => {
                let previous = std::mem::replace(&mut items[index], entity);
                Some(previous)
            }
            None => {
                items.push(entity);
                None
            }
        })
    }

    /// Puts `entity` back at `index` (clamped to the collection length).
    pub fn restore_at(&self, index: usize, entity: Arc<T>) {
        self.write(|items| {
            if let Some(existing) = items.iter().position(|item| item.key() == entity.key()) {
                items[existing] = entity;
                return;
            }
            let index = index.min(items.len());
            items.insert(index, entity);
        });
    }

    /// Removes the entity stored under `key`, returning its position and value.
    pub fn remove(&self, key: &str) -> Option<(usize, Arc<T>)> {
        self.write(|items| {
            let index = items.iter().position(|item| item.key() == key)?;
            Some((index, items.remove(index)))
        })
    }

    /// Swaps the entity stored under `old_key` for `entity`, which may carry a
    /// different key. Any other entity already holding the new key is dropped.
    /// When `old_key` is gone the entity is upserted.
    pub fn reconcile(&self, old_key: &str, entity: T) {
        let entity = Arc::new(entity);
        self.write(|items| match items.iter().position(|item| item.key() == old_key) {
            Some(index) => {
                if *items[index] != *entity {
                    items[index] = entity;
                }
                dedup_after_replace(items, index);
            }
            None => match items.iter().position(|item| item.key() == entity.key()) {
                Some(index) => {
                    if *items[index] != *entity {
                        items[index] = entity;
                    }
                }
                None => items.push(entity),
            },
        });
    }

    pub(crate) fn try_begin_revalidate(&self) -> bool {
        let mut state = lock(&self.state);
        if state.revalidating {
            return false;
        }
        state.revalidating = true;
        true
    }

    pub(crate) fn end_revalidate(&self) {
        lock(&self.state).revalidating = false;
    }

    /// Applies a local edit to a working copy and publishes it if anything
    /// changed. Local writes claim a sequence number so that fetches issued
    /// before the write cannot overwrite it.
    fn write<R, F>(&self, edit: F) -> R
    where
        F: FnOnce(&mut Vec<Arc<T>>) -> R,
    {
        let (result, published) = {
            let mut state = lock(&self.state);
            let mut working: Vec<Arc<T>> = state.items.as_ref().clone();
            let result = edit(&mut working);
            if same_items(&working, &state.items) {
                (result, None)
            } else {
                state.issued += 1;
                state.applied = state.issued;
                (result, self.publish(&mut state, working))
            }
        };
        self.deliver(published);
        result
    }

    fn publish(&self, state: &mut StoreState<T>, next: Vec<Arc<T>>) -> Option<Snapshot<T>> {
        if same_items(&next, &state.items) {
            return None;
        }
        let snapshot = Arc::new(next);
        state.items = Arc::clone(&snapshot);
        Some(snapshot)
    }

    fn deliver(&self, published: Option<Snapshot<T>>) {
        if let Some(snapshot) = published {
            self.subscribers.notify(&snapshot);
        }
    }
}

fn dedup_after_replace<T: Entity>(items: &mut Vec<Arc<T>>, index: usize) {
    let key = items[index].key().to_string();
    let mut position = 0;
    items.retain(|item| {
        let keep = position == index || item.key() != key;
        position += 1;
        keep
    });
}

/// Builds the next collection from fetched `items`, reusing the current
/// allocation for every entity whose value did not change.
fn reuse_unchanged<T: Entity>(current: &[Arc<T>], items: Vec<T>) -> Vec<Arc<T>> {
    let by_key: HashMap<&str, &Arc<T>> = current.iter().map(|item| (item.key(), item)).collect();
    let mut next: Vec<Arc<T>> = items
        .into_iter()
        .map(|item| match by_key.get(item.key()) {
            Some(existing) if ***existing == item => Arc::clone(existing),
            _ => Arc::new(item),
        })
        .collect();
    dedup_by_key(&mut next);
    next
}
