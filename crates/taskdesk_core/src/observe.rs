use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// A list of callbacks interested in values of type `T`.
pub struct Subscribers<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            registry.next_id += 1;
            let id = registry.next_id;
            registry.entries.push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Calls every subscriber with `value`. Callbacks run after the registry
    /// lock is released, so they may subscribe or unsubscribe freely.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn clear(&self) {
        lock(&self.registry).entries.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by every `subscribe`. Unsubscribing is idempotent and also
/// happens when the handle is dropped.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new<F: FnOnce() + Send + 'static>(cancel: F) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn unsubscribe(&self) {
        let cancel = lock(&self.cancel).take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.cancel).is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
