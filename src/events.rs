//! Cache event listeners.
//!
//! Listeners observe the cache's lifecycle: insertions, removals,
//! evictions, expirations, load outcomes and clears. Delivery is
//! best-effort and synchronous on whichever thread performed the operation
//! (user thread for `put`/`remove`, the maintenance thread for sweep
//! expirations); listeners must not assume a particular thread.
//!
//! A panicking listener never corrupts cache state and never prevents the
//! remaining listeners from running: every callback is isolated with
//! `catch_unwind` and failures are logged and dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::LoadError;

/// Why an entry was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// The entry-count bound was exceeded.
    Size,
    /// The aggregate-weight bound was exceeded.
    Weight,
    /// The entry's time-to-live or idle window elapsed.
    Expired,
    /// The entry was displaced by an explicit user operation.
    Explicit,
}

/// Observer of cache lifecycle events.
///
/// Every method has a no-op default so implementors override only the
/// events they care about.
#[allow(unused_variables)]
pub trait EventListener<K, V>: Send + Sync {
    /// A value was inserted or replaced.
    fn on_put(&self, key: &K, value: &V) {}

    /// A value was removed (explicitly, or displaced by a replacement).
    fn on_remove(&self, key: &K, value: &V) {}

    /// A value was evicted by the policy or the expiration sweep.
    fn on_evict(&self, key: &K, value: &V, reason: EvictionReason) {}

    /// A value's time-to-live or idle window elapsed.
    fn on_expire(&self, key: &K, value: &V) {}

    /// A loader produced a value that was inserted.
    fn on_load(&self, key: &K, value: &V) {}

    /// A loader failed; the triggering lookup returned nothing.
    fn on_load_error(&self, key: &K, error: &LoadError) {}

    /// All entries were dropped.
    fn on_clear(&self) {}
}

/// The cache's registered listeners, with panic isolation on dispatch.
pub(crate) struct ListenerSet<K, V> {
    listeners: Vec<Arc<dyn EventListener<K, V>>>,
}

impl<K, V> ListenerSet<K, V> {
    pub(crate) fn new(listeners: Vec<Arc<dyn EventListener<K, V>>>) -> Self {
        ListenerSet { listeners }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn each(&self, event: &'static str, f: impl Fn(&dyn EventListener<K, V>)) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::warn!(event, "cache event listener panicked; continuing");
            }
        }
    }

    pub(crate) fn put(&self, key: &K, value: &V) {
        self.each("put", |l| l.on_put(key, value));
    }

    pub(crate) fn remove(&self, key: &K, value: &V) {
        self.each("remove", |l| l.on_remove(key, value));
    }

    pub(crate) fn evict(&self, key: &K, value: &V, reason: EvictionReason) {
        self.each("evict", |l| l.on_evict(key, value, reason));
    }

    pub(crate) fn expire(&self, key: &K, value: &V) {
        self.each("expire", |l| l.on_expire(key, value));
    }

    pub(crate) fn load(&self, key: &K, value: &V) {
        self.each("load", |l| l.on_load(key, value));
    }

    pub(crate) fn load_error(&self, key: &K, error: &LoadError) {
        self.each("load_error", |l| l.on_load_error(key, error));
    }

    pub(crate) fn clear(&self) {
        self.each("clear", |l| l.on_clear());
    }
}

impl<K, V> std::fmt::Debug for ListenerSet<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.listeners.len())
            .finish()
    }
}
