use std::sync::Arc;

use async_trait::async_trait;
use stow_types::Entity;

use crate::error::StoreResult;
use crate::sync::{DeltaCallback, Subscription};

/// Storage backend for one entity type.
///
/// Keys compare ordinally. Implementations must be thread-safe and must emit
/// deltas (when they expose a [`SyncSource`]) in the order mutations were
/// applied.
#[async_trait]
pub trait Backend<T: Entity>: Send + Sync {
    /// Read a value by key. Returns `Ok(None)` if absent.
    async fn get(&self, key: &str) -> StoreResult<Option<T>>;

    /// Values with keys in `[min_key, max_key)`, in ascending key order,
    /// at most `max_count` of them. A `None` bound is unbounded.
    async fn range(
        &self,
        min_key: Option<&str>,
        max_key: Option<&str>,
        max_count: Option<usize>,
    ) -> StoreResult<Vec<T>>;

    /// Insert if absent. Returns `false` if a value already exists at `key`.
    async fn add(&self, key: &str, value: T) -> StoreResult<bool>;

    /// Unconditional upsert.
    async fn put(&self, key: &str, value: T) -> StoreResult<()>;

    /// Remove a value. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Change-notification capability, if this backend has one.
    fn sync_source(&self) -> Option<&dyn SyncSource<T>> {
        None
    }
}

/// Change-notification capability of a backend.
pub trait SyncSource<T>: Send + Sync {
    /// Register `callback` for every delta, or only those for `key` when
    /// given. The returned handle is already active.
    fn subscribe(&self, key: Option<&str>, callback: DeltaCallback<T>) -> Subscription;
}

/// Creates the backend for an entity type on first use.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create<T: Entity>(&self) -> StoreResult<Arc<dyn Backend<T>>>;
}
