use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use stow_types::{Delta, Entity};
use tracing::{debug, warn};

use crate::clock::LogicalClock;
use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::registry::BackendRegistry;
use crate::sync::{DeltaCallback, Subscription};
use crate::traits::{Backend, BackendFactory};

/// Typed storage dispatcher.
///
/// Routes generic operations to a lazily created backend per entity type,
/// counts traffic, and optionally stamps writes with a logical clock.
/// Subscriptions registered for a type are attached before that type's backend
/// serves its first read or write, so a subscriber registered before any
/// traffic observes every mutation.
pub struct Storage<F> {
    registry: BackendRegistry<F>,
    clock: LogicalClock,
    timestamp_enabled: AtomicBool,
    counter_window: u64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<F: BackendFactory> Storage<F> {
    /// Create a dispatcher with default configuration.
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, StorageConfig::default())
    }

    pub fn with_config(factory: F, config: StorageConfig) -> Self {
        Self {
            registry: BackendRegistry::new(factory),
            clock: LogicalClock::new(),
            timestamp_enabled: AtomicBool::new(config.timestamp_enabled),
            counter_window: config.counter_window,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Read a value by key. Absence is `Ok(None)`.
    pub async fn get<T: Entity>(&self, key: &str) -> StoreResult<Option<T>> {
        self.count_read();
        self.backend::<T>().await?.get(key).await
    }

    /// Values with keys in `[min_key, max_key)` in ascending key order, at
    /// most `max_count` of them.
    pub async fn range<T: Entity>(
        &self,
        min_key: Option<&str>,
        max_key: Option<&str>,
        max_count: Option<usize>,
    ) -> StoreResult<Vec<T>> {
        self.count_read();
        self.backend::<T>()
            .await?
            .range(min_key, max_key, max_count)
            .await
    }

    /// Insert if absent. Returns `false` if a value already exists at `key`.
    pub async fn add<T: Entity>(&self, key: &str, mut value: T) -> StoreResult<bool> {
        self.count_write();
        require_key(key)?;
        let backend = self.backend::<T>().await?;
        self.stamp(&mut value);
        backend.add(key, value).await
    }

    /// Unconditional upsert.
    pub async fn put<T: Entity>(&self, key: &str, mut value: T) -> StoreResult<()> {
        self.count_write();
        require_key(key)?;
        let backend = self.backend::<T>().await?;
        self.stamp(&mut value);
        backend.put(key, value).await
    }

    /// Remove a value. Returns `true` if something was removed.
    pub async fn delete<T: Entity>(&self, key: &str) -> StoreResult<bool> {
        self.count_write();
        self.backend::<T>().await?.delete(key).await
    }

    /// Register a callback for every delta of type `T`.
    ///
    /// If `T`'s backend does not exist yet the subscription stays
    /// [`Pending`](crate::SubscriptionState::Pending) until the first
    /// operation on `T` resolves it.
    pub fn subscribe<T: Entity>(
        &self,
        callback: impl Fn(&Delta<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(None, Arc::new(callback))
    }

    /// Register a callback for deltas of type `T` at a single key.
    pub fn subscribe_key<T: Entity>(
        &self,
        key: &str,
        callback: impl Fn(&Delta<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(Some(key.to_owned()), Arc::new(callback))
    }

    /// Resolve `T`'s backend now, attaching any pending subscriptions.
    pub async fn resolve<T: Entity>(&self) -> StoreResult<()> {
        self.backend::<T>().await.map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Counters and clock
    // -----------------------------------------------------------------------

    /// Reads counted in the current sampling window.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Writes counted in the current sampling window.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Reads per write over the sampling window, or 1.0 with no writes.
    pub fn read_write_ratio(&self) -> f64 {
        let writes = self.write_count();
        if writes > 0 {
            self.read_count() as f64 / writes as f64
        } else {
            1.0
        }
    }

    pub fn timestamp_enabled(&self) -> bool {
        self.timestamp_enabled.load(Ordering::Relaxed)
    }

    pub fn set_timestamp_enabled(&self, enabled: bool) {
        self.timestamp_enabled.store(enabled, Ordering::Relaxed);
    }

    /// The logical clock used for write stamping.
    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// The per-type backend registry.
    pub fn registry(&self) -> &BackendRegistry<F> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn backend<T: Entity>(&self) -> StoreResult<Arc<dyn Backend<T>>> {
        self.registry.resolve::<T>().await
    }

    fn register<T: Entity>(&self, key: Option<String>, callback: DeltaCallback<T>) -> Subscription {
        let handle = Subscription::pending();
        let pending = handle.clone();
        self.registry.enqueue::<T>(move |backend: &Arc<dyn Backend<T>>| {
            pending.activate_with(|| match backend.sync_source() {
                Some(source) => {
                    debug!(entity = std::any::type_name::<T>(), key = ?key, "subscription attached");
                    Some(source.subscribe(key.as_deref(), callback))
                }
                None => {
                    warn!(
                        entity = std::any::type_name::<T>(),
                        "backend has no change notification; subscription disposed"
                    );
                    None
                }
            });
        });
        handle
    }

    fn stamp<T: Entity>(&self, value: &mut T) {
        if !self.timestamp_enabled() {
            return;
        }
        if let Some(timestamp) = value.timestamp_mut() {
            if timestamp.is_unset() {
                *timestamp = self.clock.next();
            }
        }
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn count_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) + 1 > self.counter_window {
            self.writes.store(1, Ordering::Relaxed);
            self.reads.store(0, Ordering::Relaxed);
        }
    }
}

fn require_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

impl<F> std::fmt::Debug for Storage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("reads", &self.reads.load(Ordering::Relaxed))
            .field("writes", &self.writes.load(Ordering::Relaxed))
            .field("timestamp_enabled", &self.timestamp_enabled.load(Ordering::Relaxed))
            .finish()
    }
}
