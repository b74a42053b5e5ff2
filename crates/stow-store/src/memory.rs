use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use stow_types::{Delta, Entity};

use crate::error::StoreResult;
use crate::sync::{DeltaCallback, Subscription, SubscriptionRegistry};
use crate::traits::{Backend, BackendFactory, SyncSource};

/// In-memory, ordered-map backend with change notification.
///
/// Intended for tests and embedding. Values are cloned on read and write, so
/// callers never alias stored state. Mutations and their delta delivery are
/// serialized, which keeps delivery in mutation order; a synchronous callback
/// must therefore not write back into the same backend (post to a dispatch
/// target instead).
pub struct MemoryBackend<T> {
    entries: RwLock<BTreeMap<String, T>>,
    emit: Mutex<()>,
    subscribers: SubscriptionRegistry<T>,
}

impl<T: Entity> MemoryBackend<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            emit: Mutex::new(()),
            subscribers: SubscriptionRegistry::new(),
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: Entity> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Backend<T> for MemoryBackend<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn range(
        &self,
        min_key: Option<&str>,
        max_key: Option<&str>,
        max_count: Option<usize>,
    ) -> StoreResult<Vec<T>> {
        if let (Some(min), Some(max)) = (min_key, max_key) {
            if min >= max {
                return Ok(Vec::new());
            }
        }
        let lower = min_key.map_or(Bound::Unbounded, Bound::Included);
        let upper = max_key.map_or(Bound::Unbounded, Bound::Excluded);
        let map = self.entries.read().expect("lock poisoned");
        let values = map
            .range::<str, _>((lower, upper))
            .map(|(_, value)| value.clone())
            .take(max_count.unwrap_or(usize::MAX))
            .collect();
        Ok(values)
    }

    async fn add(&self, key: &str, value: T) -> StoreResult<bool> {
        let _emit = self.emit.lock().expect("lock poisoned");
        {
            let mut map = self.entries.write().expect("lock poisoned");
            if map.contains_key(key) {
                return Ok(false);
            }
            map.insert(key.to_owned(), value.clone());
        }
        self.subscribers.notify(&Delta::add(key, value));
        Ok(true)
    }

    async fn put(&self, key: &str, value: T) -> StoreResult<()> {
        let _emit = self.emit.lock().expect("lock poisoned");
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.to_owned(), value.clone());
        self.subscribers.notify(&Delta::put(key, value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let _emit = self.emit.lock().expect("lock poisoned");
        let removed = self
            .entries
            .write()
            .expect("lock poisoned")
            .remove(key)
            .is_some();
        if removed {
            self.subscribers.notify(&Delta::remove(key));
        }
        Ok(removed)
    }

    fn sync_source(&self) -> Option<&dyn SyncSource<T>> {
        Some(self)
    }
}

impl<T: Entity> SyncSource<T> for MemoryBackend<T> {
    fn subscribe(&self, key: Option<&str>, callback: DeltaCallback<T>) -> Subscription {
        self.subscribers.subscribe(key, callback)
    }
}

impl<T> std::fmt::Debug for MemoryBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|map| map.len()).unwrap_or(0);
        f.debug_struct("MemoryBackend")
            .field("entry_count", &count)
            .finish()
    }
}

/// Factory producing a fresh [`MemoryBackend`] per entity type.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryBackendFactory;

#[async_trait]
impl BackendFactory for MemoryBackendFactory {
    async fn create<T: Entity>(&self) -> StoreResult<Arc<dyn Backend<T>>> {
        Ok(Arc::new(MemoryBackend::<T>::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stow_types::{DeltaAction, Keyed};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Item {
        id: String,
        n: u32,
    }

    impl Item {
        fn new(id: &str, n: u32) -> Self {
            Self { id: id.into(), n }
        }
    }

    impl Keyed for Item {
        fn key(&self) -> String {
            self.id.clone()
        }
    }

    impl Entity for Item {}

    async fn seeded(keys: &[&str]) -> MemoryBackend<Item> {
        let backend = MemoryBackend::new();
        for (i, key) in keys.iter().enumerate() {
            backend.put(key, Item::new(key, i as u32)).await.unwrap();
        }
        backend
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_and_get() {
        let backend = MemoryBackend::new();
        backend.put("a", Item::new("a", 1)).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), Some(Item::new("a", 1)));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_fails_when_present() {
        let backend = MemoryBackend::new();
        assert!(backend.add("a", Item::new("a", 1)).await.unwrap());
        assert!(!backend.add("a", Item::new("a", 2)).await.unwrap());
        assert_eq!(backend.get("a").await.unwrap().unwrap().n, 1);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let backend = MemoryBackend::new();
        backend.put("a", Item::new("a", 1)).await.unwrap();
        backend.put("a", Item::new("a", 2)).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap().unwrap().n, 2);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let backend = seeded(&["a"]).await;
        assert!(backend.delete("a").await.unwrap());
        assert!(!backend.delete("a").await.unwrap());
        assert!(backend.is_empty());
    }

    // -----------------------------------------------------------------------
    // Range
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn range_is_half_open_and_ordered() {
        let backend = seeded(&["b2", "a1", "b1", "c1", "b"]).await;
        let ids: Vec<String> = backend
            .range(Some("b"), Some("c"), None)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["b", "b1", "b2"]);
    }

    #[tokio::test]
    async fn range_respects_max_count() {
        let backend = seeded(&["a", "b", "c", "d"]).await;
        let items = backend.range(None, None, Some(2)).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[1].id, "b");
    }

    #[tokio::test]
    async fn range_with_inverted_bounds_is_empty() {
        let backend = seeded(&["a", "b"]).await;
        assert!(backend.range(Some("b"), Some("a"), None).await.unwrap().is_empty());
        assert!(backend.range(Some("a"), Some("a"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn range_unbounded_returns_all() {
        let backend = seeded(&["z", "a", "m"]).await;
        let items = backend.range(None, None, None).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(backend.keys(), vec!["a", "m", "z"]);
    }

    // -----------------------------------------------------------------------
    // Change notification
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn emits_deltas_in_mutation_order() {
        let backend = MemoryBackend::<Item>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = backend.sync_source().unwrap().subscribe(
            None,
            Arc::new(move |delta: &Delta<Item>| {
                sink.lock().unwrap().push((delta.action, delta.key.clone()));
            }),
        );

        backend.add("a", Item::new("a", 1)).await.unwrap();
        backend.add("a", Item::new("a", 2)).await.unwrap(); // rejected, no delta
        backend.put("a", Item::new("a", 3)).await.unwrap();
        backend.delete("a").await.unwrap();
        backend.delete("a").await.unwrap(); // absent, no delta

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (DeltaAction::Add, "a".to_string()),
                (DeltaAction::Put, "a".to_string()),
                (DeltaAction::Remove, "a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn delta_values_are_not_aliased() {
        let backend = MemoryBackend::<Item>::new();
        let captured = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);
        let _sub = backend.subscribe(
            Some("a"),
            Arc::new(move |delta: &Delta<Item>| {
                *sink.lock().unwrap() = delta.value.clone();
            }),
        );

        backend.put("a", Item::new("a", 1)).await.unwrap();
        backend.put("a", Item::new("a", 2)).await.unwrap();
        assert_eq!(captured.lock().unwrap().as_ref().unwrap().n, 2);
        assert_eq!(backend.get("a").await.unwrap().unwrap().n, 2);
    }

    #[tokio::test]
    async fn factory_creates_independent_backends() {
        let factory = MemoryBackendFactory;
        let first = factory.create::<Item>().await.unwrap();
        let second = factory.create::<Item>().await.unwrap();
        first.put("a", Item::new("a", 1)).await.unwrap();
        assert!(second.get("a").await.unwrap().is_none());
        assert!(first.sync_source().is_some());
    }

    #[test]
    fn debug_format() {
        let backend = MemoryBackend::<Item>::new();
        let debug = format!("{backend:?}");
        assert!(debug.contains("MemoryBackend"));
        assert!(debug.contains("entry_count"));
    }
}
