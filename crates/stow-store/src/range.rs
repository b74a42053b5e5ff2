//! Prefix scans, lazy paged enumeration, and read-modify-write helpers.

use std::marker::PhantomData;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use stow_types::key::{increment, successor};
use stow_types::Entity;

use crate::error::{StoreError, StoreResult};
use crate::storage::Storage;
use crate::traits::BackendFactory;

/// Default batch size for [`Storage::all`].
pub const DEFAULT_BATCH_SIZE: usize = 1000;

impl<F: BackendFactory> Storage<F> {
    /// Every value whose key starts with `prefix`, in key order.
    pub async fn list<T: Entity>(&self, prefix: &str) -> StoreResult<Vec<T>> {
        self.range(Some(prefix), increment(prefix).as_deref(), None)
            .await
    }

    /// At most `count` values whose key starts with `prefix`, in key order.
    pub async fn page<T: Entity>(&self, prefix: &str, count: usize) -> StoreResult<Vec<T>> {
        self.range(Some(prefix), increment(prefix).as_deref(), Some(count))
            .await
    }

    /// Lazy, restartable enumeration of every value under `prefix`.
    ///
    /// With a batch size, values are fetched `batch_size` at a time until a
    /// batch comes back empty. Without one, a single unbounded range is read.
    pub fn all<T: Entity>(&self, prefix: &str, batch_size: Option<usize>) -> Paged<'_, F, T> {
        Paged {
            storage: self,
            prefix: prefix.to_owned(),
            batch_size,
            _entity: PhantomData,
        }
    }

    /// Upsert a value under its own key.
    pub async fn put_entity<T: Entity>(&self, value: T) -> StoreResult<()> {
        let key = value.key();
        self.put(&key, value).await
    }

    /// Remove the value stored under `value`'s key.
    pub async fn delete_entity<T: Entity>(&self, value: &T) -> StoreResult<bool> {
        self.delete::<T>(&value.key()).await
    }

    /// Read the value at `key`, mutate a copy, and write it back.
    ///
    /// Returns `false` without writing when the key is absent. See
    /// [`Storage::patch_if`] for the consistency caveat.
    pub async fn patch<T: Entity>(
        &self,
        key: &str,
        mutate: impl FnOnce(&mut T),
    ) -> StoreResult<bool> {
        self.patch_if(key, |_: &T| true, mutate).await
    }

    /// Like [`Storage::patch`], but only writes when `predicate` accepts the
    /// current value.
    ///
    /// Not transactional: the read and the write are independent operations,
    /// so concurrent patches of one key can lose updates (last writer wins).
    pub async fn patch_if<T: Entity>(
        &self,
        key: &str,
        predicate: impl FnOnce(&T) -> bool,
        mutate: impl FnOnce(&mut T),
    ) -> StoreResult<bool> {
        let Some(existing) = self.get::<T>(key).await? else {
            return Ok(false);
        };
        if !predicate(&existing) {
            return Ok(false);
        }
        let mut patched = existing.clone();
        mutate(&mut patched);
        self.put(key, patched).await?;
        Ok(true)
    }
}

/// A restartable, lazily fetched prefix scan. Created by [`Storage::all`].
pub struct Paged<'a, F, T> {
    storage: &'a Storage<F>,
    prefix: String,
    batch_size: Option<usize>,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, F: BackendFactory, T: Entity> Paged<'a, F, T> {
    /// Start a fresh scan from the original prefix.
    ///
    /// After each batch the lower bound moves to the immediate successor of
    /// the last returned key (`last + "\0"`), not to `increment(last)`, which
    /// would skip keys that extend `last` such as `"ab"` after `"a"`.
    pub fn stream(&self) -> impl Stream<Item = StoreResult<T>> + 'a {
        let storage = self.storage;
        let upper = increment(&self.prefix);
        let batch_size = self.batch_size;

        stream::try_unfold(Some(self.prefix.clone()), move |lower| {
            next_batch::<F, T>(storage, lower, upper.clone(), batch_size)
        })
        .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<T, StoreError>)))
        .try_flatten()
    }

    /// Drain a fresh scan into a vector.
    pub async fn collect(&self) -> StoreResult<Vec<T>> {
        self.stream().try_collect().await
    }

    /// Fetch only the first batch.
    pub async fn first_batch(&self) -> StoreResult<Vec<T>> {
        let upper = increment(&self.prefix);
        self.storage
            .range(Some(self.prefix.as_str()), upper.as_deref(), self.batch_size)
            .await
    }

    /// Number of values a fresh scan yields.
    pub async fn count(&self) -> StoreResult<usize> {
        let mut stream = Box::pin(self.stream());
        let mut count = 0;
        while let Some(item) = stream.next().await {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

async fn next_batch<F: BackendFactory, T: Entity>(
    storage: &Storage<F>,
    lower: Option<String>,
    upper: Option<String>,
    batch_size: Option<usize>,
) -> StoreResult<Option<(Vec<T>, Option<String>)>> {
    let Some(lower) = lower else {
        return Ok(None);
    };
    let batch: Vec<T> = storage
        .range(Some(lower.as_str()), upper.as_deref(), batch_size)
        .await?;
    if batch.is_empty() {
        return Ok(None);
    }
    let next = match batch_size {
        Some(_) => batch.last().map(|last| successor(&last.key())),
        None => None,
    };
    Ok(Some((batch, next)))
}
