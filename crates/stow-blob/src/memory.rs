use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{BlobError, BlobResult};
use crate::traits::{is_addressable, BlobReader, BlobStore};

/// In-memory blob store.
///
/// Intended for tests and embedding. Follows the same key rules and
/// first-writer-wins semantics as [`FileBlobStore`](crate::FileBlobStore).
/// Content is shared, not copied, between readers.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.len() as u64)
            .sum()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared blob bytes as a reader.
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(key))
    }

    async fn get(&self, key: &str) -> BlobResult<Option<BlobReader>> {
        let blob = self.blobs.read().expect("lock poisoned").get(key).cloned();
        Ok(blob.map(|bytes| Box::new(Cursor::new(SharedBytes(bytes))) as BlobReader))
    }

    async fn put(
        &self,
        key: &str,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<String> {
        if !is_addressable(key) {
            return Err(BlobError::InvalidKey(key.to_owned()));
        }
        if self.exists(key).await? {
            return Ok(key.to_owned());
        }
        let mut content = Vec::new();
        input.read_to_end(&mut content).await?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .entry(key.to_owned())
            .or_insert_with(|| content.into());
        Ok(key.to_owned())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.blobs.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> BlobResult<()> {
        self.blobs.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(store: &MemoryBlobStore, key: &str) -> Vec<u8> {
        let mut reader = store.get(key).await.unwrap().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn round_trip() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.put("ab", &mut &b"hello"[..]).await.unwrap(), "ab");
        assert!(store.exists("ab").await.unwrap());
        assert_eq!(read_all(&store, "ab").await, b"hello");
        assert_eq!(store.total_bytes(), 5);
    }

    #[tokio::test]
    async fn first_writer_wins() {
        let store = MemoryBlobStore::new();
        store.put("ab", &mut &b"first"[..]).await.unwrap();
        let mut second: &[u8] = b"second";
        store.put("ab", &mut second).await.unwrap();
        assert_eq!(read_all(&store, "ab").await, b"first");
        assert_eq!(second, &b"second"[..], "fast path must not read the input");
    }

    #[tokio::test]
    async fn short_keys() {
        let store = MemoryBlobStore::new();
        assert!(store.put("a", &mut &b"x"[..]).await.is_err());
        assert!(!store.exists("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_and_delete_all() {
        let store = MemoryBlobStore::default();
        store.put("aa", &mut &b"1"[..]).await.unwrap();
        store.put("bb", &mut &b"2"[..]).await.unwrap();
        store.delete("aa").await.unwrap();
        store.delete("aa").await.unwrap();
        assert!(!store.exists("aa").await.unwrap());
        assert_eq!(store.len(), 1);
        store.delete_all().await.unwrap();
        assert!(store.is_empty());
    }
}
