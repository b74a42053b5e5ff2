use std::io;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::digest::DigestAlgorithm;
use crate::error::BlobResult;
use crate::traits::{BlobReader, BlobStore};

const SPOOL_CHUNK: usize = 64 * 1024;

/// Content-addressed view over a [`BlobStore`].
///
/// The key of every blob is the lowercase hex digest of its content, so equal
/// payloads share one key and repeated puts are idempotent. Payloads are
/// hashed while they are spooled to an anonymous temp file, so memory use
/// does not grow with the payload.
#[derive(Debug)]
pub struct ContentAddressableStore<S> {
    inner: S,
    algorithm: DigestAlgorithm,
}

impl<S: BlobStore> ContentAddressableStore<S> {
    /// Wrap `inner` using the default digest (SHA-1).
    pub fn new(inner: S) -> Self {
        Self::with_algorithm(inner, DigestAlgorithm::default())
    }

    pub fn with_algorithm(inner: S, algorithm: DigestAlgorithm) -> Self {
        Self { inner, algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Store the content of `input` and return its digest key.
    pub async fn put<R>(&self, input: &mut R) -> BlobResult<String>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let spool = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(io::Error::other)??;
        let mut spool = fs::File::from_std(spool);
        let mut hasher = self.algorithm.hasher();
        let mut buf = vec![0u8; SPOOL_CHUNK];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            spool.write_all(&buf[..n]).await?;
        }
        spool.flush().await?;
        spool.rewind().await?;

        let bytes = hasher.bytes();
        let key = hasher.finalize_hex();
        debug!(key = %key, bytes, "content digested");
        self.inner.put(&key, &mut spool).await
    }

    pub async fn get(&self, key: &str) -> BlobResult<Option<BlobReader>> {
        self.inner.get(key).await
    }

    pub async fn exists(&self, key: &str) -> BlobResult<bool> {
        self.inner.exists(key).await
    }

    pub async fn delete(&self, key: &str) -> BlobResult<()> {
        self.inner.delete(key).await
    }

    /// Re-hash the stored content for `key` and compare. Absent blobs and
    /// keys that are not digests of this store's algorithm verify as `false`.
    pub async fn verify(&self, key: &str) -> BlobResult<bool> {
        if !self.algorithm.is_digest_key(key) {
            return Ok(false);
        }
        let Some(mut reader) = self.inner.get(key).await? else {
            return Ok(false);
        };
        let (digest, _) = self.algorithm.digest_reader(&mut reader).await?;
        Ok(digest == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileBlobStore;
    use crate::memory::MemoryBlobStore;

    const COUNTING_SHA1: &str = "5b00669c480d5cffbdfa8bdba99561160f2d1b77";

    fn counting_bytes() -> Vec<u8> {
        (0..1024).map(|i| i as u8).collect()
    }

    async fn read_all(reader: Option<BlobReader>) -> Vec<u8> {
        let mut out = Vec::new();
        reader.unwrap().read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn known_digest_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressableStore::new(FileBlobStore::new(dir.path()));
        let bytes = counting_bytes();

        let key = cas.put(&mut bytes.as_slice()).await.unwrap();
        assert_eq!(key, COUNTING_SHA1);
        assert!(cas.exists(&key).await.unwrap());
        assert_eq!(read_all(cas.get(&key).await.unwrap()).await, bytes);
        assert!(dir.path().join("5b").join(COUNTING_SHA1).is_file());
    }

    #[tokio::test]
    async fn large_payloads_are_spooled_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressableStore::new(FileBlobStore::new(dir.path()));
        let bytes: Vec<u8> = (0..3 * SPOOL_CHUNK + 17).map(|i| (i % 251) as u8).collect();

        let key = cas.put(&mut bytes.as_slice()).await.unwrap();
        assert_eq!(key, DigestAlgorithm::Sha1.digest(&bytes));
        assert_eq!(read_all(cas.get(&key).await.unwrap()).await, bytes);
        assert!(cas.verify(&key).await.unwrap());
    }

    #[tokio::test]
    async fn empty_payload_has_the_empty_digest() {
        let cas = ContentAddressableStore::new(MemoryBlobStore::new());
        let key = cas.put(&mut &b""[..]).await.unwrap();
        assert_eq!(key, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert!(cas.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn identical_content_same_key_across_instances() {
        let first = ContentAddressableStore::new(MemoryBlobStore::new());
        let dir = tempfile::tempdir().unwrap();
        let second = ContentAddressableStore::new(FileBlobStore::new(dir.path()));

        let a = first.put(&mut &b"same bytes"[..]).await.unwrap();
        let b = second.put(&mut &b"same bytes"[..]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[tokio::test]
    async fn repeated_put_is_idempotent() {
        let cas = ContentAddressableStore::new(MemoryBlobStore::new());
        let a = cas.put(&mut &b"payload"[..]).await.unwrap();
        let b = cas.put(&mut &b"payload"[..]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cas.inner().len(), 1);
    }

    #[tokio::test]
    async fn blake3_keys() {
        let cas =
            ContentAddressableStore::with_algorithm(MemoryBlobStore::new(), DigestAlgorithm::Blake3);
        let key = cas.put(&mut counting_bytes().as_slice()).await.unwrap();
        assert_eq!(key.len(), 64);
        assert!(cas.verify(&key).await.unwrap());
    }

    #[tokio::test]
    async fn verify_detects_mismatch() {
        let cas = ContentAddressableStore::new(MemoryBlobStore::new());
        let key = cas.put(&mut &b"genuine"[..]).await.unwrap();
        assert!(cas.verify(&key).await.unwrap());

        let forged = DigestAlgorithm::Sha1.digest(b"something else");
        cas.inner().put(&forged, &mut &b"tampered"[..]).await.unwrap();
        assert!(!cas.verify(&forged).await.unwrap());
        assert!(!cas.verify("not-a-digest").await.unwrap());
        assert!(!cas.verify(COUNTING_SHA1).await.unwrap());
    }

    #[tokio::test]
    async fn delete_delegates() {
        let cas = ContentAddressableStore::new(MemoryBlobStore::new());
        let key = cas.put(&mut &b"short-lived"[..]).await.unwrap();
        cas.delete(&key).await.unwrap();
        assert!(!cas.exists(&key).await.unwrap());
        assert!(cas.get(&key).await.unwrap().is_none());
    }
}
