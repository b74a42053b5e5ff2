use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::BlobResult;

/// Readable handle to stored blob content.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Minimum key length a blob store can address.
pub const MIN_KEY_LEN: usize = 2;

/// Whether `key` can name a blob: at least [`MIN_KEY_LEN`] characters, no
/// path separators, and no leading `..` (which would make a parent-directory
/// shard).
pub fn is_addressable(key: &str) -> bool {
    key.chars().count() >= MIN_KEY_LEN
        && !key.contains(['/', '\\', '\0'])
        && !key.starts_with("..")
}

/// Write-once blob storage.
///
/// All implementations must satisfy these invariants:
/// - Keys that are not [addressable](is_addressable) read as absent, and
///   `put` rejects them without side effects.
/// - The first successful writer of a key wins. Later puts of the same key
///   return the key without reading their input.
/// - `put` reads its input but never closes or rewinds it; the caller keeps
///   ownership.
/// - Absence is never an error for `exists`, `get`, or `delete`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether a blob is stored under `key`.
    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Open the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> BlobResult<Option<BlobReader>>;

    /// Store the content of `input` under `key` and return the key.
    async fn put(&self, key: &str, input: &mut (dyn AsyncRead + Unpin + Send))
        -> BlobResult<String>;

    /// Remove the blob under `key`. Missing blobs are not an error.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Remove every blob. Destructive; intended for resets and tests.
    async fn delete_all(&self) -> BlobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_are_not_addressable() {
        assert!(!is_addressable(""));
        assert!(!is_addressable("a"));
        assert!(!is_addressable("é"));
        assert!(is_addressable("ab"));
        assert!(is_addressable("éa"));
    }

    #[test]
    fn path_like_keys_are_not_addressable() {
        assert!(!is_addressable("a/b"));
        assert!(!is_addressable("a\\b"));
        assert!(!is_addressable(".."));
        assert!(!is_addressable("..abc"));
        assert!(!is_addressable("ab\0"));
        assert!(is_addressable("a.b"));
    }
}
