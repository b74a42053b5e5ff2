//! Blob storage for Stow.
//!
//! A [`BlobStore`] maps string keys to immutable byte streams. The
//! [`FileBlobStore`] lays blobs out as `root/<key[0..2]>/<key>` and commits
//! each write through a temp file that is linked into place without replacing
//! an existing blob, collapsing concurrent writes of one key into a single
//! write. [`ContentAddressableStore`] derives
//! keys from a content digest.

pub mod cas;
pub mod config;
pub mod digest;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use cas::ContentAddressableStore;
pub use config::BlobStoreConfig;
pub use digest::{ContentDigest, DigestAlgorithm};
pub use error::{BlobError, BlobResult};
pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
pub use traits::{is_addressable, BlobReader, BlobStore, MIN_KEY_LEN};
