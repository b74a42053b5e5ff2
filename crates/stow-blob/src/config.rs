use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::DigestAlgorithm;

/// Configuration for a file-backed blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Storage root. Shard directories are created beneath it on demand.
    pub root: PathBuf,
    /// Digest used for content-addressed keys.
    pub digest: DigestAlgorithm,
    /// Age after which an orphaned temp file is considered stale.
    pub stale_temp_after_secs: u64,
}

impl BlobStoreConfig {
    pub fn stale_temp_after(&self) -> Duration {
        Duration::from_secs(self.stale_temp_after_secs)
    }
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("Blobs"),
            digest: DigestAlgorithm::Sha1,
            stale_temp_after_secs: 3600,
        }
    }
}
