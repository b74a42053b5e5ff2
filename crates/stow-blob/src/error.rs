use std::io;
use std::sync::Arc;

/// Errors from blob store operations.
///
/// Cloneable so that every caller sharing one in-flight write receives the
/// same outcome.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BlobError {
    /// The key cannot be mapped to a storage location.
    #[error("invalid blob key {0:?}")]
    InvalidKey(String),

    /// I/O error while reading input or touching the filesystem.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Publishing the temp file failed for a reason other than a lost race,
    /// and no competing writer left a blob behind.
    #[error("commit of blob {key} failed: {source}")]
    CommitFailed {
        key: String,
        #[source]
        source: Arc<io::Error>,
    },
}

impl From<io::Error> for BlobError {
    fn from(err: io::Error) -> Self {
        BlobError::Io(Arc::new(err))
    }
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;
