//! Filesystem blob store.
//!
//! Layout: `root/<key[0..2]>/<key>`. Writes go to `<key>.<5 hex>.tmp` in the
//! same shard directory and are committed by hard-linking the temp file to
//! the final path, which fails instead of replacing a blob another writer
//! already committed. A blob is therefore either absent or complete, and the
//! first committed content wins across processes. Concurrent puts of one key
//! inside this process share a single write.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rand::Rng;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::BlobStoreConfig;
use crate::error::{BlobError, BlobResult};
use crate::traits::{is_addressable, BlobReader, BlobStore};

const TEMP_EXTENSION: &str = "tmp";
const TEMP_SUFFIX_LEN: usize = 5;
const TEMP_ATTEMPTS: usize = 8;

type InFlight = Arc<OnceCell<BlobResult<String>>>;

/// Shared write for one key and the number of puts waiting on it.
struct Slot {
    cell: InFlight,
    holders: usize,
}

type InFlightMap = Mutex<HashMap<String, Slot>>;

/// Sharded, write-once blob store on the local filesystem.
pub struct FileBlobStore {
    root: PathBuf,
    in_flight: InFlightMap,
}

impl FileBlobStore {
    /// Create a store rooted at `root`. Nothing is created until the first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BlobStoreConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of the blob for `key`, or `None` if the key is not
    /// addressable.
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        if !is_addressable(key) {
            return None;
        }
        let shard: String = key.chars().take(2).collect();
        Some(self.root.join(shard).join(key))
    }

    /// Number of keys with a put currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().expect("lock poisoned").len()
    }

    /// Remove temp files older than `older_than` left behind by abandoned
    /// puts. Temp files of writes in progress in this process are kept.
    /// Returns the number of files removed.
    pub async fn scavenge(&self, older_than: Duration) -> BlobResult<usize> {
        let root = self.root.clone();
        let busy: HashSet<String> = self
            .in_flight
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, slot)| !slot.cell.initialized())
            .map(|(key, _)| key.clone())
            .collect();

        let removed =
            tokio::task::spawn_blocking(move || remove_stale_temps(&root, older_than, &busy))
                .await
                .map_err(io::Error::other)??;
        if removed > 0 {
            info!(root = %self.root.display(), removed, "scavenged stale temp files");
        }
        Ok(removed)
    }

    /// Join (or start) the in-flight write for `key`.
    fn claim<'a>(&'a self, key: &'a str) -> InFlightGuard<'a> {
        let mut in_flight = self.in_flight.lock().expect("lock poisoned");
        let slot = in_flight.entry(key.to_owned()).or_insert_with(|| Slot {
            cell: InFlight::default(),
            holders: 0,
        });
        slot.holders += 1;
        InFlightGuard {
            in_flight: &self.in_flight,
            key,
            cell: Arc::clone(&slot.cell),
        }
    }

    /// Copy `input` to a temp file beside `path`, then commit it.
    async fn write_blob(
        &self,
        key: &str,
        path: &Path,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<String> {
        let shard = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(shard).await?;

        let (temp, mut file) = create_temp(shard, || temp_file_name(key)).await?;
        let written = match copy_into(&mut file, input).await {
            Ok(written) => written,
            Err(err) => {
                drop(file);
                discard(&temp).await;
                return Err(err.into());
            }
        };
        drop(file);

        if is_file(path).await.unwrap_or(false) {
            debug!(key, "blob committed by a competing writer");
            discard(&temp).await;
            return Ok(key.to_owned());
        }

        match commit(&temp, path).await {
            Ok(()) => {
                debug!(key, bytes = written, "blob committed");
                Ok(key.to_owned())
            }
            Err(err) if is_lost_race(&err) => {
                debug!(key, error = %err, "lost commit race");
                discard(&temp).await;
                Ok(key.to_owned())
            }
            Err(err) => {
                discard(&temp).await;
                if is_file(path).await.unwrap_or(false) {
                    warn!(key, error = %err, "commit failed but blob is present");
                    Ok(key.to_owned())
                } else {
                    warn!(key, error = %err, "blob commit failed");
                    Err(BlobError::CommitFailed {
                        key: key.to_owned(),
                        source: Arc::new(err),
                    })
                }
            }
        }
    }
}

/// Membership in a key's in-flight write. Dropping the last guard for a key
/// removes its entry, also when the put is abandoned mid-write.
struct InFlightGuard<'a> {
    in_flight: &'a InFlightMap,
    key: &'a str,
    cell: InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(slot) = in_flight.get_mut(self.key) else {
            return;
        };
        if !Arc::ptr_eq(&slot.cell, &self.cell) {
            return;
        }
        slot.holders -= 1;
        if slot.holders == 0 {
            in_flight.remove(self.key);
        }
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn exists(&self, key: &str) -> BlobResult<bool> {
        match self.path_for(key) {
            Some(path) => is_file(&path).await,
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> BlobResult<Option<BlobReader>> {
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(
        &self,
        key: &str,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<String> {
        let Some(path) = self.path_for(key) else {
            return Err(BlobError::InvalidKey(key.to_owned()));
        };
        if is_file(&path).await? {
            debug!(key, "blob already stored");
            return Ok(key.to_owned());
        }

        let guard = self.claim(key);
        let result = guard
            .cell
            .get_or_init(|| self.write_blob(key, &path, input))
            .await
            .clone();
        drop(guard);
        result
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let Some(path) = self.path_for(key) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "blob deleted");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_all(&self) -> BlobResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!(root = %self.root.display(), "blob store cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for FileBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlobStore")
            .field("root", &self.root)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn temp_file_name(key: &str) -> String {
    let mut bytes = [0u8; 3];
    rand::thread_rng().fill(&mut bytes);
    let suffix = hex::encode(bytes);
    format!("{key}.{}.{TEMP_EXTENSION}", &suffix[..TEMP_SUFFIX_LEN])
}

/// The key a temp file belongs to, if `name` has the temp file shape.
fn temp_owner(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(TEMP_EXTENSION)?.strip_suffix('.')?;
    let (key, suffix) = stem.rsplit_once('.')?;
    let is_suffix = suffix.len() == TEMP_SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    (is_suffix && !key.is_empty()).then_some(key)
}

/// Create a fresh temp file in `shard`. A name already taken belongs to
/// another writer and is left alone; the next candidate is tried instead.
async fn create_temp(
    shard: &Path,
    mut next_name: impl FnMut() -> String,
) -> io::Result<(PathBuf, fs::File)> {
    for _ in 0..TEMP_ATTEMPTS {
        let temp = shard.join(next_name());
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await
        {
            Ok(file) => return Ok((temp, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %temp.display(), "temp name in use");
            }
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free temp name after {TEMP_ATTEMPTS} attempts"),
    ))
}

async fn copy_into(
    file: &mut fs::File,
    input: &mut (dyn AsyncRead + Unpin + Send),
) -> io::Result<u64> {
    let written = tokio::io::copy(input, file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Publish `temp` at `path` without replacing an existing file.
///
/// A hard link fails with `AlreadyExists` when `path` is taken. Filesystems
/// without hard links fall back to a rename, which can replace a blob that
/// another process committed in the same instant.
async fn commit(temp: &Path, path: &Path) -> io::Result<()> {
    match fs::hard_link(temp, path).await {
        Ok(()) => {
            discard(temp).await;
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(err),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "hard link unavailable, renaming");
            fs::rename(temp, path).await
        }
    }
}

async fn is_file(path: &Path) -> BlobResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn is_lost_race(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
    )
}

/// Best-effort temp file removal.
async fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp).await {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %err, "failed to remove temp file");
        }
    }
}

fn remove_stale_temps(
    root: &Path,
    older_than: Duration,
    busy: &HashSet<String>,
) -> io::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(owner) = temp_owner(&name) else {
            continue;
        };
        if busy.contains(owner) {
            continue;
        }
        let stale = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age >= older_than);
        if !stale {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "removed stale temp file");
                removed += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "failed to remove stale temp file");
            }
        }
    }
    Ok(removed)
}
