use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{StorageBackend, StorageError};
use crate::util::{Clock, SystemClock};

const MAX_LABEL_LEN: usize = 64;
const ENTRY_EXTENSION: &str = "entry";
const TEMP_SUFFIX: &str = ".tmp";

/// One file per key under a directory.
///
/// Keys are mapped to sanitized file names. Writes land in a temp file that
/// is synced and then renamed over the target, so concurrent writers to the
/// same key leave one complete value behind, never a mix. Files are created
/// owner-only (0600).
///
/// Each file holds a small JSON envelope with the value and, for
/// [`write_expiring`](StorageBackend::write_expiring), the eviction hint.
/// Reads drop entries past their hint. Entries that are never read again
/// (abandoned pending logins, which include the password) stay on disk until
/// [`purge_expired`](FileBackend::purge_expired) runs.
///
/// # Example
/// ```no_run
/// use garmin_bridge::storage::{FileBackend, StorageBackend};
///
/// # async fn example() -> Result<(), garmin_bridge::storage::StorageError> {
/// let backend = FileBackend::new("/var/lib/garmin-bridge");
/// backend.write("garmin:tokens:u1", "opaque").await?;
/// assert_eq!(backend.read("garmin:tokens:u1").await?.as_deref(), Some("opaque"));
/// backend.purge_expired().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FileBackend {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evict_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    fn is_evictable(&self, now: DateTime<Utc>) -> bool {
        self.evict_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend").field("dir", &self.dir).finish()
    }
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    /// `~/.garmin-bridge/store`, or `.garmin-bridge/store` without a home directory.
    pub fn default_dir() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".garmin-bridge"))
            .unwrap_or_else(|| PathBuf::from(".garmin-bridge"))
            .join("store")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(entry_file_name(key))
    }

    /// Delete every entry whose eviction hint has passed. Returns how many were deleted.
    pub async fn purge_expired(&self) -> Result<usize, StorageError> {
        let dir = self.dir.clone();
        let now = self.clock.now();
        let purged = tokio::task::spawn_blocking(move || purge_dir(&dir, now)).await??;
        if purged > 0 {
            tracing::debug!(purged, "filesystem backend sweep");
        }
        Ok(purged)
    }

    async fn store(&self, key: &str, entry: FileEntry) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        let data = serde_json::to_vec(&entry)?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &data)).await?
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key);
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || {
            let Some(entry) = read_entry(&path)? else {
                return Ok(None);
            };
            if entry.is_evictable(now) {
                remove_if_present(&path)?;
                return Ok(None);
            }
            Ok(Some(entry.value))
        })
        .await?
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.store(
            key,
            FileEntry {
                value: value.to_string(),
                evict_at: None,
            },
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        tokio::task::spawn_blocking(move || remove_if_present(&path)).await?
    }

    async fn write_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Backend(format!("ttl out of range: {e}")))?;
        self.store(
            key,
            FileEntry {
                value: value.to_string(),
                evict_at: Some(self.clock.now() + ttl),
            },
        )
        .await
    }
}

fn read_entry(path: &Path) -> Result<Option<FileEntry>, StorageError> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn purge_dir(dir: &Path, now: DateTime<Utc>) -> Result<usize, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut purged = 0;
    for dir_entry in entries {
        let path = dir_entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        // Unreadable or foreign files are left for an operator to inspect.
        let Ok(Some(entry)) = read_entry(&path) else {
            continue;
        };
        if entry.is_evictable(now) {
            remove_if_present(&path)?;
            purged += 1;
        }
    }
    Ok(purged)
}

fn entry_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let suffix: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{suffix}.{ENTRY_EXTENSION}", normalize_label(key))
}

fn normalize_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_LABEL_LEN));
    for ch in value.trim().chars().take(MAX_LABEL_LEN) {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "entry".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write `data` to a uniquely named owner-only temp file beside `path`,
/// sync it, then rename it into place. The temp file is removed on any failure.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".entry-")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::from(e.error))?;
    Ok(())
}
