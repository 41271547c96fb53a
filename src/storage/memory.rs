use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::{StorageBackend, StorageError};
use crate::util::{Clock, SystemClock};

/// Process-local backend.
///
/// Nothing survives a restart and nothing is shared with other instances of
/// the service. It exists as the fallback when no durable backend is set up.
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

struct MemoryEntry {
    value: String,
    evict_at: Option<DateTime<Utc>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries physically held, including ones past their hint.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose eviction hint has passed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(now));
        before - entries.len()
    }

    /// Periodically purge entries past their eviction hint.
    ///
    /// Only bounds memory held by abandoned entries; reads already ignore them.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "memory backend sweep");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, key: &str, value: &str, evict_at: Option<DateTime<Utc>>) {
        self.lock().insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                evict_at,
            },
        );
    }
}

impl MemoryEntry {
    fn is_evictable(&self, now: DateTime<Utc>) -> bool {
        self.evict_at.is_some_and(|at| at <= now)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_evictable(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.remove(key);
        Ok(None)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert(key, value, None);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn write_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Backend(format!("ttl out of range: {e}")))?;
        self.insert(key, value, Some(self.clock.now() + ttl));
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = self.clock.now();
        let removed = self.lock().remove(key);
        Ok(removed
            .filter(|entry| !entry.is_evictable(now))
            .map(|entry| entry.value))
    }
}
