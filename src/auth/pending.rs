use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::secret::Secret;
use crate::storage::{StorageBackend, StorageError};
use crate::util::Clock;

const KEY_PREFIX: &str = "garmin:pending:";

/// Extra time a pending entry is kept physically after its logical expiry,
/// so the first access after expiry can still report it as expired.
const EXPIRED_GRACE: Duration = Duration::from_secs(600);

/// Credentials staged between a login that asked for MFA and its completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCredential {
    pub user_id: String,
    pub email: String,
    pub password: Secret,
    /// Challenge handle issued by the provider.
    pub mfa_token: String,
    pub created_at: DateTime<Utc>,
}

/// Result of looking up a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingLookup {
    Live(PendingCredential),
    /// An entry existed but outlived its TTL. It has been evicted.
    Expired,
    /// Nothing was ever staged, or it was already removed.
    Absent,
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingEntry {
    credential: PendingCredential,
    expires_at: DateTime<Utc>,
}

/// Short-lived user id → [`PendingCredential`] cache.
///
/// At most one entry per user; a new `put` replaces the old one. Expiry is
/// checked lazily on `get`. The internal lock serializes each
/// read-modify-write so concurrent requests for the same user cannot
/// interleave; the last completed `put` wins.
pub struct PendingAuthStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl PendingAuthStore {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Stage `credential`, replacing any entry for the same user.
    pub async fn put(&self, credential: PendingCredential, ttl: Duration) -> Result<(), StorageError> {
        let ttl_chrono = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Backend(format!("ttl out of range: {e}")))?;
        let key = pending_key(&credential.user_id);
        let entry = PendingEntry {
            expires_at: credential.created_at + ttl_chrono,
            credential,
        };
        let serialized = serde_json::to_string(&entry)?;

        let _guard = self.lock.lock().await;
        self.backend
            .write_expiring(&key, &serialized, ttl + EXPIRED_GRACE)
            .await?;
        tracing::debug!(
            user_id = %entry.credential.user_id,
            ttl_secs = ttl.as_secs(),
            "pending login staged"
        );
        Ok(())
    }

    /// Look up the live entry for `user_id`, evicting it if it has expired.
    pub async fn get(&self, user_id: &str) -> Result<PendingLookup, StorageError> {
        let key = pending_key(user_id);
        let _guard = self.lock.lock().await;
        let Some(raw) = self.backend.read(&key).await? else {
            return Ok(PendingLookup::Absent);
        };
        let entry: PendingEntry = serde_json::from_str(&raw)?;
        if self.clock.now() > entry.expires_at {
            self.backend.delete(&key).await?;
            tracing::debug!(user_id, "pending login expired");
            return Ok(PendingLookup::Expired);
        }
        Ok(PendingLookup::Live(entry.credential))
    }

    /// Like [`get`](Self::get) but never evicts; for status queries.
    pub async fn peek(&self, user_id: &str) -> Result<PendingLookup, StorageError> {
        let _guard = self.lock.lock().await;
        let Some(raw) = self.backend.read(&pending_key(user_id)).await? else {
            return Ok(PendingLookup::Absent);
        };
        let entry: PendingEntry = serde_json::from_str(&raw)?;
        if self.clock.now() > entry.expires_at {
            return Ok(PendingLookup::Expired);
        }
        Ok(PendingLookup::Live(entry.credential))
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.backend.delete(&pending_key(user_id)).await
    }

    /// Delete the entry for `user_id` only while it still carries `mfa_token`.
    ///
    /// Returns whether an entry was removed. A newer challenge staged by a
    /// later `put` is left alone.
    pub async fn delete_if(&self, user_id: &str, mfa_token: &str) -> Result<bool, StorageError> {
        let key = pending_key(user_id);
        let _guard = self.lock.lock().await;
        let Some(raw) = self.backend.read(&key).await? else {
            return Ok(false);
        };
        let entry: PendingEntry = serde_json::from_str(&raw)?;
        if entry.credential.mfa_token != mfa_token {
            tracing::debug!(user_id, "pending login was replaced; keeping newer challenge");
            return Ok(false);
        }
        self.backend.delete(&key).await?;
        Ok(true)
    }
}

fn pending_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}
