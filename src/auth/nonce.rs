use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::storage::{StorageBackend, StorageError};
use crate::util::Clock;

const KEY_PREFIX: &str = "auth:nonce:";
const NONCE_BYTES: usize = 32;

/// A nonce issued to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub address: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Body returned when a nonce is issued: `{"nonce":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// Short-lived, single-use address → nonce cache for signature logins.
///
/// Any `verify` call that finds an entry consumes it, whether or not the
/// candidate matched, so a nonce can never be guessed at repeatedly.
///
/// Backed by the in-memory backend when no durable backend is configured;
/// nonces are then not shared between service instances.
pub struct NonceStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    lock: Mutex<()>,
}

impl NonceStore {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            ttl,
            lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh nonce for `address`, replacing any earlier one.
    pub async fn generate(&self, address: &str) -> Result<String, StorageError> {
        let address = normalize_address(address);
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| StorageError::Backend(format!("ttl out of range: {e}")))?;
        let record = NonceRecord {
            nonce: random_nonce(),
            address,
            created_at: now,
            expires_at: now + ttl,
        };
        let serialized = serde_json::to_string(&record)?;

        let _guard = self.lock.lock().await;
        self.backend
            .write_expiring(&nonce_key(&record.address), &serialized, self.ttl)
            .await?;
        tracing::debug!(address = %record.address, "nonce issued");
        Ok(record.nonce)
    }

    /// Check `candidate` against the live nonce for `address`, consuming it.
    pub async fn verify(&self, address: &str, candidate: &str) -> Result<bool, StorageError> {
        let address = normalize_address(address);
        let _guard = self.lock.lock().await;
        let Some(raw) = self.backend.take(&nonce_key(&address)).await? else {
            return Ok(false);
        };
        let record: NonceRecord = serde_json::from_str(&raw)?;
        if self.clock.now() > record.expires_at {
            tracing::debug!(address = %address, "nonce expired");
            return Ok(false);
        }
        let valid = constant_time_eq::constant_time_eq(record.nonce.as_bytes(), candidate.as_bytes());
        if !valid {
            tracing::debug!(address = %address, "nonce mismatch");
        }
        Ok(valid)
    }
}

/// Addresses are compared case-insensitively.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn nonce_key(address: &str) -> String {
    format!("{KEY_PREFIX}{address}")
}

/// 256 random bits, base64url without padding (43 characters).
fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
