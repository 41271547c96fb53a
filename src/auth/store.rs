use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::secret::Secret;
use super::token::TokenRecord;
use crate::error::BridgeError;
use crate::storage::{StorageBackend, StorageError};
use crate::util::Clock;

const TOKEN_RECORD_VERSION: u32 = 1;
const KEY_PREFIX: &str = "garmin:tokens:";

/// Persistent user id → session token mapping.
///
/// Entries carry no TTL; they stay valid until a later login replaces them
/// or [`TokenStore::clear`] removes them.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use garmin_bridge::auth::{Secret, TokenStore};
/// use garmin_bridge::storage::FileBackend;
/// use garmin_bridge::util::SystemClock;
///
/// # async fn example() -> garmin_bridge::error::Result<()> {
/// let store = TokenStore::new(
///     Arc::new(FileBackend::new("/var/lib/garmin-bridge")),
///     Arc::new(SystemClock),
/// );
/// store.set("user-1", &Secret::new("opaque-session")).await?;
/// let token = store.get("user-1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    version: u32,
    #[serde(flatten)]
    record: TokenRecord,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Token for `user_id`, or [`BridgeError::TokenNotFound`].
    pub async fn get(&self, user_id: &str) -> Result<Secret, BridgeError> {
        match self.load(user_id).await? {
            Some(record) => Ok(record.token),
            None => Err(BridgeError::TokenNotFound {
                user_id: user_id.to_string(),
            }),
        }
    }

    /// Full record for `user_id`, if any.
    pub async fn load(&self, user_id: &str) -> Result<Option<TokenRecord>, StorageError> {
        let Some(raw) = self.backend.read(&token_key(user_id)).await? else {
            return Ok(None);
        };
        decode_record(user_id, raw).map(Some)
    }

    /// Replace the stored token for `user_id`.
    pub async fn set(&self, user_id: &str, token: &Secret) -> Result<TokenRecord, StorageError> {
        let record = TokenRecord {
            user_id: user_id.to_string(),
            token: token.clone(),
            created_at: self.clock.now(),
        };
        let file = TokenFile {
            version: TOKEN_RECORD_VERSION,
            record,
        };
        let serialized = serde_json::to_string(&file)?;
        self.backend.write(&token_key(user_id), &serialized).await?;
        tracing::debug!(user_id, backend = self.backend.name(), "session token saved");
        Ok(file.record)
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), StorageError> {
        self.backend.delete(&token_key(user_id)).await
    }
}

fn token_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

fn decode_record(user_id: &str, raw: String) -> Result<TokenRecord, StorageError> {
    // Older deployments stored the bare token string.
    if !raw.trim_start().starts_with('{') {
        return Ok(TokenRecord {
            user_id: user_id.to_string(),
            token: Secret::new(raw),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        });
    }
    let file: TokenFile = serde_json::from_str(&raw)?;
    if file.version != TOKEN_RECORD_VERSION {
        return Err(StorageError::Serialization(format!(
            "unsupported token record version {}",
            file.version
        )));
    }
    Ok(file.record)
}
