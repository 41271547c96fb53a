//! Key/value storage backends shared by the token, pending-credential and
//! nonce stores.
//!
//! One backend is chosen at startup from [`StorageConfig`] and handed around
//! as an `Arc<dyn StorageBackend>`; business logic never branches on which
//! variant it got.

pub mod filesystem;
pub mod memory;
pub mod remote;

pub use filesystem::FileBackend;
pub use memory::MemoryBackend;
pub use remote::KvRestBackend;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::auth::secret::Secret;
use crate::error::BridgeError;
use crate::util::Clock;

/// Failures raised by a storage backend.
///
/// A missing key is not an error; reads return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Backend(format!("storage task failed: {error}"))
    }
}

/// Uniform read/write/delete capability over opaque string values.
///
/// Every backend must return exactly what was written for a key until that
/// key is written again or deleted.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Write with a hint that the backend may physically drop the entry
    /// after `ttl`. Callers still enforce their own logical expiry.
    async fn write_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let _ = ttl;
        self.write(key, value).await
    }

    /// Read a key and remove it.
    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self.read(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }
}

/// Which backend variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Filesystem,
    Remote,
}

/// Backend selection plus its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory,
    Filesystem { dir: PathBuf },
    Remote { url: String, token: Secret },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl StorageConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory => BackendKind::Memory,
            Self::Filesystem { .. } => BackendKind::Filesystem,
            Self::Remote { .. } => BackendKind::Remote,
        }
    }

    /// Whether entries outlive the process.
    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// Build the configured backend.
pub fn build_backend(
    config: &StorageConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn StorageBackend>, BridgeError> {
    let backend: Arc<dyn StorageBackend> = match config {
        StorageConfig::Memory => {
            tracing::warn!(
                "using in-memory storage; sessions, pending logins and nonces are lost on restart and not shared between instances"
            );
            Arc::new(MemoryBackend::with_clock(clock))
        }
        StorageConfig::Filesystem { dir } => {
            Arc::new(FileBackend::with_clock(dir.clone(), clock))
        }
        StorageConfig::Remote { url, token } => Arc::new(
            KvRestBackend::new(url.clone(), token.clone())
                .map_err(|e| BridgeError::Configuration(e.to_string()))?,
        ),
    };
    tracing::info!(backend = backend.name(), "storage backend ready");
    Ok(backend)
}
