//! Configuration system (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::auth::secret::Secret;
use crate::auth::service::{DEFAULT_PENDING_TTL, DEFAULT_PROVIDER_TIMEOUT};
use crate::auth::wallet::{WalletConfig, DEFAULT_MAX_AGE};
use crate::error::{BridgeError, Result};
use crate::storage::{BackendKind, FileBackend, StorageConfig};

pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);

/// Runtime configuration for the bridge.
///
/// ```
/// use std::time::Duration;
/// use garmin_bridge::config::BridgeConfig;
///
/// let config = BridgeConfig::builder()
///     .pending_ttl(Duration::from_secs(120))
///     .gateway_url("http://127.0.0.1:8787".to_string())
///     .build();
/// assert_eq!(config.nonce_ttl, Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Lifetime of a staged MFA login.
    #[builder(default = DEFAULT_PENDING_TTL)]
    #[serde(with = "duration_secs")]
    pub pending_ttl: Duration,
    /// Lifetime of a wallet-login nonce.
    #[builder(default = DEFAULT_NONCE_TTL)]
    #[serde(with = "duration_secs")]
    pub nonce_ttl: Duration,
    /// Bound on each provider round trip.
    #[builder(default = DEFAULT_PROVIDER_TIMEOUT)]
    #[serde(with = "duration_secs")]
    pub provider_timeout: Duration,
    #[builder(default)]
    pub storage: StorageConfig,
    #[builder(default)]
    pub wallet: WalletConfig,
    /// Base URL of the login gateway the HTTP provider talks to.
    pub gateway_url: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BridgeConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| BridgeError::Configuration(format!("invalid config: {e}")))
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(&|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay settings found through `lookup` (an environment accessor).
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = var("AUTH_PENDING_TTL_SECONDS") {
            self.pending_ttl = parse_secs(&raw, DEFAULT_PENDING_TTL);
        }
        if let Some(raw) = var("AUTH_NONCE_TTL_SECONDS") {
            self.nonce_ttl = parse_secs(&raw, DEFAULT_NONCE_TTL);
        }
        if let Some(raw) = var("PROVIDER_TIMEOUT_SECONDS") {
            self.provider_timeout = parse_secs(&raw, DEFAULT_PROVIDER_TIMEOUT);
        }
        if let Some(raw) = var("AUTH_MAX_AGE_SECONDS") {
            self.wallet.max_age = parse_secs(&raw, DEFAULT_MAX_AGE);
        }
        if let Some(raw) = var("AUTH_ALLOWED_ORIGINS") {
            self.wallet.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = var("LOGIN_GATEWAY_URL") {
            self.gateway_url = Some(url);
        }

        let remote_url = var("UPSTASH_REDIS_REST_URL").or_else(|| var("KV_REST_API_URL"));
        let remote_token = var("UPSTASH_REDIS_REST_TOKEN").or_else(|| var("KV_REST_API_TOKEN"));
        let store_dir = var("TOKEN_STORE_DIR").map(PathBuf::from);

        let requested = match var("STORAGE_BACKEND") {
            Some(raw) => Some(BackendKind::from_str(&raw.to_ascii_lowercase()).map_err(|_| {
                BridgeError::Configuration(format!(
                    "STORAGE_BACKEND must be memory, filesystem or remote (got {raw:?})"
                ))
            })?),
            None if remote_url.is_some() && remote_token.is_some() => Some(BackendKind::Remote),
            None if store_dir.is_some() => Some(BackendKind::Filesystem),
            None => None,
        };

        match requested {
            Some(BackendKind::Memory) => self.storage = StorageConfig::Memory,
            Some(BackendKind::Filesystem) => {
                let dir = match (store_dir, &self.storage) {
                    (Some(dir), _) => dir,
                    (None, StorageConfig::Filesystem { dir }) => dir.clone(),
                    (None, _) => FileBackend::default_dir(),
                };
                self.storage = StorageConfig::Filesystem { dir };
            }
            Some(BackendKind::Remote) => {
                let (url, token) = match (remote_url, remote_token, &self.storage) {
                    (Some(url), Some(token), _) => (url, Secret::new(token)),
                    (None, None, StorageConfig::Remote { url, token }) => {
                        (url.clone(), token.clone())
                    }
                    _ => {
                        return Err(BridgeError::Configuration(
                            "remote storage needs UPSTASH_REDIS_REST_URL and UPSTASH_REDIS_REST_TOKEN (or KV_REST_API_URL and KV_REST_API_TOKEN)".to_string(),
                        ))
                    }
                };
                self.storage = StorageConfig::Remote { url, token };
            }
            None => {}
        }
        Ok(())
    }
}

/// Whole seconds, never below one. Unparseable or zero values use `default`.
fn parse_secs(raw: &str, default: Duration) -> Duration {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            tracing::warn!(value = raw, "invalid duration setting, using default");
            default
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole seconds (minimum one).
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs.max(1)))
    }
}
