//! Configuration loaded from the process environment and TOML files.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use garmin_bridge::config::BridgeConfig;
use garmin_bridge::error::BridgeError;
use garmin_bridge::storage::{BackendKind, StorageConfig};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 12] = [
    "STORAGE_BACKEND",
    "TOKEN_STORE_DIR",
    "UPSTASH_REDIS_REST_URL",
    "UPSTASH_REDIS_REST_TOKEN",
    "KV_REST_API_URL",
    "KV_REST_API_TOKEN",
    "AUTH_PENDING_TTL_SECONDS",
    "AUTH_NONCE_TTL_SECONDS",
    "PROVIDER_TIMEOUT_SECONDS",
    "AUTH_ALLOWED_ORIGINS",
    "AUTH_MAX_AGE_SECONDS",
    "LOGIN_GATEWAY_URL",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    /// Snapshot every config variable and clear it for the test.
    fn clean() -> Self {
        let saved = CONFIG_ENV_VARS
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        for key in CONFIG_ENV_VARS {
            std::env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn empty_environment_yields_defaults() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();

    let config = BridgeConfig::from_env().unwrap();
    assert_eq!(config, BridgeConfig::default());
}

#[test]
fn environment_selects_filesystem_backend() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();
    std::env::set_var("STORAGE_BACKEND", "filesystem");
    std::env::set_var("TOKEN_STORE_DIR", "/srv/garmin");
    std::env::set_var("AUTH_PENDING_TTL_SECONDS", "120");
    std::env::set_var("LOGIN_GATEWAY_URL", "http://gateway:8787");

    let config = BridgeConfig::from_env().unwrap();
    assert_eq!(
        config.storage,
        StorageConfig::Filesystem {
            dir: PathBuf::from("/srv/garmin")
        }
    );
    assert_eq!(config.pending_ttl, Duration::from_secs(120));
    assert_eq!(config.gateway_url.as_deref(), Some("http://gateway:8787"));
}

#[test]
fn kv_credentials_auto_select_remote_backend() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();
    std::env::set_var("UPSTASH_REDIS_REST_URL", "https://eu1.upstash.io");
    std::env::set_var("UPSTASH_REDIS_REST_TOKEN", "secret");

    let config = BridgeConfig::from_env().unwrap();
    assert_eq!(config.storage.kind(), BackendKind::Remote);
    assert!(config.storage.is_durable());
}

#[test]
fn half_configured_remote_is_rejected() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();
    std::env::set_var("STORAGE_BACKEND", "remote");
    std::env::set_var("KV_REST_API_URL", "https://kv.example");

    let err = BridgeConfig::from_env().unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn environment_overrides_config_file() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.toml");
    std::fs::write(
        &path,
        "nonce_ttl = 60\nprovider_timeout = 10\n\n[storage]\nbackend = \"remote\"\nurl = \"https://file.example\"\ntoken = \"file-token\"\n",
    )
    .unwrap();
    std::env::set_var("PROVIDER_TIMEOUT_SECONDS", "15");

    let config = BridgeConfig::load(Some(&path)).unwrap();
    assert_eq!(config.nonce_ttl, Duration::from_secs(60));
    assert_eq!(config.provider_timeout, Duration::from_secs(15));
    match &config.storage {
        StorageConfig::Remote { url, token } => {
            assert_eq!(url, "https://file.example");
            assert_eq!(token.expose(), "file-token");
        }
        other => panic!("expected remote storage, got {other:?}"),
    }
}

#[test]
fn missing_config_file_is_a_configuration_error() {
    let _lock = env_lock_guard();
    let _env = EnvGuard::clean();
    let err = BridgeConfig::load(Some(std::path::Path::new("/nonexistent/bridge.toml")))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[test]
fn storage_secret_is_not_printed_in_debug() {
    let config = BridgeConfig::builder()
        .storage(StorageConfig::Remote {
            url: "https://kv.example".to_string(),
            token: "very-secret".into(),
        })
        .build();
    assert!(!format!("{config:?}").contains("very-secret"));
}
