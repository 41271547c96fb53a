use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{StorageBackend, StorageError};
use crate::auth::secret::Secret;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote key/value backend speaking the Upstash / Vercel KV REST protocol.
///
/// Every operation is one authenticated `POST` whose JSON body is the Redis
/// command, e.g. `["SET", "key", "value", "EX", "300"]`. Transport failures,
/// non-2xx statuses and `{"error": ...}` bodies all surface as errors; only an
/// explicit `{"result": null}` reads as a missing key.
///
/// # Example
/// ```no_run
/// use garmin_bridge::auth::Secret;
/// use garmin_bridge::storage::KvRestBackend;
///
/// let backend = KvRestBackend::new("https://example.upstash.io", Secret::new("token"))?;
/// # Ok::<(), garmin_bridge::storage::StorageError>(())
/// ```
pub struct KvRestBackend {
    client: reqwest::Client,
    url: reqwest::Url,
    token: Secret,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl KvRestBackend {
    pub fn new(url: impl AsRef<str>, token: Secret) -> Result<Self, StorageError> {
        let url = reqwest::Url::parse(url.as_ref())
            .map_err(|e| StorageError::Backend(format!("invalid KV endpoint URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, url, token })
    }

    async fn command(&self, args: &[&str]) -> Result<Value, StorageError> {
        let resp = self
            .client
            .post(self.url.clone())
            .bearer_auth(self.token.expose())
            .json(args)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), command = args[0], "KV command rejected");
            return Err(StorageError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: CommandResponse = resp.json().await?;
        if let Some(error) = payload.error {
            return Err(StorageError::Backend(error));
        }
        Ok(payload.result.unwrap_or(Value::Null))
    }

    fn string_result(value: Value) -> Result<Option<String>, StorageError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(StorageError::Serialization(format!(
                "expected string result, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl StorageBackend for KvRestBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::string_result(self.command(&["GET", key]).await?)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.command(&["SET", key, value]).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.command(&["DEL", key]).await?;
        Ok(())
    }

    async fn write_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let secs = ttl.as_secs().max(1).to_string();
        self.command(&["SET", key, value, "EX", &secs]).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::string_result(self.command(&["GETDEL", key]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_result_maps_null_to_none() {
        assert!(KvRestBackend::string_result(Value::Null).unwrap().is_none());
        assert_eq!(
            KvRestBackend::string_result(Value::String("v".to_string()))
                .unwrap()
                .as_deref(),
            Some("v")
        );
        assert!(matches!(
            KvRestBackend::string_result(Value::from(3)),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn new_rejects_relative_url() {
        assert!(KvRestBackend::new("/just/a/path", Secret::new("t")).is_err());
    }
}
