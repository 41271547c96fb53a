use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pending::{PendingAuthStore, PendingCredential, PendingLookup};
use super::provider::{LoginOutcome, LoginProvider};
use super::secret::Secret;
use super::store::TokenStore;
use crate::error::{BridgeError, Result};
use crate::util::timeout::with_timeout;
use crate::util::Clock;

pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Response to `start`: `{"status":"ok"}` or `{"status":"needs_mfa","mfa_token":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartResponse {
    Ok,
    NeedsMfa { mfa_token: String },
}

/// Response to `finish`: `{"status":"ok"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinishResponse {
    Ok,
}

/// Login state of one user, as observed through the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Pending,
    Authenticated,
}

/// Coordinates the two-phase login against the provider.
///
/// Holds no per-user state of its own: a user is `Pending` while the
/// [`PendingAuthStore`] has a live entry for them and `Authenticated` once
/// the [`TokenStore`] holds a token.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use garmin_bridge::auth::provider::HttpLoginProvider;
/// use garmin_bridge::auth::{AuthOrchestrator, PendingAuthStore, Secret, StartResponse, TokenStore};
/// use garmin_bridge::storage::MemoryBackend;
/// use garmin_bridge::util::SystemClock;
///
/// # async fn example() -> garmin_bridge::error::Result<()> {
/// let clock = Arc::new(SystemClock);
/// let backend = Arc::new(MemoryBackend::new());
/// let auth = AuthOrchestrator::new(
///     Arc::new(HttpLoginProvider::new("http://127.0.0.1:8787")),
///     TokenStore::new(backend.clone(), clock.clone()),
///     Arc::new(PendingAuthStore::new(backend, clock.clone())),
///     clock,
/// );
/// if let StartResponse::NeedsMfa { mfa_token } =
///     auth.start("a@b.com", &Secret::new("pw"), "u1").await?
/// {
///     auth.finish("u1", &Secret::new("123456"), &mfa_token).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct AuthOrchestrator {
    provider: Arc<dyn LoginProvider>,
    tokens: TokenStore,
    pending: Arc<PendingAuthStore>,
    clock: Arc<dyn Clock>,
    pending_ttl: Duration,
    provider_timeout: Duration,
}

impl AuthOrchestrator {
    pub fn new(
        provider: Arc<dyn LoginProvider>,
        tokens: TokenStore,
        pending: Arc<PendingAuthStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            tokens,
            pending,
            clock,
            pending_ttl: DEFAULT_PENDING_TTL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Begin a login with email and password.
    ///
    /// A login that needs no second factor is persisted immediately. One that
    /// does is staged in the pending store and the challenge handle returned.
    pub async fn start(
        &self,
        email: &str,
        password: &Secret,
        user_id: &str,
    ) -> Result<StartResponse> {
        let outcome = with_timeout(self.provider_timeout, self.provider.login(email, password))
            .await
            .map_err(|e| {
                tracing::info!(user_id, error = %e, "primary login failed");
                BridgeError::from(e)
            })?;

        match outcome {
            LoginOutcome::Authenticated { token } => {
                self.persist(user_id, &token).await?;
                self.clear_pending(user_id).await;
                tracing::info!(user_id, "login complete without MFA");
                Ok(StartResponse::Ok)
            }
            LoginOutcome::MfaRequired { mfa_token } => {
                let credential = PendingCredential {
                    user_id: user_id.to_string(),
                    email: email.to_string(),
                    password: password.clone(),
                    mfa_token: mfa_token.clone(),
                    created_at: self.clock.now(),
                };
                self.pending.put(credential, self.pending_ttl).await?;
                tracing::info!(user_id, "login needs MFA");
                Ok(StartResponse::NeedsMfa { mfa_token })
            }
        }
    }

    /// Complete a login that `start` left waiting for an MFA code.
    ///
    /// A wrong code or a mismatched handle leaves the pending entry in place
    /// so the caller can retry until it expires.
    pub async fn finish(
        &self,
        user_id: &str,
        mfa_code: &Secret,
        mfa_token: &str,
    ) -> Result<FinishResponse> {
        let credential = match self.pending.get(user_id).await? {
            PendingLookup::Live(credential) => credential,
            PendingLookup::Expired => {
                tracing::info!(user_id, "MFA attempted after challenge expired");
                return Err(BridgeError::MfaExpired);
            }
            PendingLookup::Absent => {
                tracing::info!(user_id, "MFA attempted with no pending login");
                return Err(BridgeError::MfaUnknown);
            }
        };

        if !constant_time_eq::constant_time_eq(
            credential.mfa_token.as_bytes(),
            mfa_token.as_bytes(),
        ) {
            tracing::info!(user_id, "MFA handle does not match pending login");
            return Err(BridgeError::MfaUnknown);
        }

        let token = with_timeout(
            self.provider_timeout,
            self.provider.complete_mfa(
                &credential.email,
                &credential.password,
                &credential.mfa_token,
                mfa_code,
            ),
        )
        .await
        .map_err(|e| {
            tracing::info!(user_id, error = %e, "MFA completion failed");
            BridgeError::from(e)
        })?;

        self.persist(user_id, &token).await?;
        self.clear_finished_challenge(user_id, &credential.mfa_token).await;
        tracing::info!(user_id, "login complete after MFA");
        Ok(FinishResponse::Ok)
    }

    /// Stored session token, or [`BridgeError::TokenNotFound`] when a fresh
    /// `start`/`finish` cycle is required.
    pub async fn session_token(&self, user_id: &str) -> Result<Secret> {
        self.tokens.get(user_id).await
    }

    pub async fn state(&self, user_id: &str) -> Result<SessionState> {
        if let PendingLookup::Live(_) = self.pending.peek(user_id).await? {
            return Ok(SessionState::Pending);
        }
        if self.tokens.load(user_id).await?.is_some() {
            return Ok(SessionState::Authenticated);
        }
        Ok(SessionState::NoSession)
    }

    /// Forget the stored session and any pending login for `user_id`.
    pub async fn logout(&self, user_id: &str) -> Result<()> {
        self.tokens.clear(user_id).await?;
        self.pending.delete(user_id).await?;
        tracing::info!(user_id, "session cleared");
        Ok(())
    }

    async fn persist(&self, user_id: &str, token: &Secret) -> Result<()> {
        self.tokens.set(user_id, token).await.map_err(|source| {
            tracing::error!(user_id, error = %source, "provider accepted login but token was not saved");
            BridgeError::SessionNotPersisted { source }
        })?;
        Ok(())
    }

    // The session is already saved at this point; a leftover pending entry
    // only lingers until its TTL.
    async fn clear_pending(&self, user_id: &str) {
        if let Err(e) = self.pending.delete(user_id).await {
            tracing::warn!(user_id, error = %e, "failed to clear pending login");
        }
    }

    // A `start` that completed while the provider call was in flight staged
    // a newer challenge; only the one just finished is removed.
    async fn clear_finished_challenge(&self, user_id: &str, mfa_token: &str) {
        if let Err(e) = self.pending.delete_if(user_id, mfa_token).await {
            tracing::warn!(user_id, error = %e, "failed to clear pending login");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::ProviderError;
    use crate::storage::{MemoryBackend, StorageBackend, StorageError};
    use crate::util::ManualClock;
    use async_trait::async_trait;

    struct SlowProvider;

    #[async_trait]
    impl LoginProvider for SlowProvider {
        async fn login(&self, _: &str, _: &Secret) -> std::result::Result<LoginOutcome, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(LoginOutcome::Authenticated {
                token: Secret::new("late"),
            })
        }

        async fn complete_mfa(
            &self,
            _: &str,
            _: &Secret,
            _: &str,
            _: &Secret,
        ) -> std::result::Result<Secret, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Secret::new("late"))
        }
    }

    struct MfaProvider;

    #[async_trait]
    impl LoginProvider for MfaProvider {
        async fn login(&self, _: &str, _: &Secret) -> std::result::Result<LoginOutcome, ProviderError> {
            Ok(LoginOutcome::MfaRequired {
                mfa_token: "T1".to_string(),
            })
        }

        async fn complete_mfa(
            &self,
            _: &str,
            _: &Secret,
            _: &str,
            code: &Secret,
        ) -> std::result::Result<Secret, ProviderError> {
            if code.expose() == "123456" {
                Ok(Secret::new("session"))
            } else {
                Err(ProviderError::InvalidMfaCode)
            }
        }
    }

    /// Memory backend that refuses writes to token keys.
    struct TokenWritesFail(MemoryBackend);

    #[async_trait]
    impl StorageBackend for TokenWritesFail {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn read(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.0.read(key).await
        }

        async fn write(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            if key.starts_with("garmin:tokens:") {
                return Err(StorageError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.0.write(key, value).await
        }

        async fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.0.delete(key).await
        }
    }

    fn orchestrator(
        provider: Arc<dyn LoginProvider>,
        backend: Arc<dyn StorageBackend>,
    ) -> (Arc<PendingAuthStore>, AuthOrchestrator) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let pending = Arc::new(PendingAuthStore::new(backend.clone(), clock.clone()));
        let auth = AuthOrchestrator::new(
            provider,
            TokenStore::new(backend, clock.clone()),
            pending.clone(),
            clock,
        )
        .with_provider_timeout(Duration::from_secs(5));
        (pending, auth)
    }

    #[tokio::test(start_paused = true)]
    async fn provider_timeout_is_unavailable_not_invalid_credentials() {
        let (_pending, auth) = orchestrator(Arc::new(SlowProvider), Arc::new(MemoryBackend::new()));
        let err = auth
            .start("a@b.com", &Secret::new("pw"), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ProviderUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::NoSession);
    }

    #[tokio::test]
    async fn token_save_failure_after_mfa_is_surfaced_and_keeps_pending() {
        let backend = Arc::new(TokenWritesFail(MemoryBackend::new()));
        let (pending, auth) = orchestrator(Arc::new(MfaProvider), backend);

        let started = auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap();
        assert_eq!(
            started,
            StartResponse::NeedsMfa {
                mfa_token: "T1".to_string()
            }
        );

        let err = auth
            .finish("u1", &Secret::new("123456"), "T1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::SessionNotPersisted { .. }));
        assert!(matches!(
            pending.get("u1").await.unwrap(),
            PendingLookup::Live(_)
        ));
    }

    #[tokio::test]
    async fn wrong_code_keeps_pending_for_retry() {
        let (_pending, auth) = orchestrator(Arc::new(MfaProvider), Arc::new(MemoryBackend::new()));
        auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap();

        let err = auth
            .finish("u1", &Secret::new("000000"), "T1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MfaInvalidCode));
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::Pending);

        auth.finish("u1", &Secret::new("123456"), "T1").await.unwrap();
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn logout_clears_session_and_pending() {
        let (_pending, auth) = orchestrator(Arc::new(MfaProvider), Arc::new(MemoryBackend::new()));
        auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap();
        auth.finish("u1", &Secret::new("123456"), "T1").await.unwrap();
        auth.logout("u1").await.unwrap();
        assert!(matches!(
            auth.session_token("u1").await,
            Err(BridgeError::TokenNotFound { .. })
        ));
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::NoSession);
    }

    /// Issues `T1`, `T2`, ... and holds `complete_mfa` until released.
    struct GatedProvider {
        issued: std::sync::atomic::AtomicUsize,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        gate_first: std::sync::atomic::AtomicBool,
    }

    impl GatedProvider {
        fn new() -> Self {
            Self {
                issued: std::sync::atomic::AtomicUsize::new(0),
                entered: tokio::sync::Notify::new(),
                release: tokio::sync::Notify::new(),
                gate_first: std::sync::atomic::AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl LoginProvider for GatedProvider {
        async fn login(&self, _: &str, _: &Secret) -> std::result::Result<LoginOutcome, ProviderError> {
            let n = self
                .issued
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            Ok(LoginOutcome::MfaRequired {
                mfa_token: format!("T{n}"),
            })
        }

        async fn complete_mfa(
            &self,
            _: &str,
            _: &Secret,
            mfa_token: &str,
            _: &Secret,
        ) -> std::result::Result<Secret, ProviderError> {
            if self
                .gate_first
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(Secret::new(format!("session-{mfa_token}")))
        }
    }

    #[tokio::test]
    async fn status_query_does_not_turn_expired_into_unknown() {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::with_clock(shared.clone()));
        let auth = AuthOrchestrator::new(
            Arc::new(MfaProvider),
            TokenStore::new(backend.clone(), shared.clone()),
            Arc::new(PendingAuthStore::new(backend, shared.clone())),
            shared,
        );

        auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap();
        clock.advance_secs(301);
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::NoSession);
        assert_eq!(auth.state("u1").await.unwrap(), SessionState::NoSession);

        let err = auth
            .finish("u1", &Secret::new("123456"), "T1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MfaExpired), "{err:?}");
    }

    #[tokio::test]
    async fn restart_during_mfa_completion_keeps_newer_challenge() {
        let provider = Arc::new(GatedProvider::new());
        let (pending, auth) = orchestrator(provider.clone(), Arc::new(MemoryBackend::new()));
        let auth = Arc::new(auth);

        assert_eq!(
            auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap(),
            StartResponse::NeedsMfa {
                mfa_token: "T1".to_string()
            }
        );

        let first = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.finish("u1", &Secret::new("123456"), "T1").await })
        };
        provider.entered.notified().await;

        assert_eq!(
            auth.start("a@b.com", &Secret::new("pw"), "u1").await.unwrap(),
            StartResponse::NeedsMfa {
                mfa_token: "T2".to_string()
            }
        );
        provider.release.notify_one();
        first.await.unwrap().unwrap();

        match pending.get("u1").await.unwrap() {
            PendingLookup::Live(cred) => assert_eq!(cred.mfa_token, "T2"),
            other => panic!("expected the newer challenge to survive, got {other:?}"),
        }
        auth.finish("u1", &Secret::new("123456"), "T2").await.unwrap();
        assert_eq!(auth.session_token("u1").await.unwrap().expose(), "session-T2");
    }

    #[test]
    fn responses_serialize_to_wire_shapes() {
        assert_eq!(
            serde_json::to_value(StartResponse::Ok).unwrap(),
            serde_json::json!({"status": "ok"})
        );
        assert_eq!(
            serde_json::to_value(StartResponse::NeedsMfa {
                mfa_token: "T1".to_string()
            })
            .unwrap(),
            serde_json::json!({"status": "needs_mfa", "mfa_token": "T1"})
        );
        assert_eq!(
            serde_json::to_value(FinishResponse::Ok).unwrap(),
            serde_json::json!({"status": "ok"})
        );
    }
}
