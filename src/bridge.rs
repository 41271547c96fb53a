//! Assembly of the stores and services from a [`BridgeConfig`].

use std::sync::Arc;

use crate::auth::nonce::NonceResponse;
use crate::auth::provider::{HttpLoginProvider, LoginProvider};
use crate::auth::wallet::{VerifiedWallet, WalletVerifier};
use crate::auth::{AuthOrchestrator, NonceStore, PendingAuthStore, TokenStore};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::storage::{build_backend, StorageBackend};
use crate::util::{Clock, SystemClock};

/// Every service the bridge exposes, sharing one storage backend.
pub struct Bridge {
    auth: AuthOrchestrator,
    nonces: Arc<NonceStore>,
    wallet: WalletVerifier,
    backend: Arc<dyn StorageBackend>,
}

impl Bridge {
    /// Build against the HTTP login gateway named in `config.gateway_url`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let gateway = config.gateway_url.as_deref().ok_or_else(|| {
            BridgeError::Configuration("LOGIN_GATEWAY_URL is not set".to_string())
        })?;
        Self::with_provider(
            config,
            Arc::new(HttpLoginProvider::new(gateway)),
            Arc::new(SystemClock),
        )
    }

    /// Build with an explicit provider and clock.
    pub fn with_provider(
        config: &BridgeConfig,
        provider: Arc<dyn LoginProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let backend = build_backend(&config.storage, clock.clone())?;
        let tokens = TokenStore::new(backend.clone(), clock.clone());
        let pending = Arc::new(PendingAuthStore::new(backend.clone(), clock.clone()));
        let nonces = Arc::new(NonceStore::new(
            backend.clone(),
            clock.clone(),
            config.nonce_ttl,
        ));
        let wallet = WalletVerifier::new(nonces.clone(), clock.clone(), config.wallet.clone());
        let auth = AuthOrchestrator::new(provider, tokens, pending, clock)
            .with_pending_ttl(config.pending_ttl)
            .with_provider_timeout(config.provider_timeout);
        Ok(Self {
            auth,
            nonces,
            wallet,
            backend,
        })
    }

    pub fn auth(&self) -> &AuthOrchestrator {
        &self.auth
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Issue a wallet-login nonce for `address`.
    pub async fn issue_nonce(&self, address: &str) -> Result<NonceResponse> {
        let nonce = self.nonces.generate(address).await?;
        Ok(NonceResponse { nonce })
    }

    /// Verify a signed wallet-login message.
    pub async fn verify_wallet(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<VerifiedWallet> {
        Ok(self.wallet.verify(address, message, signature).await?)
    }
}
