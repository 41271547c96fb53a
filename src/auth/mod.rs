//! Two-phase login, session persistence and wallet-signature login.

pub mod nonce;
pub mod pending;
pub mod provider;
pub mod secret;
pub mod service;
pub mod store;
pub mod token;
pub mod wallet;

pub use nonce::{NonceRecord, NonceResponse, NonceStore};
pub use pending::{PendingAuthStore, PendingCredential, PendingLookup};
pub use provider::{HttpLoginProvider, LoginOutcome, LoginProvider, ProviderError};
pub use secret::Secret;
pub use service::{AuthOrchestrator, FinishResponse, SessionState, StartResponse};
pub use store::TokenStore;
pub use token::TokenRecord;
pub use wallet::{VerifiedWallet, WalletConfig, WalletError, WalletVerifier};
