//! Error types for the bridge.

pub mod unified;

pub use unified::{ErrorCategory, ErrorCode, ErrorResponse, RecoverySuggestion};

use thiserror::Error;

use crate::auth::provider::ProviderError;
use crate::auth::wallet::WalletError;
use crate::storage::StorageError;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid MFA code")]
    MfaInvalidCode,

    #[error("MFA challenge expired")]
    MfaExpired,

    #[error("Unknown MFA challenge")]
    MfaUnknown,

    #[error("No stored session for user {user_id}")]
    TokenNotFound { user_id: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider accepted the login but the session token could not be saved.
    #[error("Login succeeded but the session was not persisted: {source}")]
    SessionNotPersisted {
        #[source]
        source: StorageError,
    },

    /// A signed wallet login failed verification. `reason` is the stable code.
    #[error("Wallet login rejected: {reason}")]
    WalletRejected { reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A response could not be rendered.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<WalletError> for BridgeError {
    fn from(error: WalletError) -> Self {
        match error {
            WalletError::Storage(source) => Self::StorageUnavailable(source),
            other => Self::WalletRejected {
                reason: other.reason(),
            },
        }
    }
}

impl From<ProviderError> for BridgeError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            ProviderError::InvalidMfaCode => Self::MfaInvalidCode,
            ProviderError::Unavailable(message) => Self::ProviderUnavailable(message),
        }
    }
}

impl BridgeError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials | Self::MfaInvalidCode | Self::WalletRejected { .. } => {
                ErrorCategory::Credentials
            }
            Self::MfaExpired | Self::MfaUnknown => ErrorCategory::Challenge,
            Self::TokenNotFound { .. } => ErrorCategory::Session,
            Self::StorageUnavailable(_) | Self::SessionNotPersisted { .. } => {
                ErrorCategory::Storage
            }
            Self::ProviderUnavailable(_) => ErrorCategory::Provider,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the caller may retry the same request without changing it.
    ///
    /// Infrastructure failures are retryable; caller-caused failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Storage | ErrorCategory::Provider
        )
    }

    /// Machine-readable code for responses.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::MfaInvalidCode => ErrorCode::MfaInvalidCode,
            Self::MfaExpired => ErrorCode::MfaExpired,
            Self::MfaUnknown => ErrorCode::MfaUnknown,
            Self::TokenNotFound { .. } => ErrorCode::TokenNotFound,
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Self::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            Self::SessionNotPersisted { .. } => ErrorCode::SessionNotPersisted,
            Self::WalletRejected { .. } => ErrorCode::WalletRejected,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Serialization(_) => ErrorCode::Serialization,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::InvalidCredentials => RecoverySuggestion::CheckCredentials,
            Self::MfaInvalidCode => RecoverySuggestion::ReenterCode,
            Self::MfaExpired
            | Self::MfaUnknown
            | Self::TokenNotFound { .. }
            | Self::WalletRejected { .. } => RecoverySuggestion::RestartLogin,
            Self::StorageUnavailable(_)
            | Self::SessionNotPersisted { .. }
            | Self::ProviderUnavailable(_) => RecoverySuggestion::RetryWithBackoff,
            Self::Configuration(_) => RecoverySuggestion::CheckConfiguration,
            Self::Serialization(_) => RecoverySuggestion::ReportIssue,
        }
    }

    /// Build the serializable error body for this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
