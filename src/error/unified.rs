//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidCredentials,
    MfaInvalidCode,
    MfaExpired,
    MfaUnknown,
    TokenNotFound,
    StorageUnavailable,
    ProviderUnavailable,
    SessionNotPersisted,
    WalletRejected,
    Configuration,
    Serialization,
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad password or bad MFA code.
    Credentials,
    /// No usable pending challenge.
    Challenge,
    /// No persisted session.
    Session,
    Storage,
    Provider,
    Configuration,
    /// A defect in this crate rather than in the request or the environment.
    Internal,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    CheckCredentials,
    ReenterCode,
    RestartLogin,
    RetryWithBackoff,
    CheckConfiguration,
    ReportIssue,
}

/// Serializable error body, e.g. `{"error":"mfa_expired","message":"...","retryable":false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    pub retryable: bool,
}
