//! Signature-based login: a wallet signs a short message that carries a
//! nonce previously issued by the [`NonceStore`].
//!
//! The message is a set of `key: value` lines, for example:
//!
//! ```text
//! Sign in to Medoxie
//! address: 0xabc...
//! nonce: Zx3...
//! issuedAt: 2025-01-01T00:00:00Z
//! origin: https://medoxie.com
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Signature;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nonce::{normalize_address, NonceStore};
use crate::storage::StorageError;
use crate::util::Clock;

const REQUIRED_FIELDS: [&str; 4] = ["address", "nonce", "issuedat", "origin"];
const MAX_FUTURE_SKEW_SECS: i64 = 30;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(120);

/// Wallet-login policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Accepted `origin` values. Empty accepts any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Oldest acceptable `issuedAt`.
    #[serde(default = "default_max_age", with = "crate::config::duration_secs")]
    pub max_age: Duration,
}

fn default_max_age() -> Duration {
    DEFAULT_MAX_AGE
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Why a wallet login was refused.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("missing message fields: {}", .0.join(","))]
    MissingFields(Vec<String>),
    #[error("message address does not match the claimed address")]
    AddressMismatch,
    #[error("signature could not be decoded or recovered")]
    BadSignature,
    #[error("signature was made by a different address")]
    SignatureMismatch,
    #[error("issuedAt is not a valid timestamp")]
    InvalidIssuedAt,
    #[error("issuedAt is in the future")]
    IssuedAtInFuture,
    #[error("message is too old")]
    IssuedAtExpired,
    #[error("origin is not allowed")]
    OriginNotAllowed,
    #[error("nonce is invalid, expired or already used")]
    NonceInvalid,
    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

impl WalletError {
    /// Stable reason code for responses.
    pub fn reason(&self) -> String {
        match self {
            Self::MissingFields(fields) => format!("missing_fields:{}", fields.join(",")),
            Self::AddressMismatch => "address_mismatch".to_string(),
            Self::BadSignature => "bad_signature".to_string(),
            Self::SignatureMismatch => "signature_mismatch".to_string(),
            Self::InvalidIssuedAt => "invalid_issued_at".to_string(),
            Self::IssuedAtInFuture => "issued_at_in_future".to_string(),
            Self::IssuedAtExpired => "issued_at_expired".to_string(),
            Self::OriginNotAllowed => "origin_not_allowed".to_string(),
            Self::NonceInvalid => "nonce_invalid".to_string(),
            Self::Storage(_) => "storage_unavailable".to_string(),
        }
    }
}

/// A wallet login that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedWallet {
    /// Lower-cased `0x` address.
    pub address: String,
    pub origin: String,
    pub issued_at: DateTime<Utc>,
}

/// Verifies signed wallet-login messages and consumes their nonces.
pub struct WalletVerifier {
    nonces: Arc<NonceStore>,
    clock: Arc<dyn Clock>,
    config: WalletConfig,
}

impl WalletVerifier {
    pub fn new(nonces: Arc<NonceStore>, clock: Arc<dyn Clock>, config: WalletConfig) -> Self {
        Self {
            nonces,
            clock,
            config,
        }
    }

    /// Check a signed message claimed by `address`.
    ///
    /// `message` may carry literal `\n` escapes (as sent in a header); they
    /// are expanded for parsing while the signature is checked against the
    /// message exactly as given. The nonce is only consumed once every other
    /// check has passed.
    pub async fn verify(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<VerifiedWallet, WalletError> {
        let fields = parse_message_fields(&message.replace("\\n", "\n"))?;
        let claimed = normalize_address(address);

        if normalize_address(&fields["address"]) != claimed {
            return Err(WalletError::AddressMismatch);
        }

        let recovered = recover_signer(message, signature)?;
        if recovered != claimed {
            return Err(WalletError::SignatureMismatch);
        }

        let issued_at = parse_issued_at(&fields["issuedat"])?;
        let now = self.clock.now();
        if issued_at > now + chrono::Duration::seconds(MAX_FUTURE_SKEW_SECS) {
            return Err(WalletError::IssuedAtInFuture);
        }
        let max_age = chrono::Duration::from_std(self.config.max_age)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_MAX_AGE.as_secs() as i64));
        if now - issued_at > max_age {
            return Err(WalletError::IssuedAtExpired);
        }

        let origin = fields["origin"].clone();
        if !self.config.allowed_origins.is_empty()
            && !self.config.allowed_origins.iter().any(|o| *o == origin)
        {
            return Err(WalletError::OriginNotAllowed);
        }

        if !self.nonces.verify(&claimed, &fields["nonce"]).await? {
            return Err(WalletError::NonceInvalid);
        }

        tracing::info!(address = %claimed, "wallet login verified");
        Ok(VerifiedWallet {
            address: claimed,
            origin,
            issued_at,
        })
    }
}

fn parse_message_fields(message: &str) -> Result<HashMap<String, String>, WalletError> {
    let mut fields = HashMap::new();
    for line in message.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            fields.insert(key, value.trim().to_string());
        }
    }
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|name| fields.get(**name).map_or(true, |v| v.is_empty()))
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(WalletError::MissingFields(missing));
    }
    Ok(fields)
}

fn parse_issued_at(raw: &str) -> Result<DateTime<Utc>, WalletError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| WalletError::InvalidIssuedAt)
}

/// Recover the lower-cased address that produced an EIP-191 personal signature.
fn recover_signer(message: &str, signature: &str) -> Result<String, WalletError> {
    let bytes = alloy_primitives::hex::decode(signature.trim()).map_err(|_| WalletError::BadSignature)?;
    let signature = Signature::try_from(bytes.as_slice()).map_err(|_| WalletError::BadSignature)?;
    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|_| WalletError::BadSignature)?;
    Ok(recovered.to_string().to_ascii_lowercase())
}
