//! The external provider's login capability.
//!
//! The bridge never speaks the provider's protocol itself; it calls a
//! [`LoginProvider`]. [`HttpLoginProvider`] is the production implementation
//! and forwards to a login gateway that owns the protocol.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::secret::Secret;

/// Result of a primary (password) login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Login finished; here is the session token.
    Authenticated { token: Secret },
    /// The account wants a second factor; `mfa_token` identifies the challenge.
    MfaRequired { mfa_token: String },
}

/// Failures reported by a [`LoginProvider`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Caller-caused: wrong email or password.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Caller-caused: wrong MFA code.
    #[error("Invalid MFA code")]
    InvalidMfaCode,
    /// Infrastructure-caused: network, timeout, 5xx.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

/// Opaque login capability of the third-party account.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// Attempt primary login.
    async fn login(&self, email: &str, password: &Secret) -> Result<LoginOutcome, ProviderError>;

    /// Attempt MFA completion for a challenge issued by [`LoginProvider::login`].
    async fn complete_mfa(
        &self,
        email: &str,
        password: &Secret,
        mfa_token: &str,
        mfa_code: &Secret,
    ) -> Result<Secret, ProviderError>;
}

/// [`LoginProvider`] backed by a login gateway over HTTP.
///
/// - `POST {base}/login` with `{"email","password"}` answers
///   `{"status":"ok","token":..}` or `{"status":"needs_mfa","mfa_token":..}`.
/// - `POST {base}/login/mfa` with `{"email","password","mfa_token","mfa_code"}`
///   answers `{"token":..}`.
///
/// `401`/`403` are credential failures; anything else unsuccessful is
/// treated as the provider being unavailable.
///
/// # Example
/// ```no_run
/// use garmin_bridge::auth::provider::HttpLoginProvider;
///
/// let provider = HttpLoginProvider::new("http://127.0.0.1:8787");
/// ```
pub struct HttpLoginProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct MfaRequest<'a> {
    email: &'a str,
    password: &'a str,
    mfa_token: &'a str,
    mfa_code: &'a str,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LoginResponse {
    Ok { token: String },
    NeedsMfa { mfa_token: String },
}

#[derive(Deserialize)]
struct MfaResponse {
    token: String,
}

impl HttpLoginProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl LoginProvider for HttpLoginProvider {
    async fn login(&self, email: &str, password: &Secret) -> Result<LoginOutcome, ProviderError> {
        let resp = self
            .client
            .post(self.endpoint("/login"))
            .header("Accept", "application/json")
            .json(&LoginRequest {
                email,
                password: password.expose(),
            })
            .send()
            .await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::InvalidCredentials)
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!(
                    "login request failed with status {status}"
                )))
            }
            _ => {}
        }
        let payload: LoginResponse = resp.json().await?;
        Ok(match payload {
            LoginResponse::Ok { token } => LoginOutcome::Authenticated {
                token: Secret::new(token),
            },
            LoginResponse::NeedsMfa { mfa_token } => LoginOutcome::MfaRequired { mfa_token },
        })
    }

    async fn complete_mfa(
        &self,
        email: &str,
        password: &Secret,
        mfa_token: &str,
        mfa_code: &Secret,
    ) -> Result<Secret, ProviderError> {
        let resp = self
            .client
            .post(self.endpoint("/login/mfa"))
            .header("Accept", "application/json")
            .json(&MfaRequest {
                email,
                password: password.expose(),
                mfa_token,
                mfa_code: mfa_code.expose(),
            })
            .send()
            .await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::InvalidMfaCode)
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!(
                    "MFA request failed with status {status}"
                )))
            }
            _ => {}
        }
        let payload: MfaResponse = resp.json().await?;
        Ok(Secret::new(payload.token))
    }
}
