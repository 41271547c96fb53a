//! garmin-bridge: two-phase Garmin Connect login with pluggable session
//! persistence.
//!
//! A login starts with email and password. If the account asks for a second
//! factor, the credentials are staged for a few minutes and the caller gets
//! an MFA handle back; `finish` completes the login with the code. Either
//! way the resulting session token is saved per user in the configured
//! storage backend (memory, filesystem or a remote KV REST service).
//!
//! # Quick Start
//!
//! ```no_run
//! use garmin_bridge::auth::{Secret, StartResponse};
//! use garmin_bridge::bridge::Bridge;
//! use garmin_bridge::config::BridgeConfig;
//!
//! # async fn example() -> garmin_bridge::error::Result<()> {
//! let bridge = Bridge::from_config(&BridgeConfig::from_env()?)?;
//! let started = bridge
//!     .auth()
//!     .start("runner@example.com", &Secret::new("hunter2"), "user-1")
//!     .await?;
//! if let StartResponse::NeedsMfa { mfa_token } = started {
//!     bridge
//!         .auth()
//!         .finish("user-1", &Secret::new("123456"), &mfa_token)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod storage;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
