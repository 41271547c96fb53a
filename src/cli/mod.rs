//! CLI entry point for garmin-bridge.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Garmin login bridge CLI
#[derive(Parser, Debug)]
#[command(
    name = "garmin-bridge",
    version,
    about = "Two-phase Garmin login bridge"
)]
pub struct Cli {
    /// TOML config file; environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Password and MFA login, session status and logout
    Auth(AuthArgs),
    /// Wallet-login nonces
    Nonce(NonceArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Submit email and password
    Start(StartArgs),
    /// Complete a login that asked for MFA
    Finish(FinishArgs),
    /// Show whether a user is logged in, pending MFA or neither
    Status(UserArgs),
    /// Forget a user's stored session
    Logout(UserArgs),
}

#[derive(Parser, Debug)]
pub struct StartArgs {
    #[arg(long)]
    pub user_id: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Parser, Debug)]
pub struct FinishArgs {
    #[arg(long)]
    pub user_id: String,
    /// Handle returned by `auth start`
    #[arg(long)]
    pub mfa_token: String,
    /// One-time code from the user's second factor
    #[arg(long)]
    pub code: String,
}

#[derive(Parser, Debug)]
pub struct UserArgs {
    #[arg(long)]
    pub user_id: String,
}

/// Arguments for the `nonce` subcommand group.
#[derive(Parser, Debug)]
pub struct NonceArgs {
    #[command(subcommand)]
    pub command: NonceCommands,
}

#[derive(Subcommand, Debug)]
pub enum NonceCommands {
    /// Issue a nonce for a wallet address
    Issue {
        address: String,
    },
    /// Verify a signed login message
    Verify {
        #[arg(long)]
        address: String,
        /// The signed message; literal `\n` sequences are accepted
        #[arg(long)]
        message: String,
        /// 65-byte hex signature
        #[arg(long)]
        signature: String,
    },
}
