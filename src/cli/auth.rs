//! CLI command handlers. Each prints its JSON response on stdout.

use serde::Serialize;

use crate::auth::{Secret, SessionState};
use crate::bridge::Bridge;
use crate::error::Result;

use super::{AuthCommands, NonceCommands};

#[derive(Serialize)]
struct StatusResponse<'a> {
    user_id: &'a str,
    state: SessionState,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LogoutResponse {
    Ok,
}

/// Handle `garmin-bridge auth <command>`.
pub async fn handle_auth(bridge: &Bridge, command: AuthCommands) -> Result<()> {
    match command {
        AuthCommands::Start(args) => {
            let response = bridge
                .auth()
                .start(&args.email, &Secret::new(args.password), &args.user_id)
                .await?;
            print_json(&response)
        }
        AuthCommands::Finish(args) => {
            let response = bridge
                .auth()
                .finish(&args.user_id, &Secret::new(args.code), &args.mfa_token)
                .await?;
            print_json(&response)
        }
        AuthCommands::Status(args) => {
            let state = bridge.auth().state(&args.user_id).await?;
            print_json(&StatusResponse {
                user_id: &args.user_id,
                state,
            })
        }
        AuthCommands::Logout(args) => {
            bridge.auth().logout(&args.user_id).await?;
            print_json(&LogoutResponse::Ok)
        }
    }
}

/// Handle `garmin-bridge nonce <command>`.
pub async fn handle_nonce(bridge: &Bridge, command: NonceCommands) -> Result<()> {
    match command {
        NonceCommands::Issue { address } => print_json(&bridge.issue_nonce(&address).await?),
        NonceCommands::Verify {
            address,
            message,
            signature,
        } => print_json(&bridge.verify_wallet(&address, &message, &signature).await?),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", render_json(value)?);
    Ok(())
}

fn render_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
