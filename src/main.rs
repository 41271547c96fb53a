//! garmin-bridge CLI binary entry point.

use clap::Parser;
use garmin_bridge::bridge::Bridge;
use garmin_bridge::cli::{Cli, Commands};
use garmin_bridge::config::BridgeConfig;
use garmin_bridge::error::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match serde_json::to_string(&e.to_response()) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = BridgeConfig::load(cli.config.as_deref())?;
    let bridge = Bridge::from_config(&config)?;

    match cli.command {
        Commands::Auth(args) => garmin_bridge::cli::auth::handle_auth(&bridge, args.command).await,
        Commands::Nonce(args) => {
            garmin_bridge::cli::auth::handle_nonce(&bridge, args.command).await
        }
    }
}
