use anyhow::Result;
use clap::Parser;

mod api;
mod cli;
mod config;
mod coordinator;
mod domain;
mod error;
mod infrastructure;
mod lifecycle;
mod registry;
mod signing;
mod store;
mod version;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.command {
        Commands::Serve => {
            let config = config::ServerConfig::from_env()?;
            let state = api::AppState::from_config(config).await?;
            api::serve(state).await
        }
        Commands::GenerateKeys { output_dir } => {
            let generated = signing::generate_keypair(std::path::Path::new(&output_dir))?;
            println!("Generated Ed25519 keypair");
            println!("  private key: {}", generated.private_key_path.display());
            println!("  public key:  {}", generated.public_key_path.display());
            println!();
            println!("Public key (base64, distribute to update agents):");
            println!("  {}", generated.public_key_b64);
            println!();
            println!(
                "Set SIGNING_PRIVATE_KEY_PATH={} to enable signing.",
                generated.private_key_path.display()
            );
            Ok(())
        }
    }
}
