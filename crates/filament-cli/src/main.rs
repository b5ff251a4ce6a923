//! Filament daemon — command-line entry point.
//!
//! `filament init` writes a fresh config; `filament serve` starts the bridge
//! and prints the port and token the user must hand to a trusted extension.

mod builtins;
mod cli;
mod config;

use crate::builtins::builtin_catalog;
use crate::cli::{Cli, Commands};
use crate::config::BridgeConfig;

use anyhow::Context;
use clap::Parser;
use filament_backend::{Installer, StaticResolver};
use filament_rpc::ServiceRegistry;
use filament_server::{BridgeServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Ok(BridgeConfig::default_path()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let path = config_path(&cli)?;

    match cli.command {
        Commands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let config = BridgeConfig::generate();
            config.save(&path)?;
            println!("Wrote {}", path.display());
            println!("Port:  {}", config.port);
            println!("Token: {}", config.token);
            Ok(())
        }
        Commands::Token => {
            let config = BridgeConfig::load(&path)
                .with_context(|| format!("no config at {} (run `filament init`)", path.display()))?;
            println!("Port:  {}", config.port);
            println!("Token: {}", config.token);
            Ok(())
        }
        Commands::Serve { port } => serve(path, port).await,
    }
}

async fn serve(path: PathBuf, port_override: Option<u16>) -> anyhow::Result<()> {
    let (config, created) = BridgeConfig::load_or_init(&path)?;
    if created {
        info!("Generated fresh config at {}", path.display());
    }
    let port = port_override.unwrap_or(config.port);

    let installer = Arc::new(Installer::new(
        Arc::new(builtin_catalog()),
        Arc::new(StaticResolver::new()),
    ));

    let server_config = ServerConfig {
        listen_addr: ([127, 0, 0, 1], port).into(),
        token: config.token.clone(),
    };
    let (server, accept_task) =
        BridgeServer::start(server_config, ServiceRegistry::new(), installer).await?;

    println!(
        "Filament bridge listening on {}",
        server.local_addr()
    );
    println!("Auth token:\n{}\n", config.token);
    println!("Grant the port and token only to extensions you trust.");

    accept_task.await.context("accept loop ended")?;
    Ok(())
}
