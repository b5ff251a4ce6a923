//! Clap CLI definitions for the filament binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Filament — a local bridge between browser extensions and a trusted host
/// process.
#[derive(Parser)]
#[command(
    name = "filament",
    version,
    about = "Filament \u{2014} local bridge daemon for browser extensions",
    long_about = "Filament \u{2014} local bridge daemon for browser extensions\n\n\
                  Extensions connect with a pre-shared token, call functions on the\n\
                  host process, and can install backends the process activates.\n\
                  Only grant the port and token to extensions you trust."
)]
pub struct Cli {
    /// Path to config file (default: ~/.filament/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a fresh config (random port + token).
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },
    /// Start the bridge server.
    Serve {
        /// Listen port (overrides the configured one).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the configured port and token.
    Token,
}
