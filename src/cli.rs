// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "key-rotation-manager",
    version,
    about = "API key rotation and failover for upstream AI services",
    long_about = "Holds a pool of API keys per upstream service, rotates through them round-robin, quarantines keys that keep failing and exposes their health over HTTP."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Enable JSON logging
    #[arg(long, env = "KEY_ROTATION_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the introspection server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Print the effective configuration
        #[arg(short, long)]
        verbose: bool,
    },

    /// Key management commands
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum KeyCommands {
    /// Load keys from the environment and show masked previews per service
    List,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
