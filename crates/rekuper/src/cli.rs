use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rekuper")]
#[command(version)]
#[command(about = "Test resource session tracker and its metrics shovel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the record store HTTP API
    Serve {
        /// Path to the settings file
        #[arg(short, long, default_value = "settings.toml")]
        config: PathBuf,
    },

    /// Run one ingestion pass over the configured lookback
    Shovel {
        /// Path to the settings file
        #[arg(short, long, default_value = "settings.toml")]
        config: PathBuf,
    },

    /// Print version information
    Version,
}
