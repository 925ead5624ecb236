pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vaultsync")]
#[command(about = "Seal application state with a per-user key and sync it to your own drive")]
pub struct Args {
    /// Path to the vaultsync config directory (defaults to ~/.vaultsync)
    #[arg(long, global = true, env = "VAULTSYNC_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
