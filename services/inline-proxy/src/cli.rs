use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

/// A transparent TCP interceptor for the legacy wire protocol.
#[derive(Debug, Parser)]
#[command(name = "inline-proxy", version, about)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override `bind` from the config file.
    #[arg(long)]
    pub bind: Option<String>,

    /// Override `upstream` from the config file.
    #[arg(long)]
    pub upstream: Option<String>,
}
