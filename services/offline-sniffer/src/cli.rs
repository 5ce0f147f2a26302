use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

/// A packet-capture consumer for the legacy wire protocol.
#[derive(Debug, Parser)]
#[command(name = "offline-sniffer", version, about)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Capture from a live device by name, e.g. `eth0`. Mutually exclusive
    /// with `--file`.
    #[arg(long)]
    pub interface: Option<String>,

    /// Replay a capture file instead of a live device. Mutually exclusive
    /// with `--interface`.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Override the TCP port filter from the config file.
    #[arg(long)]
    pub port: Option<u16>,
}
