use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stream-bridge",
    version,
    about = "WebSocket bridge between a loopback-restricted device and a LAN client"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Device-facing listen address (overrides config file setting)
    #[arg(long)]
    pub device_listen: Option<String>,

    /// Client-facing listen address (overrides config file setting)
    #[arg(long)]
    pub client_listen: Option<String>,

    /// Log level (overrides config file setting)
    #[arg(long)]
    pub log_level: Option<String>,
}
