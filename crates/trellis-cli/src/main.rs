//! Trellis CLI
//!
//! Administer garden connections from the terminal.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use trellis_cli::garden_cmd::{self, GardenAction};
use trellis_core::config::load_config;
use trellis_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about = "Garden connection administration", long_about = None)]
struct Cli {
    /// Extra config file, applied over the global one
    #[arg(long, global = true, env = "TRELLIS_CONFIG")]
    config: Option<PathBuf>,

    /// Garden server base URL
    #[arg(long, global = true, env = "TRELLIS_URL")]
    url: Option<String>,

    /// Access token
    #[arg(long, global = true, env = "TRELLIS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: GardenAction,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.api.base_url = url;
    }
    if let Some(token) = cli.token {
        config.api.token = Some(token);
    }
    if cli.log_json {
        config.log.json = true;
    }

    // Logs go to stderr so command output on stdout stays clean.
    init_tracing("trellis=info", config.log.json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting trellis CLI");

    garden_cmd::run(cli.command, &config).await
}
