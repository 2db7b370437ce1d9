use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_json)?;
    debug!("tabguard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match dispatch(&cli, config).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
