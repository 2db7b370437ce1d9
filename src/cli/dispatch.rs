use anyhow::Result;
use protection_engine::{EngineConfig, ProtectionEngine};
use telemetry_bridge::TelemetryReporter;

use super::config::cmd_config;
use super::env::CliArgs;
use super::key::cmd_key;
use super::nav::cmd_nav;
use super::sanitize::cmd_sanitize;
use crate::cli::commands::Commands;

pub async fn dispatch(cli: &CliArgs, config: EngineConfig) -> Result<()> {
    let engine = ProtectionEngine::new(config, TelemetryReporter::detached())?;
    let output = cli.output.clone();
    match cli.command.clone() {
        Commands::Sanitize(args) => cmd_sanitize(args, &engine, output).await,
        Commands::Nav(args) => cmd_nav(args, &engine, output),
        Commands::Key(args) => cmd_key(args, &engine, output),
        Commands::Config => cmd_config(engine.config(), output),
    }
}
