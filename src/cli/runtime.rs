use std::path::Path;

use anyhow::{bail, Context, Result};
use protection_engine::EngineConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Defaults, then the config file, then `TABGUARD__*` variables. A file named on the command
/// line must exist.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
    }
    let config = EngineConfig::load(path)
        .with_context(|| format!("failed to load engine config from {:?}", path))?;
    match path {
        Some(path) => info!(path = %path.display(), "Loaded engine configuration"),
        None => info!("Using default engine configuration"),
    }
    Ok(config)
}
