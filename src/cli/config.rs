use anyhow::Result;
use protection_engine::EngineConfig;

use super::output::{emit, OutputFormat};

pub fn cmd_config(config: &EngineConfig, output: OutputFormat) -> Result<()> {
    let format = match output {
        OutputFormat::Human => OutputFormat::Yaml,
        other => other,
    };
    emit(&format, config, String::new)
}
