use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use protection_engine::ProtectionEngine;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::info;

use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SanitizeArgs {
    /// Script to sanitize; `-` reads stdin
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// List the rules that fired
    #[arg(long)]
    pub report: bool,
}

#[derive(Serialize)]
struct SanitizeOutcome<'a> {
    changed: bool,
    rules: &'a [&'static str],
    output: &'a str,
}

async fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("failed to read stdin")?;
        return Ok(source);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))
}

pub async fn cmd_sanitize(args: SanitizeArgs, engine: &ProtectionEngine, output: OutputFormat) -> Result<()> {
    let source = read_input(&args.input).await?;
    let report = engine.sanitizer().sanitize_with_report(&source);
    info!(changed = report.changed(), rules = ?report.fired, "sanitized {}", args.input.display());

    let outcome = SanitizeOutcome {
        changed: report.changed(),
        rules: &report.fired,
        output: &report.text,
    };
    emit(&output, &outcome, || {
        let mut rendered = outcome.output.to_string();
        if args.report {
            if !rendered.ends_with('\n') {
                rendered.push('\n');
            }
            let rules = if outcome.rules.is_empty() {
                "none".to_string()
            } else {
                outcome.rules.join(", ")
            };
            rendered.push_str(&format!("# rules fired: {rules}\n"));
        }
        rendered
    })
}
