use anyhow::Result;
use clap::Args;
use protection_engine::ProtectionEngine;
use serde::Serialize;

use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    /// Storage key as passed to setItem
    pub key: String,
}

#[derive(Serialize)]
struct KeyVerdict<'a> {
    key: &'a str,
    suspicious: bool,
    action: &'static str,
}

pub fn cmd_key(args: KeyArgs, engine: &ProtectionEngine, output: OutputFormat) -> Result<()> {
    let suspicious = engine.is_suspicious_key(&args.key);
    let verdict = KeyVerdict {
        key: &args.key,
        suspicious,
        action: if suspicious { "discard" } else { "write" },
    };
    emit(&output, &verdict, || format!("{}: {}\n", verdict.key, verdict.action))
}
