use anyhow::{Context, Result};
use clap::Args;
use protection_engine::{AllowReason, NavigationDecision, ProtectionEngine};
use serde::Serialize;
use tabguard_core_types::NavigationMethod;
use tracing::warn;
use url::Url;

use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct NavArgs {
    /// Page the request originates from
    #[arg(long, value_name = "URL")]
    pub from: String,

    /// Navigation target; omit for reload and history moves
    #[arg(long, value_name = "URL")]
    pub to: Option<String>,

    /// assign, replace, reload, push-state, replace-state or history-go
    #[arg(long, default_value = "assign")]
    pub method: NavigationMethod,

    /// Evaluate as if genuine user input just happened
    #[arg(long)]
    pub armed: bool,
}

#[derive(Serialize)]
struct NavVerdict {
    method: NavigationMethod,
    from: String,
    to: Option<String>,
    armed: bool,
    #[serde(flatten)]
    decision: NavigationDecision,
}

pub fn cmd_nav(args: NavArgs, engine: &ProtectionEngine, output: OutputFormat) -> Result<()> {
    let from = Url::parse(&args.from).with_context(|| format!("invalid --from URL '{}'", args.from))?;
    let decision = engine
        .navigation_policy()
        .decide(args.method, args.to.as_deref(), &from, args.armed)
        .unwrap_or_else(|err| {
            warn!(error = %err, "target cannot be classified");
            NavigationDecision::Allow(AllowReason::Unclassifiable)
        });

    let verdict = NavVerdict {
        method: args.method,
        from: from.to_string(),
        to: args.to,
        armed: args.armed,
        decision,
    };
    emit(&output, &verdict, || format!("{}\n", verdict.decision))
}
