//! In-page protection engine.
//!
//! [`ProtectionEngine::install`] instruments a [`Realm`](tabguard_realm::Realm) before any page
//! code runs: global capabilities (broadcast channels, dynamic code, timers, storage writes,
//! `console.clear`) are replaced with guarded wrappers, inline and network-delivered scripts
//! pass through the [`ScriptSanitizer`](script_sanitizer::ScriptSanitizer), navigation is gated
//! by an interaction window, and every same-origin frame the page creates is instrumented the
//! same way. Blocked events are counted per context in [`ContextState`] and forwarded through
//! the telemetry reporter.

pub mod config;
mod engine;
mod guard;
pub mod interceptor;
pub mod navigation;
mod propagation;
pub mod scripts;
pub mod state;

pub use config::{ConfigError, EngineConfig, GuardToggles, ENV_PREFIX};
pub use engine::{EngineError, InstallOutcome, InstallReport, ProtectionEngine};
pub use interceptor::{is_devtools_shortcut, SuspiciousKeys, SHIELDED_EVENTS};
pub use navigation::{AllowReason, BlockReason, NavigationDecision, NavigationPolicy, SuspiciousPaths};
pub use scripts::NEUTRALIZED_SCRIPT_TYPE;
pub use state::ContextState;
