use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Shared error type for the protection engine crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("{guard} could not be installed: {reason}")]
    InstallFailed { guard: GuardKind, reason: String },
    #[error("navigation target '{target}' cannot be resolved: {reason}")]
    UnresolvableTarget { target: String, reason: String },
    #[error("execution context is no longer available")]
    ContextGone,
    #[error("{message}")]
    Message { message: String },
}

impl GuardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn install(guard: GuardKind, reason: impl Into<String>) -> Self {
        Self::InstallFailed {
            guard,
            reason: reason.into(),
        }
    }
}

/// Identity of one execution context (top page or nested frame).
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ContextId(pub Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a document node, unique within its document.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The guards the engine installs into a context.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GuardKind {
    BroadcastChannel,
    FunctionConstructor,
    Eval,
    Timers,
    StorageWrite,
    ConsoleClear,
    EventSuppression,
    ScriptObserver,
    NetworkFetch,
    NetworkXhr,
    Navigation,
    Propagation,
}

impl GuardKind {
    pub const ALL: [GuardKind; 12] = [
        GuardKind::BroadcastChannel,
        GuardKind::FunctionConstructor,
        GuardKind::Eval,
        GuardKind::Timers,
        GuardKind::StorageWrite,
        GuardKind::ConsoleClear,
        GuardKind::EventSuppression,
        GuardKind::ScriptObserver,
        GuardKind::NetworkFetch,
        GuardKind::NetworkXhr,
        GuardKind::Navigation,
        GuardKind::Propagation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::BroadcastChannel => "broadcast_channel",
            GuardKind::FunctionConstructor => "function_constructor",
            GuardKind::Eval => "eval",
            GuardKind::Timers => "timers",
            GuardKind::StorageWrite => "storage_write",
            GuardKind::ConsoleClear => "console_clear",
            GuardKind::EventSuppression => "event_suppression",
            GuardKind::ScriptObserver => "script_observer",
            GuardKind::NetworkFetch => "network_fetch",
            GuardKind::NetworkXhr => "network_xhr",
            GuardKind::Navigation => "navigation",
            GuardKind::Propagation => "propagation",
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

/// Diagnostic record handed to the telemetry reporter and then discarded.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub context_url: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(level: LogLevel, context_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            context_url: context_url.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(context_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, context_url, message)
    }

    pub fn warn(context_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, context_url, message)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NavigationMethod {
    Assign,
    Replace,
    Reload,
    PushState,
    ReplaceState,
    HistoryGo,
}

impl NavigationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMethod::Assign => "assign",
            NavigationMethod::Replace => "replace",
            NavigationMethod::Reload => "reload",
            NavigationMethod::PushState => "pushState",
            NavigationMethod::ReplaceState => "replaceState",
            NavigationMethod::HistoryGo => "historyGo",
        }
    }
}

impl fmt::Display for NavigationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationMethod {
    type Err = GuardError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | '.'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "assign" | "href" => Ok(NavigationMethod::Assign),
            "replace" => Ok(NavigationMethod::Replace),
            "reload" => Ok(NavigationMethod::Reload),
            "pushstate" => Ok(NavigationMethod::PushState),
            "replacestate" => Ok(NavigationMethod::ReplaceState),
            "historygo" | "go" => Ok(NavigationMethod::HistoryGo),
            _ => Err(GuardError::new(format!("unknown navigation method '{raw}'"))),
        }
    }
}

/// One navigation attempt, evaluated once by the arbiter and discarded.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationRequest {
    pub method: NavigationMethod,
    pub target_url: Url,
    pub origin_page: Url,
}

impl NavigationRequest {
    /// Resolves `target` against the page the request originates from.
    pub fn resolve(
        method: NavigationMethod,
        target: &str,
        origin_page: &Url,
    ) -> Result<Self, GuardError> {
        let target_url =
            origin_page
                .join(target)
                .map_err(|err| GuardError::UnresolvableTarget {
                    target: target.to_string(),
                    reason: err.to_string(),
                })?;
        Ok(Self {
            method,
            target_url,
            origin_page: origin_page.clone(),
        })
    }

    /// A request whose target is the page itself (reload, state push without URL).
    pub fn in_place(method: NavigationMethod, origin_page: &Url) -> Self {
        Self {
            method,
            target_url: origin_page.clone(),
            origin_page: origin_page.clone(),
        }
    }

    pub fn is_same_origin(&self) -> bool {
        self.target_url.origin() == self.origin_page.origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_targets_against_origin_page() {
        let page = Url::parse("https://example.com/account/settings").unwrap();
        let request = NavigationRequest::resolve(NavigationMethod::Assign, "../login", &page)
            .expect("resolve");
        assert_eq!(request.target_url.as_str(), "https://example.com/login");
        assert!(request.is_same_origin());
    }

    #[test]
    fn unresolvable_target_is_reported() {
        let page = Url::parse("https://example.com/").unwrap();
        let err = NavigationRequest::resolve(NavigationMethod::Assign, "http://[::1", &page)
            .unwrap_err();
        assert!(matches!(err, GuardError::UnresolvableTarget { .. }));
    }

    #[test]
    fn navigation_method_parses_cli_spellings() {
        assert_eq!(
            "push-state".parse::<NavigationMethod>().unwrap(),
            NavigationMethod::PushState
        );
        assert_eq!(
            "history_go".parse::<NavigationMethod>().unwrap(),
            NavigationMethod::HistoryGo
        );
        assert!("teleport".parse::<NavigationMethod>().is_err());
    }
}
