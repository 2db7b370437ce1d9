//! Messages exchanged with the settings/statistics collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabguard_core_types::{LogEvent, LogLevel};
use url::Url;

/// Requests sent to the collaborator. Serialized with a `type` tag, e.g.
/// `{"type":"INCREMENT_BLOCKED","url":"https://example.com/"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorMessage {
    GetSettings,
    ShouldProtect {
        url: String,
    },
    IncrementBlocked {
        url: String,
    },
    LogEntry {
        level: LogLevel,
        message: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
}

impl CollaboratorMessage {
    pub fn log_entry(event: &LogEvent) -> Self {
        Self::LogEntry {
            level: event.level,
            message: event.message.clone(),
            url: event.context_url.clone(),
            timestamp: event.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetSettings => "GET_SETTINGS",
            Self::ShouldProtect { .. } => "SHOULD_PROTECT",
            Self::IncrementBlocked { .. } => "INCREMENT_BLOCKED",
            Self::LogEntry { .. } => "LOG_ENTRY",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorReply {
    Settings(ProtectionSettings),
    ShouldProtect { protect: bool },
    Ack,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionMode {
    /// Every site is protected.
    #[default]
    All,
    /// Only the listed sites are protected.
    Selected,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionSettings {
    pub mode: ProtectionMode,
    #[serde(default, rename = "enabledSites")]
    pub enabled_sites: Vec<String>,
}

impl ProtectionSettings {
    /// A site entry matches its own host and any subdomain of it. Unparsable URLs are never
    /// protected in selected mode.
    pub fn should_protect(&self, url: &str) -> bool {
        if self.mode == ProtectionMode::All {
            return true;
        }
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.enabled_sites
            .iter()
            .map(|site| normalize_site(site))
            .filter(|site| !site.is_empty())
            .any(|site| host == site || host.ends_with(&format!(".{site}")))
    }
}

fn normalize_site(site: &str) -> String {
    let site = site.trim().to_ascii_lowercase();
    let site = match site.split_once("://") {
        Some((_, rest)) => rest.to_string(),
        None => site,
    };
    let host = site.split(&['/', ':'][..]).next().unwrap_or_default();
    host.trim_start_matches("www.").to_string()
}
