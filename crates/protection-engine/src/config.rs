//! Engine configuration: defaults, JSON/YAML files and `TABGUARD__*` environment overlays.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use script_sanitizer::DEFAULT_TRIGGER_TOKEN;

pub const ENV_PREFIX: &str = "TABGUARD__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize config: {0}")]
    Deserialize(String),
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-guard switches. Everything is on by default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardToggles {
    pub broadcast_channel: bool,
    pub dynamic_code: bool,
    pub storage: bool,
    pub console_clear: bool,
    pub event_shield: bool,
    pub script_observer: bool,
    pub network: bool,
    pub navigation: bool,
    pub propagation: bool,
}

impl Default for GuardToggles {
    fn default() -> Self {
        Self {
            broadcast_channel: true,
            dynamic_code: true,
            storage: true,
            console_clear: true,
            event_shield: true,
            script_observer: true,
            network: true,
            navigation: true,
            propagation: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trigger_token: String,
    pub interaction_window_ms: u64,
    pub suspicious_paths: Vec<String>,
    pub suspicious_key_fragments: Vec<String>,
    pub guards: GuardToggles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_token: DEFAULT_TRIGGER_TOKEN.to_string(),
            interaction_window_ms: 1000,
            suspicious_paths: [
                "/", "/login", "/signin", "/sign-in", "/logout", "/signout", "/sign-out",
                "/logoff", "/auth", "/sso", "/session", "/expired", "/home", "/index",
                "/default", "/main", "/welcome",
            ]
            .iter()
            .map(|path| path.to_string())
            .collect(),
            suspicious_key_fragments: [
                "tabactive", "activetab", "tabcount", "opentabs", "tabsopen", "multitab",
                "tabheartbeat", "tablock", "tabsync", "tabping", "lasttab", "currenttab",
                "tabsession", "windowcount", "openwindows",
            ]
            .iter()
            .map(|fragment| fragment.to_string())
            .collect(),
            guards: GuardToggles::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` if it exists, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => parse_config_str(&fs::read_to_string(path)?)?,
            _ => Self::default(),
        };
        config = config.with_env_overlays(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn interaction_window(&self) -> Duration {
        Duration::from_millis(self.interaction_window_ms)
    }

    /// Applies `TABGUARD__SECTION__KEY=value` pairs. List fields take comma-separated values.
    pub fn with_env_overlays(
        self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut tree =
            serde_json::to_value(&self).map_err(|err| ConfigError::Deserialize(err.to_string()))?;
        let mut touched = false;
        for (key, raw) in vars {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path: Vec<String> = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect();
            if path.is_empty() {
                continue;
            }
            apply_overlay(&mut tree, &path, &raw)?;
            touched = true;
        }
        if !touched {
            return Ok(self);
        }
        serde_json::from_value(tree).map_err(|err| ConfigError::Deserialize(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interaction_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "interaction_window_ms must be greater than zero".into(),
            ));
        }
        if let Some(path) = self.suspicious_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid(format!(
                "suspicious path `{path}` must start with '/'"
            )));
        }
        if self.suspicious_key_fragments.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid("empty suspicious key fragment".into()));
        }
        Ok(())
    }
}

pub fn parse_config_str(raw: &str) -> Result<EngineConfig, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(config) => Ok(config),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

fn apply_overlay(tree: &mut Value, path: &[String], raw: &str) -> Result<(), ConfigError> {
    let dotted = path.join(".");
    let mut cursor = tree;
    for segment in path {
        cursor = cursor
            .as_object_mut()
            .and_then(|map| map.get_mut(segment))
            .ok_or_else(|| ConfigError::UnknownKey(dotted.clone()))?;
    }
    let replacement = match &*cursor {
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        Value::String(_) => Value::String(raw.to_string()),
        _ => parse_env_value(raw),
    };
    *cursor = replacement;
    Ok(())
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.interaction_window(), Duration::from_millis(1000));
        assert_eq!(config.trigger_token, "debugger");
        assert!(config.suspicious_paths.contains(&"/".to_string()));
    }

    #[test]
    fn yaml_and_json_parse_to_the_same_config() {
        let yaml = "interaction_window_ms: 1500\nguards:\n  console_clear: false\n";
        let json = r#"{"interaction_window_ms": 1500, "guards": {"console_clear": false}}"#;
        let from_yaml = parse_config_str(yaml).unwrap();
        let from_json = parse_config_str(json).unwrap();
        assert_eq!(from_yaml, from_json);
        assert_eq!(from_yaml.interaction_window_ms, 1500);
        assert!(!from_yaml.guards.console_clear);
        assert!(from_yaml.guards.storage);
    }

    #[test]
    fn env_overlays_replace_scalars_and_lists() {
        let config = EngineConfig::default()
            .with_env_overlays(vars(&[
                ("TABGUARD__INTERACTION_WINDOW_MS", "2500"),
                ("TABGUARD__GUARDS__NAVIGATION", "false"),
                ("TABGUARD__SUSPICIOUS_PATHS", "/, /bye , /exit"),
                ("TABGUARD__TRIGGER_TOKEN", "halt"),
                ("UNRELATED", "1"),
            ]))
            .unwrap();
        assert_eq!(config.interaction_window_ms, 2500);
        assert!(!config.guards.navigation);
        assert_eq!(config.suspicious_paths, vec!["/", "/bye", "/exit"]);
        assert_eq!(config.trigger_token, "halt");
    }

    #[test]
    fn unknown_env_keys_are_rejected() {
        let err = EngineConfig::default()
            .with_env_overlays(vars(&[("TABGUARD__GUARDS__TELEPORT", "true")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(key) if key == "guards.teleport"));
    }

    #[test]
    fn load_reads_files_and_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabguard.yaml");
        fs::write(&path, "suspicious_key_fragments: [tabactive]\n").unwrap();
        let config = parse_config_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.suspicious_key_fragments, vec!["tabactive"]);

        let missing = dir.path().join("missing.yaml");
        let config = EngineConfig::load(Some(&missing)).unwrap();
        assert_eq!(config.interaction_window_ms, EngineConfig::default().interaction_window_ms);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = EngineConfig {
            interaction_window_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config = EngineConfig {
            suspicious_paths: vec!["login".into()],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
