//! Observable side effects of native capabilities.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tabguard_core_types::{NavigationMethod, NodeId};
use thiserror::Error;
use url::Url;

/// Errors a native capability raises back into page code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("SecurityError: {0}")]
    Security(String),
    #[error("InvalidStateError: {0}")]
    InvalidState(String),
    #[error("execution context is gone")]
    ContextGone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Session,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    External(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformEffect {
    Navigated { method: NavigationMethod, url: Url },
    ScriptExecuted { node: NodeId, source: ScriptSource },
    Evaluated(String),
    FunctionCompiled { params: Vec<String>, body: String },
    TimerScheduled { id: TimerId, repeat: bool, source: Option<String>, delay: Duration },
    ConsoleCleared,
    StorageWritten { kind: StorageKind, key: String, value: String },
    ChannelOpened(String),
}

/// Append-only record of what the platform actually did.
#[derive(Debug, Default)]
pub struct PlatformLog {
    effects: Mutex<Vec<PlatformEffect>>,
}

impl PlatformLog {
    pub fn record(&self, effect: PlatformEffect) {
        self.effects.lock().push(effect);
    }

    pub fn effects(&self) -> Vec<PlatformEffect> {
        self.effects.lock().clone()
    }

    pub fn navigations(&self) -> Vec<(NavigationMethod, Url)> {
        self.collect(|effect| match effect {
            PlatformEffect::Navigated { method, url } => Some((*method, url.clone())),
            _ => None,
        })
    }

    pub fn executed_scripts(&self) -> Vec<(NodeId, ScriptSource)> {
        self.collect(|effect| match effect {
            PlatformEffect::ScriptExecuted { node, source } => Some((*node, source.clone())),
            _ => None,
        })
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.collect(|effect| match effect {
            PlatformEffect::Evaluated(source) => Some(source.clone()),
            _ => None,
        })
    }

    pub fn compiled_bodies(&self) -> Vec<String> {
        self.collect(|effect| match effect {
            PlatformEffect::FunctionCompiled { body, .. } => Some(body.clone()),
            _ => None,
        })
    }

    pub fn timer_sources(&self) -> Vec<String> {
        self.collect(|effect| match effect {
            PlatformEffect::TimerScheduled {
                source: Some(source),
                ..
            } => Some(source.clone()),
            _ => None,
        })
    }

    pub fn console_clears(&self) -> usize {
        self.collect(|effect| matches!(effect, PlatformEffect::ConsoleCleared).then_some(()))
            .len()
    }

    fn collect<T>(&self, pick: impl Fn(&PlatformEffect) -> Option<T>) -> Vec<T> {
        self.effects.lock().iter().filter_map(pick).collect()
    }
}

/// A `localStorage`/`sessionStorage` area.
#[derive(Debug)]
pub struct StorageArea {
    kind: StorageKind,
    entries: RwLock<BTreeMap<String, String>>,
}

impl StorageArea {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn write(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }
}
