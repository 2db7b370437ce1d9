use std::sync::Arc;

use script_sanitizer::{SanitizeError, ScriptSanitizer};
use tabguard_core_types::{ContextId, GuardError, GuardKind};
use tabguard_realm::Realm;
use telemetry_bridge::TelemetryReporter;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::guard::Guard;
use crate::interceptor::{channel, console, dynamic_code, shield, storage, SuspiciousKeys};
use crate::navigation::{self, NavigationPolicy, SuspiciousPaths};
use crate::propagation;
use crate::scripts;
use crate::state::ContextState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sanitizer(#[from] SanitizeError),
}

/// Immutable engine-wide pieces shared by every context the engine protects.
#[derive(Debug)]
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) sanitizer: ScriptSanitizer,
    pub(crate) reporter: TelemetryReporter,
    pub(crate) keys: SuspiciousKeys,
    pub(crate) policy: NavigationPolicy,
}

/// Outcome of one installation pass over a realm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallReport {
    pub context: ContextId,
    pub url: String,
    pub installed: Vec<GuardKind>,
    pub failed: Vec<(GuardKind, GuardError)>,
    /// Guards switched off in the configuration.
    pub skipped: Vec<GuardKind>,
}

impl InstallReport {
    fn step(
        &mut self,
        kind: GuardKind,
        enabled: bool,
        install: impl FnOnce() -> Result<(), GuardError>,
    ) {
        if !enabled {
            self.skipped.push(kind);
            return;
        }
        match install() {
            Ok(()) => self.installed.push(kind),
            Err(err) => {
                warn!(context = %self.context, guard = %kind, error = %err, "guard left unprotected");
                self.failed.push((kind, err));
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstallReport),
    AlreadyInstalled(ContextId),
}

impl InstallOutcome {
    pub fn report(&self) -> Option<&InstallReport> {
        match self {
            InstallOutcome::Installed(report) => Some(report),
            InstallOutcome::AlreadyInstalled(_) => None,
        }
    }
}

/// Installs guarded capabilities into realms.
#[derive(Clone, Debug)]
pub struct ProtectionEngine {
    shared: Arc<EngineShared>,
}

impl ProtectionEngine {
    pub fn new(config: EngineConfig, reporter: TelemetryReporter) -> Result<Self, EngineError> {
        config.validate()?;
        let sanitizer = ScriptSanitizer::new(config.trigger_token.as_str())?;
        let keys = SuspiciousKeys::new(&config.suspicious_key_fragments);
        let policy = NavigationPolicy::new(
            SuspiciousPaths::new(&config.suspicious_paths),
            config.interaction_window(),
        );
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                sanitizer,
                reporter,
                keys,
                policy,
            }),
        })
    }

    /// Protects `realm` and, through the propagation hooks, every same-origin frame it creates.
    /// A realm is instrumented at most once; later calls report `AlreadyInstalled`.
    pub fn install(&self, realm: &Arc<Realm>) -> InstallOutcome {
        install_into(&self.shared, realm)
    }

    /// The protection state of an instrumented realm.
    pub fn state(&self, realm: &Realm) -> Option<Arc<ContextState>> {
        realm.protection::<ContextState>()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn sanitizer(&self) -> &ScriptSanitizer {
        &self.shared.sanitizer
    }

    pub fn navigation_policy(&self) -> &NavigationPolicy {
        &self.shared.policy
    }

    pub fn is_suspicious_key(&self, key: &str) -> bool {
        self.shared.keys.is_suspicious(key)
    }
}

pub(crate) fn install_into(shared: &Arc<EngineShared>, realm: &Arc<Realm>) -> InstallOutcome {
    let state = Arc::new(ContextState::new(realm.id()));
    if !realm.install_protection(state.clone()) || !state.mark_installed() {
        return InstallOutcome::AlreadyInstalled(realm.id());
    }

    let guard = Guard::new(realm, state, Arc::clone(shared));
    let toggles = &shared.config.guards;
    let mut report = InstallReport {
        context: realm.id(),
        url: realm.url().to_string(),
        installed: Vec::new(),
        failed: Vec::new(),
        skipped: Vec::new(),
    };

    report.step(GuardKind::BroadcastChannel, toggles.broadcast_channel, || {
        channel::install(&guard, realm)
    });
    report.step(GuardKind::FunctionConstructor, toggles.dynamic_code, || {
        dynamic_code::install_function_ctors(&guard, realm)
    });
    report.step(GuardKind::Eval, toggles.dynamic_code, || dynamic_code::install_eval(&guard, realm));
    report.step(GuardKind::Timers, toggles.dynamic_code, || dynamic_code::install_timers(&guard, realm));
    report.step(GuardKind::StorageWrite, toggles.storage, || storage::install(&guard, realm));
    report.step(GuardKind::ConsoleClear, toggles.console_clear, || console::install(&guard, realm));
    report.step(GuardKind::EventSuppression, toggles.event_shield, || {
        shield::install(realm);
        Ok(())
    });
    report.step(GuardKind::ScriptObserver, toggles.script_observer, || {
        scripts::install_observer(&guard, realm);
        Ok(())
    });
    report.step(GuardKind::NetworkFetch, toggles.network, || scripts::install_fetch(&guard, realm));
    report.step(GuardKind::NetworkXhr, toggles.network, || scripts::install_xhr(&guard, realm));
    report.step(GuardKind::Navigation, toggles.navigation, || navigation::install(&guard, realm));
    report.step(GuardKind::Propagation, toggles.propagation, || propagation::install(&guard, realm));

    info!(
        context = %report.context,
        url = %report.url,
        installed = report.installed.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "protection installed"
    );
    InstallOutcome::Installed(report)
}
