//! The per-context handle every interceptor closure captures.

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use tabguard_core_types::{GuardError, GuardKind, LogEvent};
use tabguard_realm::{Binding, Capability, Realm};
use tracing::{debug, warn};

use crate::engine::EngineShared;
use crate::state::ContextState;

#[derive(Clone)]
pub(crate) struct Guard {
    pub(crate) realm: Weak<Realm>,
    pub(crate) state: Arc<ContextState>,
    pub(crate) shared: Arc<EngineShared>,
}

impl Guard {
    pub(crate) fn new(realm: &Arc<Realm>, state: Arc<ContextState>, shared: Arc<EngineShared>) -> Self {
        Self {
            realm: Arc::downgrade(realm),
            state,
            shared,
        }
    }

    pub(crate) fn realm(&self) -> Option<Arc<Realm>> {
        self.realm.upgrade()
    }

    pub(crate) fn url(&self) -> String {
        self.realm
            .upgrade()
            .map(|realm| realm.url().to_string())
            .unwrap_or_default()
    }

    /// Counts one blocked event and reports it.
    pub(crate) fn block(&self, kind: GuardKind, message: impl Into<String>) {
        let message = message.into();
        let total = self.state.record_block();
        let url = self.url();
        debug!(context = %self.state.context(), guard = %kind, total, "{}", message);
        self.shared.reporter.report(LogEvent::warn(url.clone(), message));
        self.shared.reporter.report_blocked(&url);
    }

    /// Logs something worth knowing that is not a block.
    pub(crate) fn note(&self, message: impl Into<String>) {
        self.shared.reporter.report(LogEvent::info(self.url(), message));
    }

    /// Reports an anomaly without counting it.
    pub(crate) fn anomaly(&self, message: impl Into<String>) {
        self.shared.reporter.report(LogEvent::warn(self.url(), message));
    }

    /// The sanitized form of dynamic code, when sanitizing changed it.
    pub(crate) fn neutralize(&self, code: &str) -> Option<String> {
        match self.shared.sanitizer.sanitize(code) {
            Cow::Owned(rewritten) => Some(rewritten),
            Cow::Borrowed(_) => None,
        }
    }
}

/// Replaces `binding` with a wrapper built from the current occupant; the wrapper carries the
/// original's identity.
pub(crate) fn wrap_binding<F: ?Sized>(
    kind: GuardKind,
    binding: &Binding<Capability<F>>,
    make: impl FnOnce(Capability<F>) -> Arc<F>,
) -> Result<(), GuardError> {
    binding
        .wrap(|original| Capability::masquerade(original, make(original.clone())))
        .map_err(|err| {
            warn!(guard = %kind, binding = binding.name(), error = %err, "wrapper not installed");
            GuardError::install(kind, err.to_string())
        })
}
