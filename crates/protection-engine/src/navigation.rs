//! Navigation Arbiter: gates `location` and `history` mutations behind an interaction window.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tabguard_core_types::{GuardError, GuardKind, NavigationMethod, NavigationRequest};
use tabguard_realm::location::{HistoryGoFn, HistoryStateFn, NavigateFn, ReloadFn};
use tabguard_realm::{Binding, Capability, Event, EventTarget, Phase, Realm, ScriptError, ScriptValue};
use tracing::debug;
use url::Url;

use crate::guard::{wrap_binding, Guard};
use crate::state::ContextState;

/// Auth, logout and landing paths that forced redirects aim for.
#[derive(Clone, Debug)]
pub struct SuspiciousPaths {
    paths: Vec<String>,
}

impl SuspiciousPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|path| path.as_ref().trim().to_ascii_lowercase())
                .filter(|path| !path.is_empty())
                .collect(),
        }
    }

    /// Exact match, or a prefix that ends on a `/` or `.` boundary (`/login/x`, `/index.html`).
    pub fn matches(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        let path = if path.is_empty() { "/" } else { path.as_str() };
        self.paths.iter().any(|candidate| {
            if candidate == "/" {
                return path == "/";
            }
            let candidate = candidate.trim_end_matches('/');
            match path.strip_prefix(candidate) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('.'),
                None => false,
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// Genuine user input happened within the interaction window.
    Armed,
    NotSuspicious,
    /// Same-origin request from the site root or an empty path.
    ShallowSource,
    HistoryTraversal,
    /// History state update or fragment change that keeps the current document.
    SamePage,
    /// The target could not be resolved.
    Unclassifiable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    CrossOrigin,
    /// Same-origin jump from a deep page to an auth or landing path.
    ForcedRedirect,
    SelfReload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum NavigationDecision {
    Allow(AllowReason),
    Block(BlockReason),
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, NavigationDecision::Allow(_))
    }
}

impl fmt::Display for NavigationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationDecision::Allow(reason) => write!(f, "ALLOW ({reason:?})"),
            NavigationDecision::Block(reason) => write!(f, "BLOCK ({reason:?})"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NavigationPolicy {
    suspicious: SuspiciousPaths,
    window: Duration,
}

impl NavigationPolicy {
    pub fn new(suspicious: SuspiciousPaths, window: Duration) -> Self {
        Self { suspicious, window }
    }

    pub fn interaction_window(&self) -> Duration {
        self.window
    }

    pub fn is_suspicious_path(&self, path: &str) -> bool {
        self.suspicious.matches(path)
    }

    pub fn evaluate(&self, request: &NavigationRequest, armed: bool) -> NavigationDecision {
        if armed {
            return NavigationDecision::Allow(AllowReason::Armed);
        }
        if stays_on_page(request) {
            return NavigationDecision::Allow(AllowReason::SamePage);
        }
        match request.method {
            NavigationMethod::Reload => return NavigationDecision::Block(BlockReason::SelfReload),
            NavigationMethod::HistoryGo if request.target_url == request.origin_page => {
                return NavigationDecision::Block(BlockReason::SelfReload)
            }
            NavigationMethod::HistoryGo => {
                return NavigationDecision::Allow(AllowReason::HistoryTraversal)
            }
            _ => {}
        }
        if !request.is_same_origin() {
            return NavigationDecision::Block(BlockReason::CrossOrigin);
        }
        if !self.suspicious.matches(request.target_url.path()) {
            return NavigationDecision::Allow(AllowReason::NotSuspicious);
        }
        if !is_deep(&request.origin_page) {
            return NavigationDecision::Allow(AllowReason::ShallowSource);
        }
        NavigationDecision::Block(BlockReason::ForcedRedirect)
    }

    /// Resolves `target` (the current page when `None`) and evaluates it. Targets that cannot be
    /// resolved are allowed.
    pub fn decide(
        &self,
        method: NavigationMethod,
        target: Option<&str>,
        origin_page: &Url,
        armed: bool,
    ) -> Result<NavigationDecision, GuardError> {
        let request = match target {
            Some(target) => NavigationRequest::resolve(method, target, origin_page)?,
            None => NavigationRequest::in_place(method, origin_page),
        };
        Ok(self.evaluate(&request, armed))
    }
}

fn is_deep(page: &Url) -> bool {
    !matches!(page.path(), "" | "/")
}

/// Whether the request leaves the current document loaded: a history state update to the same
/// URL, or a move to a fragment of it. Assigning the exact same URL reloads, so it does not count.
fn stays_on_page(request: &NavigationRequest) -> bool {
    let mut target = request.target_url.clone();
    let mut page = request.origin_page.clone();
    target.set_fragment(None);
    page.set_fragment(None);
    if target != page {
        return false;
    }
    match request.method {
        NavigationMethod::PushState | NavigationMethod::ReplaceState => true,
        NavigationMethod::Assign | NavigationMethod::Replace => request.target_url.fragment().is_some(),
        NavigationMethod::Reload | NavigationMethod::HistoryGo => false,
    }
}

/// Runs the arbiter for one call. `true` means the call may go through to the platform.
fn admit(guard: &Guard, method: NavigationMethod, target: Option<&str>) -> bool {
    let Some(realm) = guard.realm() else {
        return true;
    };
    let page = realm.url();
    let armed = guard.state.is_armed();
    match guard.shared.policy.decide(method, target, &page, armed) {
        Ok(NavigationDecision::Allow(reason)) => {
            debug!(context = %guard.state.context(), %method, target = ?target, ?reason, "navigation allowed");
            true
        }
        Ok(NavigationDecision::Block(reason)) => {
            let target = target.unwrap_or(page.as_str());
            guard.block(
                GuardKind::Navigation,
                format!("blocked {method} to '{target}' from {page} ({reason:?})"),
            );
            false
        }
        Err(err) => {
            guard.anomaly(format!("allowed unclassifiable {method}: {err}"));
            true
        }
    }
}

fn gate_navigate(
    guard: &Guard,
    binding: &Binding<Capability<NavigateFn>>,
    method: NavigationMethod,
) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::Navigation, binding, move |native| {
        let navigate: Arc<NavigateFn> = Arc::new(move |target: &str| -> Result<(), ScriptError> {
            if admit(&guard, method, Some(target)) {
                (native.func())(target)
            } else {
                Ok(())
            }
        });
        navigate
    })
}

fn gate_history_state(
    guard: &Guard,
    binding: &Binding<Capability<HistoryStateFn>>,
    method: NavigationMethod,
) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::Navigation, binding, move |native| {
        let update: Arc<HistoryStateFn> = Arc::new(
            move |state: &ScriptValue, target: Option<&str>| -> Result<(), ScriptError> {
                if admit(&guard, method, target) {
                    (native.func())(state, target)
                } else {
                    Ok(())
                }
            },
        );
        update
    })
}

fn gate_reload(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::Navigation, &realm.location().reload, move |native| {
        let reload: Arc<ReloadFn> = Arc::new(move || -> Result<(), ScriptError> {
            if admit(&guard, NavigationMethod::Reload, None) {
                (native.func())()
            } else {
                Ok(())
            }
        });
        reload
    })
}

fn gate_go(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::Navigation, &realm.history().go, move |native| {
        let go: Arc<HistoryGoFn> = Arc::new(move |delta: i64| -> Result<(), ScriptError> {
            if delta != 0 || admit(&guard, NavigationMethod::HistoryGo, None) {
                (native.func())(delta)
            } else {
                Ok(())
            }
        });
        go
    })
}

fn arm_on_user_input(state: &Arc<ContextState>, window: Duration, realm: &Realm) {
    let triggers: [(&str, fn(&Event) -> bool); 3] = [
        ("click", |event| event.button == 0),
        ("submit", |_| true),
        ("keydown", |event| event.key.as_deref() == Some("Enter")),
    ];
    for (kind, qualifies) in triggers {
        let state = Arc::clone(state);
        realm.events().add_listener(
            EventTarget::Window,
            kind,
            Phase::Capture,
            Arc::new(move |event: &Event| {
                if event.is_trusted && qualifies(event) {
                    state.arm(window);
                }
            }),
        );
    }
}

pub(crate) fn install(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let location = realm.location();
    let history = realm.history();
    let results = [
        gate_navigate(guard, &location.href.set, NavigationMethod::Assign),
        gate_navigate(guard, &location.assign, NavigationMethod::Assign),
        gate_navigate(guard, &location.replace, NavigationMethod::Replace),
        gate_reload(guard, realm),
        gate_history_state(guard, &history.push_state, NavigationMethod::PushState),
        gate_history_state(guard, &history.replace_state, NavigationMethod::ReplaceState),
        gate_go(guard, realm),
    ];
    arm_on_user_input(&guard.state, guard.shared.policy.interaction_window(), realm);
    results.into_iter().collect()
}
