//! `location` and `history` as accessor tables of independently replaceable entries.

use std::sync::{Arc, Weak};

use tabguard_core_types::NavigationMethod;
use url::Url;

use crate::capability::{Binding, Capability};
use crate::platform::{PlatformEffect, ScriptError};
use crate::{Realm, ScriptValue};

pub type HrefGetFn = dyn Fn() -> String + Send + Sync;
pub type NavigateFn = dyn Fn(&str) -> Result<(), ScriptError> + Send + Sync;
pub type ReloadFn = dyn Fn() -> Result<(), ScriptError> + Send + Sync;
pub type HistoryStateFn = dyn Fn(&ScriptValue, Option<&str>) -> Result<(), ScriptError> + Send + Sync;
pub type HistoryGoFn = dyn Fn(i64) -> Result<(), ScriptError> + Send + Sync;

/// A get/set pair for one property.
pub struct Accessor<G: ?Sized, S: ?Sized> {
    pub get: Binding<Capability<G>>,
    pub set: Binding<Capability<S>>,
}

pub struct LocationSurface {
    pub href: Accessor<HrefGetFn, NavigateFn>,
    pub assign: Binding<Capability<NavigateFn>>,
    pub replace: Binding<Capability<NavigateFn>>,
    pub reload: Binding<Capability<ReloadFn>>,
}

pub struct HistorySurface {
    pub push_state: Binding<Capability<HistoryStateFn>>,
    pub replace_state: Binding<Capability<HistoryStateFn>>,
    pub go: Binding<Capability<HistoryGoFn>>,
}

/// Joint session history of a realm: visited entries and the current position.
#[derive(Debug)]
pub(crate) struct SessionHistory {
    entries: Vec<Url>,
    index: usize,
}

impl SessionHistory {
    pub(crate) fn new(initial: Url) -> Self {
        Self {
            entries: vec![initial],
            index: 0,
        }
    }

    fn push(&mut self, url: Url) {
        self.entries.truncate(self.index + 1);
        self.entries.push(url);
        self.index = self.entries.len() - 1;
    }

    fn replace(&mut self, url: Url) {
        self.entries[self.index] = url;
    }

    fn traverse(&mut self, delta: i64) -> Option<Url> {
        let target = self.index as i64 + delta;
        if target < 0 || target >= self.entries.len() as i64 {
            return None;
        }
        self.index = target as usize;
        Some(self.entries[self.index].clone())
    }
}

fn upgrade(realm: &Weak<Realm>) -> Result<Arc<Realm>, ScriptError> {
    realm.upgrade().ok_or(ScriptError::ContextGone)
}

fn resolve(realm: &Realm, target: &str) -> Result<Url, ScriptError> {
    realm
        .url()
        .join(target)
        .map_err(|err| ScriptError::Syntax(format!("'{target}' is not a valid URL: {err}")))
}

fn commit(realm: &Realm, method: NavigationMethod, url: Url) {
    {
        let mut session = realm.session.lock();
        match method {
            NavigationMethod::Replace | NavigationMethod::ReplaceState => session.replace(url.clone()),
            NavigationMethod::Reload | NavigationMethod::HistoryGo => {}
            NavigationMethod::Assign | NavigationMethod::PushState => session.push(url.clone()),
        }
    }
    *realm.url.write() = url.clone();
    realm
        .platform()
        .record(PlatformEffect::Navigated { method, url });
}

fn navigate(realm: Weak<Realm>, method: NavigationMethod) -> Arc<NavigateFn> {
    Arc::new(move |target: &str| -> Result<(), ScriptError> {
        let realm = upgrade(&realm)?;
        let url = resolve(&realm, target)?;
        commit(&realm, method, url);
        Ok(())
    })
}

fn history_state(realm: Weak<Realm>, method: NavigationMethod) -> Arc<HistoryStateFn> {
    Arc::new(
        move |_state: &ScriptValue, target: Option<&str>| -> Result<(), ScriptError> {
            let realm = upgrade(&realm)?;
            let url = match target {
                Some(target) => resolve(&realm, target)?,
                None => realm.url(),
            };
            if url.origin() != realm.url().origin() {
                return Err(ScriptError::Security(format!(
                    "cannot move history to {url} from another origin"
                )));
            }
            commit(&realm, method, url);
            Ok(())
        },
    )
}

impl LocationSurface {
    pub(crate) fn native(realm: Weak<Realm>) -> Self {
        let href_get: Arc<HrefGetFn> = {
            let realm = realm.clone();
            Arc::new(move || {
                realm
                    .upgrade()
                    .map(|realm| realm.url().to_string())
                    .unwrap_or_default()
            })
        };
        let reload: Arc<ReloadFn> = {
            let realm = realm.clone();
            Arc::new(move || -> Result<(), ScriptError> {
                let realm = upgrade(&realm)?;
                commit(&realm, NavigationMethod::Reload, realm.url());
                Ok(())
            })
        };

        Self {
            href: Accessor {
                get: Binding::new("location.href:get", Capability::native("get href", "Function", href_get)),
                set: Binding::new(
                    "location.href:set",
                    Capability::native("set href", "Function", navigate(realm.clone(), NavigationMethod::Assign)),
                ),
            },
            assign: Binding::new(
                "location.assign",
                Capability::native("assign", "Function", navigate(realm.clone(), NavigationMethod::Assign)),
            ),
            replace: Binding::new(
                "location.replace",
                Capability::native("replace", "Function", navigate(realm, NavigationMethod::Replace)),
            ),
            reload: Binding::new("location.reload", Capability::native("reload", "Function", reload)),
        }
    }
}

impl HistorySurface {
    pub(crate) fn native(realm: Weak<Realm>) -> Self {
        let go: Arc<HistoryGoFn> = {
            let realm = realm.clone();
            Arc::new(move |delta: i64| -> Result<(), ScriptError> {
                let realm = upgrade(&realm)?;
                if delta == 0 {
                    commit(&realm, NavigationMethod::HistoryGo, realm.url());
                    return Ok(());
                }
                let target = realm.session.lock().traverse(delta);
                if let Some(url) = target {
                    commit(&realm, NavigationMethod::HistoryGo, url);
                }
                Ok(())
            })
        };

        Self {
            push_state: Binding::new(
                "history.pushState",
                Capability::native("pushState", "Function", history_state(realm.clone(), NavigationMethod::PushState)),
            ),
            replace_state: Binding::new(
                "history.replaceState",
                Capability::native(
                    "replaceState",
                    "Function",
                    history_state(realm, NavigationMethod::ReplaceState),
                ),
            ),
            go: Binding::new("history.go", Capability::native("go", "Function", go)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn session_history_truncates_forward_entries() {
        let mut session = SessionHistory::new(url("https://a.test/1"));
        session.push(url("https://a.test/2"));
        session.push(url("https://a.test/3"));
        assert_eq!(session.traverse(-2), Some(url("https://a.test/1")));
        session.push(url("https://a.test/4"));
        assert_eq!(session.traverse(1), None);
        assert_eq!(session.traverse(-1), Some(url("https://a.test/1")));
        session.replace(url("https://a.test/0"));
        assert_eq!(session.traverse(1), Some(url("https://a.test/4")));
    }
}
