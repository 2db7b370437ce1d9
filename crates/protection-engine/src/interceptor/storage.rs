use std::sync::Arc;

use tabguard_core_types::{GuardError, GuardKind};
use tabguard_realm::globals::StorageSetFn;
use tabguard_realm::{Realm, ScriptError, StorageArea};

use crate::guard::{wrap_binding, Guard};

/// Fuzzy matcher for storage keys used to coordinate tabs of the same site.
#[derive(Clone, Debug)]
pub struct SuspiciousKeys {
    fragments: Vec<String>,
}

impl SuspiciousKeys {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|fragment| normalize_key(fragment.as_ref()))
                .filter(|fragment| !fragment.is_empty())
                .collect(),
        }
    }

    /// Case- and separator-insensitive substring match.
    pub fn is_suspicious(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.fragments.iter().any(|fragment| key.contains(fragment.as_str()))
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ':') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn install(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::StorageWrite, &realm.globals().storage_set_item, move |native| {
        let set_item: Arc<StorageSetFn> = Arc::new(
            move |area: &StorageArea, key: &str, value: &str| -> Result<(), ScriptError> {
                if guard.shared.keys.is_suspicious(key) {
                    guard.block(GuardKind::StorageWrite, format!("discarded storage write to '{key}'"));
                    return Ok(());
                }
                (native.func())(area, key, value)
            },
        );
        set_item
    })
}
