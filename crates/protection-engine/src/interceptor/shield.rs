//! Defeats page listeners that suppress context menus, selection, clipboard and devtools
//! shortcuts by stopping those events at the outermost capture point.

use std::sync::Arc;

use tabguard_realm::{Event, EventTarget, Modifiers, Phase, Realm};

pub const SHIELDED_EVENTS: &[&str] = &[
    "contextmenu",
    "selectstart",
    "copy",
    "cut",
    "paste",
    "dragstart",
];

const SHORTCUT_EVENTS: &[&str] = &["keydown", "keyup"];

pub fn is_devtools_shortcut(key: &str, modifiers: &Modifiers) -> bool {
    if key.eq_ignore_ascii_case("F12") {
        return true;
    }
    let command = modifiers.ctrl || modifiers.meta;
    if !command {
        return false;
    }
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "i" | "j" | "c" => modifiers.shift,
        "u" | "s" => true,
        _ => false,
    }
}

/// Registers the window-level capture listeners. The default action is left alone so the
/// browser's own menu, selection and shortcuts keep working.
pub(crate) fn install(realm: &Realm) {
    for kind in SHIELDED_EVENTS {
        realm.events().add_listener(
            EventTarget::Window,
            kind,
            Phase::Capture,
            Arc::new(|event: &Event| event.stop_immediate_propagation()),
        );
    }
    for kind in SHORTCUT_EVENTS {
        realm.events().add_listener(
            EventTarget::Window,
            kind,
            Phase::Capture,
            Arc::new(|event: &Event| {
                let shortcut = event
                    .key
                    .as_deref()
                    .map_or(false, |key| is_devtools_shortcut(key, &event.modifiers));
                if shortcut {
                    event.stop_immediate_propagation();
                }
            }),
        );
    }
}
