//! Propagation Guard: carries protection into nested frame realms.

use std::sync::Arc;

use tabguard_core_types::{GuardError, GuardKind, NodeId};
use tabguard_realm::globals::ContentWindowFn;
use tabguard_realm::{Event, EventTarget, MutationRecord, Phase, Realm, RealmAccess};
use tracing::debug;

use crate::engine::{install_into, InstallOutcome};
use crate::guard::{wrap_binding, Guard};

fn protect_child(guard: &Guard, child: &Arc<Realm>) {
    if child.access() == RealmAccess::Opaque {
        debug!(parent = %guard.state.context(), child = %child.id(), "cross-origin frame left alone");
        guard.note(format!("frame {} is cross-origin; not instrumented", child.url()));
        return;
    }
    match install_into(&guard.shared, child) {
        InstallOutcome::Installed(report) if !report.failed.is_empty() => guard.anomaly(format!(
            "frame {} instrumented with {} failed guard(s)",
            report.url,
            report.failed.len()
        )),
        InstallOutcome::Installed(report) => {
            debug!(parent = %guard.state.context(), child = %report.context, "frame instrumented")
        }
        InstallOutcome::AlreadyInstalled(_) => {}
    }
}

fn protect_frame_at(guard: &Guard, realm: &Realm, node: NodeId) {
    if let Some(child) = realm.document().element(node).and_then(|element| element.frame) {
        protect_child(guard, &child);
    }
}

pub(crate) fn install(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    // Frames that exist before installation.
    for node in realm.document().find_all(|element| element.is_frame()) {
        protect_frame_at(guard, realm, node);
    }

    {
        let guard = guard.clone();
        realm.document().observe(Arc::new(move |record: &MutationRecord| {
            if let Some(realm) = guard.realm() {
                protect_frame_at(&guard, &realm, record.node);
            }
        }));
    }

    {
        let guard = guard.clone();
        realm.events().add_listener(
            EventTarget::Window,
            "load",
            Phase::Capture,
            Arc::new(move |event: &Event| {
                let (EventTarget::Node(node), Some(realm)) = (event.target, guard.realm()) else {
                    return;
                };
                protect_frame_at(&guard, &realm, node);
            }),
        );
    }

    let guard = guard.clone();
    wrap_binding(GuardKind::Propagation, &realm.globals().content_window, move |native| {
        let getter: Arc<ContentWindowFn> = Arc::new(move |node: NodeId| -> Option<Arc<Realm>> {
            let child = (native.func())(node)?;
            protect_child(&guard, &child);
            Some(child)
        });
        getter
    })
}
