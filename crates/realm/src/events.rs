//! DOM-style event dispatch with capture and bubble phases.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tabguard_core_types::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Document,
    Node(NodeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

#[derive(Debug)]
pub struct Event {
    pub kind: String,
    pub target: EventTarget,
    pub is_trusted: bool,
    pub bubbles: bool,
    pub key: Option<String>,
    pub button: u16,
    pub modifiers: Modifiers,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
    immediate_stopped: Cell<bool>,
}

impl Event {
    pub fn new(kind: &str, target: EventTarget) -> Self {
        Self {
            kind: kind.to_string(),
            target,
            is_trusted: false,
            bubbles: true,
            key: None,
            button: 0,
            modifiers: Modifiers::default(),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
            immediate_stopped: Cell::new(false),
        }
    }

    /// An event produced by real user input rather than by script.
    pub fn trusted(kind: &str, target: EventTarget) -> Self {
        Self {
            is_trusted: true,
            ..Self::new(kind, target)
        }
    }

    pub fn key_down(key: &str, modifiers: Modifiers, target: EventTarget) -> Self {
        Self {
            key: Some(key.to_string()),
            modifiers,
            ..Self::trusted("keydown", target)
        }
    }

    pub fn non_bubbling(mut self) -> Self {
        self.bubbles = false;
        self
    }

    pub fn with_button(mut self, button: u16) -> Self {
        self.button = button;
        self
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn stop_immediate_propagation(&self) {
        self.propagation_stopped.set(true);
        self.immediate_stopped.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registration {
    id: ListenerId,
    target: EventTarget,
    kind: String,
    phase: Phase,
    listener: EventListener,
}

#[derive(Default)]
pub struct EventRegistry {
    next: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

/// What dispatch observed, for the caller performing the default action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub listeners_run: usize,
}

impl EventRegistry {
    pub fn add_listener(
        &self,
        target: EventTarget,
        kind: &str,
        phase: Phase,
        listener: EventListener,
    ) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            target,
            kind: kind.to_string(),
            phase,
            listener,
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    fn listeners_for(&self, target: EventTarget, kind: &str, phase: Phase) -> Vec<EventListener> {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.target == target && r.kind == kind && r.phase == phase)
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }

    /// Runs listeners along `path` (outermost first, the event target last).
    pub(crate) fn dispatch(&self, event: &Event, path: &[EventTarget]) -> DispatchOutcome {
        let mut run = 0;
        let Some((target, ancestors)) = path.split_last() else {
            return DispatchOutcome {
                default_prevented: event.default_prevented(),
                listeners_run: 0,
            };
        };

        let mut steps: Vec<(EventTarget, Phase)> = ancestors
            .iter()
            .map(|node| (*node, Phase::Capture))
            .collect();
        steps.push((*target, Phase::Capture));
        steps.push((*target, Phase::Bubble));
        if event.bubbles {
            steps.extend(ancestors.iter().rev().map(|node| (*node, Phase::Bubble)));
        }

        for (index, (node, phase)) in steps.into_iter().enumerate() {
            // Propagation stops between targets, never between the two at-target passes.
            if event.propagation_stopped() && !(index == ancestors.len() + 1 && node == *target) {
                break;
            }
            for listener in self.listeners_for(node, &event.kind, phase) {
                if event.immediate_stopped.get() {
                    break;
                }
                listener(event);
                run += 1;
            }
            if event.immediate_stopped.get() {
                break;
            }
        }

        DispatchOutcome {
            default_prevented: event.default_prevented(),
            listeners_run: run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> EventListener {
        let log = Arc::clone(log);
        Arc::new(move |_: &Event| log.lock().push(label))
    }

    #[test]
    fn capture_runs_outermost_first_then_bubbles_back() {
        let registry = EventRegistry::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let node = EventTarget::Node(NodeId(7));
        registry.add_listener(EventTarget::Window, "click", Phase::Bubble, push(&log, "window-bubble"));
        registry.add_listener(node, "click", Phase::Bubble, push(&log, "node"));
        registry.add_listener(EventTarget::Document, "click", Phase::Capture, push(&log, "doc-capture"));
        registry.add_listener(EventTarget::Window, "click", Phase::Capture, push(&log, "window-capture"));

        let outcome = registry.dispatch(
            &Event::trusted("click", node),
            &[EventTarget::Window, EventTarget::Document, node],
        );

        assert_eq!(
            *log.lock(),
            vec!["window-capture", "doc-capture", "node", "window-bubble"]
        );
        assert_eq!(outcome.listeners_run, 4);
    }

    #[test]
    fn immediate_stop_halts_everything_after_it() {
        let registry = EventRegistry::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add_listener(
            EventTarget::Window,
            "contextmenu",
            Phase::Capture,
            Arc::new(|event: &Event| event.stop_immediate_propagation()),
        );
        registry.add_listener(EventTarget::Window, "contextmenu", Phase::Capture, push(&log, "late-window"));
        registry.add_listener(EventTarget::Document, "contextmenu", Phase::Capture, push(&log, "page"));

        let outcome = registry.dispatch(
            &Event::trusted("contextmenu", EventTarget::Document),
            &[EventTarget::Window, EventTarget::Document],
        );

        assert!(log.lock().is_empty());
        assert!(!outcome.default_prevented);
        assert_eq!(outcome.listeners_run, 1);
    }
}
