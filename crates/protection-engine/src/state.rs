use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tabguard_core_types::{ContextId, NodeId};
use tokio::time::Instant;

/// Mutable protection state of one execution context. Never shared between contexts.
#[derive(Debug)]
pub struct ContextState {
    context: ContextId,
    blocked: AtomicU64,
    processed: Mutex<HashSet<NodeId>>,
    armed_until: Mutex<Option<Instant>>,
    installed: AtomicBool,
}

impl ContextState {
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            blocked: AtomicU64::new(0),
            processed: Mutex::new(HashSet::new()),
            armed_until: Mutex::new(None),
            installed: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn blocked_count(&self) -> u64 {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Counts one blocked event and returns the new total.
    pub fn record_block(&self) -> u64 {
        self.blocked.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records `node`; `false` when it had already been seen.
    pub fn mark_processed(&self, node: NodeId) -> bool {
        self.processed.lock().insert(node)
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.lock().contains(&node)
    }

    /// Opens (or extends) the interaction window.
    pub fn arm(&self, window: Duration) {
        *self.armed_until.lock() = Some(Instant::now() + window);
    }

    /// Whether the interaction window is open. An expired window is cleared on read.
    pub fn is_armed(&self) -> bool {
        let mut armed_until = self.armed_until.lock();
        match *armed_until {
            Some(expiry) if Instant::now() < expiry => true,
            Some(_) => {
                *armed_until = None;
                false
            }
            None => false,
        }
    }

    /// The one-time installation marker: `true` only for the first caller.
    pub fn mark_installed(&self) -> bool {
        self.installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_marker_is_set_exactly_once() {
        let state = ContextState::new(ContextId::new());
        assert!(!state.is_installed());
        assert!(state.mark_installed());
        assert!(!state.mark_installed());
        assert!(state.is_installed());
    }

    #[test]
    fn processed_registry_deduplicates() {
        let state = ContextState::new(ContextId::new());
        assert!(state.mark_processed(NodeId(3)));
        assert!(!state.mark_processed(NodeId(3)));
        assert!(state.is_processed(NodeId(3)));
        assert!(!state.is_processed(NodeId(4)));
    }

    #[test]
    fn counter_only_grows() {
        let state = ContextState::new(ContextId::new());
        let totals: Vec<u64> = (0..5).map(|_| state.record_block()).collect();
        assert_eq!(totals, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.blocked_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn interaction_window_expires() {
        let state = ContextState::new(ContextId::new());
        assert!(!state.is_armed());
        state.arm(Duration::from_millis(1000));
        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(state.is_armed());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!state.is_armed());
    }
}
