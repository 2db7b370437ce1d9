use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tabguard_core_types::{LogEvent, LogLevel};
use tracing::{debug, info, warn};

use crate::collaborator::Collaborator;
use crate::protocol::CollaboratorMessage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Fire-and-forget delivery of log events and blocked-event counts.
///
/// Every record is mirrored to `tracing` and then attempted exactly once against the
/// collaborator on the ambient tokio runtime. Failures are counted and otherwise ignored.
#[derive(Clone)]
pub struct TelemetryReporter {
    collaborator: Option<Arc<dyn Collaborator>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for TelemetryReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryReporter")
            .field("connected", &self.collaborator.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

impl TelemetryReporter {
    pub fn new(collaborator: Arc<dyn Collaborator>) -> Self {
        Self {
            collaborator: Some(collaborator),
            counters: Arc::default(),
        }
    }

    /// A reporter that only writes to `tracing`.
    pub fn detached() -> Self {
        Self {
            collaborator: None,
            counters: Arc::default(),
        }
    }

    pub fn report(&self, event: LogEvent) {
        match event.level {
            LogLevel::Info => info!(context = %event.context_url, "{}", event.message),
            LogLevel::Warn => warn!(context = %event.context_url, "{}", event.message),
        }
        self.deliver(CollaboratorMessage::log_entry(&event));
    }

    pub fn report_blocked(&self, url: &str) {
        self.deliver(CollaboratorMessage::IncrementBlocked {
            url: url.to_string(),
        });
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, message: CollaboratorMessage) {
        let Some(collaborator) = self.collaborator.clone() else {
            return;
        };
        let counters = Arc::clone(&self.counters);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(kind = message.kind(), "no runtime; telemetry dropped");
            return;
        };
        runtime.spawn(async move {
            let kind = message.kind();
            match collaborator.send(message).await {
                Ok(_) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(kind, error = %err, "telemetry dropped");
                }
            }
        });
    }
}
