use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{CollaboratorMessage, CollaboratorReply, ProtectionSettings};
use crate::BridgeError;

/// Retained diagnostic log entries; older entries are dropped first.
const MAX_LOG_ENTRIES: usize = 500;

/// The external settings/statistics store, seen from the engine.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn send(&self, message: CollaboratorMessage) -> Result<CollaboratorReply, BridgeError>;

    async fn settings(&self) -> Result<ProtectionSettings, BridgeError> {
        match self.send(CollaboratorMessage::GetSettings).await? {
            CollaboratorReply::Settings(settings) => Ok(settings),
            other => Err(BridgeError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    async fn should_protect(&self, url: &str) -> Result<bool, BridgeError> {
        let message = CollaboratorMessage::ShouldProtect {
            url: url.to_string(),
        };
        match self.send(message).await? {
            CollaboratorReply::ShouldProtect { protect } => Ok(protect),
            other => Err(BridgeError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

/// One request in flight over a [`ChannelCollaborator`].
#[derive(Debug)]
pub struct Envelope {
    pub req_id: Uuid,
    pub message: CollaboratorMessage,
    pub reply: oneshot::Sender<CollaboratorReply>,
}

/// Message-passing client: requests travel over an mpsc queue and answers come back on a
/// per-request oneshot.
#[derive(Clone)]
pub struct ChannelCollaborator {
    sender: mpsc::Sender<Envelope>,
    deadline: Duration,
}

impl ChannelCollaborator {
    pub fn new(capacity: usize, deadline: Duration) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, deadline }, receiver)
    }
}

#[async_trait]
impl Collaborator for ChannelCollaborator {
    async fn send(&self, message: CollaboratorMessage) -> Result<CollaboratorReply, BridgeError> {
        let (reply, answer) = oneshot::channel();
        let envelope = Envelope {
            req_id: Uuid::new_v4(),
            message,
            reply,
        };
        self.sender
            .try_send(envelope)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => BridgeError::Busy,
                mpsc::error::TrySendError::Closed(_) => BridgeError::ChannelClosed,
            })?;
        match tokio::time::timeout(self.deadline, answer).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => Err(BridgeError::Timeout),
        }
    }
}

/// Answers envelopes from `receiver` with `handler` until every sender is gone.
pub fn serve(
    mut receiver: mpsc::Receiver<Envelope>,
    handler: Arc<dyn Collaborator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = receiver.recv().await {
            let kind = envelope.message.kind();
            match handler.send(envelope.message).await {
                Ok(reply) => {
                    if envelope.reply.send(reply).is_err() {
                        debug!(req_id = %envelope.req_id, kind, "requester went away");
                    }
                }
                Err(err) => warn!(req_id = %envelope.req_id, kind, error = %err, "collaborator failed"),
            }
        }
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub url: String,
}

/// Settings and statistics kept in memory: blocked counts per host and a bounded log.
#[derive(Default)]
pub struct InMemoryCollaborator {
    settings: RwLock<ProtectionSettings>,
    blocked: DashMap<String, u64>,
    logs: Mutex<Vec<LogRecord>>,
}

impl InMemoryCollaborator {
    pub fn new(settings: ProtectionSettings) -> Arc<Self> {
        Arc::new(Self {
            settings: RwLock::new(settings),
            ..Self::default()
        })
    }

    pub fn update_settings(&self, settings: ProtectionSettings) {
        *self.settings.write() = settings;
    }

    pub fn blocked_for(&self, url: &str) -> u64 {
        self.blocked.get(&stat_key(url)).map(|count| *count).unwrap_or(0)
    }

    pub fn total_blocked(&self) -> u64 {
        self.blocked.iter().map(|entry| *entry.value()).sum()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().clone()
    }
}

fn stat_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl Collaborator for InMemoryCollaborator {
    async fn send(&self, message: CollaboratorMessage) -> Result<CollaboratorReply, BridgeError> {
        let reply = match message {
            CollaboratorMessage::GetSettings => CollaboratorReply::Settings(self.settings.read().clone()),
            CollaboratorMessage::ShouldProtect { url } => CollaboratorReply::ShouldProtect {
                protect: self.settings.read().should_protect(&url),
            },
            CollaboratorMessage::IncrementBlocked { url } => {
                *self.blocked.entry(stat_key(&url)).or_insert(0) += 1;
                CollaboratorReply::Ack
            }
            CollaboratorMessage::LogEntry {
                level, message, url, ..
            } => {
                let mut logs = self.logs.lock();
                logs.push(LogRecord {
                    level: level.as_str().to_string(),
                    message,
                    url,
                });
                if logs.len() > MAX_LOG_ENTRIES {
                    let excess = logs.len() - MAX_LOG_ENTRIES;
                    logs.drain(..excess);
                }
                CollaboratorReply::Ack
            }
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtectionMode;

    #[tokio::test]
    async fn channel_round_trip_reaches_the_store() {
        let store = InMemoryCollaborator::new(ProtectionSettings {
            mode: ProtectionMode::Selected,
            enabled_sites: vec!["example.com".into()],
        });
        let (client, receiver) = ChannelCollaborator::new(8, Duration::from_secs(1));
        let server = serve(receiver, store.clone());

        assert!(client.should_protect("https://example.com/x").await.unwrap());
        assert!(!client.should_protect("https://other.test/").await.unwrap());
        client
            .send(CollaboratorMessage::IncrementBlocked {
                url: "https://example.com/a".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.blocked_for("https://example.com/b"), 1);
        assert_eq!(client.settings().await.unwrap().mode, ProtectionMode::Selected);

        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (client, receiver) = ChannelCollaborator::new(1, Duration::from_millis(50));
        drop(receiver);
        let err = client.send(CollaboratorMessage::GetSettings).await.unwrap_err();
        assert!(matches!(err, BridgeError::ChannelClosed));
    }

    #[tokio::test]
    async fn log_is_bounded() {
        let store = InMemoryCollaborator::new(ProtectionSettings::default());
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            store
                .send(CollaboratorMessage::LogEntry {
                    level: tabguard_core_types::LogLevel::Info,
                    message: format!("entry {i}"),
                    url: "https://example.com/".into(),
                    timestamp: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }
        let logs = store.logs();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(logs[0].message, "entry 5");
    }
}
