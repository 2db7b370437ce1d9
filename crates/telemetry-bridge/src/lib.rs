//! Telemetry Reporter and the message protocol spoken with the external settings/statistics
//! collaborator.

pub mod collaborator;
pub mod protocol;
pub mod reporter;

use thiserror::Error;

pub use collaborator::{
    serve, ChannelCollaborator, Collaborator, Envelope, InMemoryCollaborator, LogRecord,
};
pub use protocol::{CollaboratorMessage, CollaboratorReply, ProtectionMode, ProtectionSettings};
pub use reporter::{TelemetryReporter, TelemetryStats};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("collaborator queue is full")]
    Busy,
    #[error("timeout")]
    Timeout,
    #[error("channel closed")]
    ChannelClosed,
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}
