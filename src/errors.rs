//! Error types for submitting, finalizing and waiting on operations

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Decision, OperationId};

/// What caused an operation to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The participant rejected the operation or its finalization
    Rejected,
    /// The channel was torn down while the operation was pending
    ChannelClosed,
    /// A commit/rollback decision could not be transmitted
    SendFailed,
}

/// Failure carried by a `FAILED` notification or synthesized locally
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescription {
    /// Failure category
    pub kind: FailureKind,
    /// Human readable description
    pub message: Box<str>,
}

impl FailureDescription {
    /// Failure reported by the participant
    pub fn rejected(message: impl Into<Box<str>>) -> Self {
        Self {
            kind: FailureKind::Rejected,
            message: message.into(),
        }
    }

    /// Synthetic failure injected by the channel-closed sweep
    pub fn channel_closed() -> Self {
        Self {
            kind: FailureKind::ChannelClosed,
            message: "channel closed before the operation finished".into(),
        }
    }

    /// Synthetic failure for an undeliverable decision
    pub fn send_failed(decision: Decision, reason: &str) -> Self {
        Self {
            kind: FailureKind::SendFailed,
            message: format!("failed to send {}: {}", decision, reason).into(),
        }
    }

    /// Check if the channel went away
    pub fn is_channel_closed(&self) -> bool {
        self.kind == FailureKind::ChannelClosed
    }
}

impl std::fmt::Display for FailureDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors returned to callers of the client and its handles
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The channel could not take the execute message
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(Box<str>),

    /// The operation could not be encoded
    #[error("Failed to encode operation: {0}")]
    Serialization(Box<str>),

    #[error("Failed to send {decision} for operation {id}: {reason}")]
    /// A decision could not be sent; the operation is now failed
    SendFailed {
        /// Operation the decision was for
        id: OperationId,
        /// Decision that was refused
        decision: Decision,
        /// Channel's reason
        reason: Box<str>,
    },

    /// A decision was already made, or the operation already ended
    #[error("Operation {0} already finalized")]
    AlreadyFinalized(OperationId),

    /// The channel closed while waiting for prepare
    #[error("Channel closed before operation {0} was prepared")]
    ChannelClosed(OperationId),

    /// The channel refused the client's handler
    #[error("Failed to register client on channel: {0}")]
    Registration(#[source] ChannelError),

    /// A wait timed out or was interrupted
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Errors from blocking or async waits. The operation itself is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// No answer within the given duration
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Another thread called `interrupt`
    #[error("Wait interrupted")]
    Interrupted,
}

/// Errors a channel association reports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The association is no longer open
    #[error("Channel closed")]
    Closed,

    /// The transport refused the message
    #[error("Send error: {0}")]
    Send(Box<str>),

    /// `add_handler` was called twice
    #[error("A handler is already registered on this channel")]
    HandlerAlreadyRegistered,
}
