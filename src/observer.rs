//! Operation observer trait

use crate::{Decision, FailureDescription, OperationId};

/// Inbound notification that does not fit the protocol.
///
/// Absorbed by the client: logged, counted, passed to the observer, never returned to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Notification for an id this client never allocated
    UnknownOperation {
        /// Id in the notification
        id: OperationId,
        /// Notification kind
        kind: &'static str,
    },
    /// `COMPLETED` for an operation that was never prepared
    CompletedBeforePrepared {
        /// Operation still waiting on prepare
        id: OperationId,
    },
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperation { id, kind } => {
                write!(f, "{} notification for unknown operation {}", kind, id)
            }
            Self::CompletedBeforePrepared { id } => {
                write!(f, "completed notification for operation {} before it was prepared", id)
            }
        }
    }
}

/// Observer trait for external observability
pub trait OperationObserver: Send + Sync + 'static {
    /// Execute handed to the channel
    fn on_submitted(&self, id: OperationId);
    /// Prepare finished, `elapsed_millis` after submission
    fn on_prepared(&self, id: OperationId, elapsed_millis: u64);
    /// Commit or rollback handed to the channel
    fn on_decision_sent(&self, id: OperationId, decision: Decision);
    /// Participant finalized the operation
    fn on_completed(&self, id: OperationId, elapsed_millis: u64);
    /// Operation ended failed
    fn on_failed(&self, id: OperationId, failure: &FailureDescription);
    /// Notification dropped as a protocol violation
    fn on_protocol_violation(&self, violation: &ProtocolViolation);
    /// Channel closed with `pending` operations still open
    fn on_channel_closed(&self, pending: usize);
}

/// No-op observer
pub struct NoOpObserver;

impl OperationObserver for NoOpObserver {
    fn on_submitted(&self, _id: OperationId) {}
    fn on_prepared(&self, _id: OperationId, _elapsed_millis: u64) {}
    fn on_decision_sent(&self, _id: OperationId, _decision: Decision) {}
    fn on_completed(&self, _id: OperationId, _elapsed_millis: u64) {}
    fn on_failed(&self, _id: OperationId, _failure: &FailureDescription) {}
    fn on_protocol_violation(&self, _violation: &ProtocolViolation) {}
    fn on_channel_closed(&self, _pending: usize) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl OperationObserver for TracingObserver {
    fn on_submitted(&self, id: OperationId) {
        tracing::debug!(operation_id = %id, "Operation submitted");
    }

    fn on_prepared(&self, id: OperationId, elapsed_millis: u64) {
        tracing::info!(operation_id = %id, elapsed_ms = elapsed_millis, "Operation prepared");
    }

    fn on_decision_sent(&self, id: OperationId, decision: Decision) {
        tracing::info!(operation_id = %id, decision = %decision, "Decision sent");
    }

    fn on_completed(&self, id: OperationId, elapsed_millis: u64) {
        tracing::info!(operation_id = %id, elapsed_ms = elapsed_millis, "Operation completed");
    }

    fn on_failed(&self, id: OperationId, failure: &FailureDescription) {
        tracing::warn!(operation_id = %id, kind = ?failure.kind, error = %failure, "Operation failed");
    }

    fn on_protocol_violation(&self, violation: &ProtocolViolation) {
        tracing::warn!(violation = %violation, "Protocol violation");
    }

    fn on_channel_closed(&self, pending: usize) {
        tracing::warn!(pending = pending, "Channel closed, failing pending operations");
    }
}
