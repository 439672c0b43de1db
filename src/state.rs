//! Per-operation phase tracking on the initiator side

use std::sync::Arc;

use crate::delivery::OperationDelivery;
use crate::{Decision, Operation, OperationId, OperationListener};

/// Phase of a pending operation.
///
/// `Submitted -> Prepared -> Completed | Failed`, plus `Submitted -> Failed`
/// when the participant rejects the operation before preparing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationPhase {
    /// Execute sent, waiting for the participant's prepare result
    Submitted,
    /// Prepared; waiting for a decision and then the participant's answer
    Prepared,
    /// Finalized by the participant
    Completed,
    /// Rejected, failed to finalize, or lost with the channel
    Failed,
}

impl OperationPhase {
    /// `Completed` and `Failed` have no outgoing edges
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: OperationPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Self::Submitted, Self::Prepared) | (Self::Prepared, Self::Completed) | (_, Self::Failed)
        )
    }
}

/// Bookkeeping for one in-flight operation
pub(crate) struct PendingOperation {
    pub operation: Operation,
    pub phase: OperationPhase,
    pub decision: Option<Decision>,
    pub delivery: Arc<OperationDelivery>,
    pub submitted_at_millis: u64,
}

impl PendingOperation {
    pub fn new(
        id: OperationId,
        operation: Operation,
        listener: Arc<dyn OperationListener>,
        now_millis: u64,
    ) -> Self {
        let delivery = Arc::new(OperationDelivery::new(
            id,
            listener,
            operation.message_handler().clone(),
        ));
        Self {
            operation,
            phase: OperationPhase::Submitted,
            decision: None,
            delivery,
            submitted_at_millis: now_millis,
        }
    }

    /// Move to `next` if the edge exists
    pub fn transition(&mut self, next: OperationPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            return false;
        }
        self.phase = next;
        true
    }

    pub fn elapsed_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.submitted_at_millis)
    }
}
