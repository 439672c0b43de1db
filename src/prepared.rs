//! Handle to an operation whose prepare phase has finished

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientShared;
use crate::outcome::{OperationOutcome, OutcomeCell};
use crate::{ClientConfig, ClientError, Decision, FailureDescription, ModelValue, OperationId, WaitError};

/// Outcome of the prepare phase for one operation.
///
/// The participant holds the change pending until exactly one of
/// [`commit`](Self::commit) or [`rollback`](Self::rollback) is called. Clones
/// share the same decision state, so the exactly-once rule spans all clones.
///
/// A *failed* handle stands in for an operation that never got prepared (the
/// participant rejected it, or the channel closed first). It reports
/// [`is_failed`](Self::is_failed), its final outcome is already resolved, and it
/// refuses both decisions.
#[derive(Clone)]
pub struct PreparedOperation {
    inner: Arc<PreparedInner>,
}

struct PreparedInner {
    id: OperationId,
    prepared_result: ModelValue,
    failure: Option<FailureDescription>,
    client: Option<Arc<ClientShared>>,
    finalized: AtomicBool,
    outcome: Arc<OutcomeCell>,
}

impl PreparedOperation {
    pub(crate) fn new(
        id: OperationId,
        prepared_result: ModelValue,
        client: Arc<ClientShared>,
        outcome: Arc<OutcomeCell>,
    ) -> Self {
        Self {
            inner: Arc::new(PreparedInner {
                id,
                prepared_result,
                failure: None,
                client: Some(client),
                finalized: AtomicBool::new(false),
                outcome,
            }),
        }
    }

    /// Handle for an operation that failed before it was prepared
    pub fn failed(id: OperationId, failure: FailureDescription) -> Self {
        Self {
            inner: Arc::new(PreparedInner {
                id,
                prepared_result: ModelValue::failed(&failure.message),
                outcome: Arc::new(OutcomeCell::resolved(OperationOutcome::Failed(failure.clone()))),
                failure: Some(failure),
                client: None,
                finalized: AtomicBool::new(true),
            }),
        }
    }

    /// Operation this handle decides
    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    /// The participant's provisional result
    pub fn prepared_result(&self) -> &ModelValue {
        &self.inner.prepared_result
    }

    /// Whether this stands in for an operation that never got prepared
    pub fn is_failed(&self) -> bool {
        self.inner.failure.is_some()
    }

    /// Why the operation never got prepared, for failed handles
    pub fn failure(&self) -> Option<&FailureDescription> {
        self.inner.failure.as_ref()
    }

    /// Make the prepared change durable.
    ///
    /// # Errors
    ///
    /// * [`ClientError::AlreadyFinalized`] if a decision was already made on
    ///   this handle or the operation is no longer pending
    /// * [`ClientError::SendFailed`] if the decision could not be sent; the
    ///   operation is then failed
    pub fn commit(&self) -> Result<(), ClientError> {
        self.decide(Decision::Commit)
    }

    /// Discard the prepared change. Same contract as [`commit`](Self::commit).
    pub fn rollback(&self) -> Result<(), ClientError> {
        self.decide(Decision::Rollback)
    }

    fn decide(&self, decision: Decision) -> Result<(), ClientError> {
        let Some(client) = &self.inner.client else {
            return Err(ClientError::AlreadyFinalized(self.inner.id));
        };
        if self.inner.finalized.swap(true, Ordering::AcqRel) {
            tracing::warn!(operation_id = %self.inner.id, decision = %decision, "Decision already made on this handle");
            return Err(ClientError::AlreadyFinalized(self.inner.id));
        }
        client.decide(self.inner.id, decision)
    }

    /// Whether the terminal outcome is known
    pub fn is_done(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// The terminal outcome, if already known
    pub fn final_outcome_now(&self) -> Option<OperationOutcome> {
        self.inner.outcome.get()
    }

    /// Run `listener` with the terminal outcome, immediately if it is already known.
    ///
    /// Runs on whichever thread delivers the terminal notification.
    pub fn on_final_outcome<F>(&self, listener: F)
    where
        F: FnOnce(&OperationOutcome) + Send + 'static,
    {
        self.inner.outcome.subscribe(Box::new(listener));
    }

    /// Block until the terminal outcome arrives or `timeout` elapses.
    ///
    /// Do not call this from inside an [`OperationListener`](crate::OperationListener)
    /// callback: the outcome is delivered on that same path.
    ///
    /// # Errors
    ///
    /// * [`WaitError::Timeout`] if no outcome arrived in time
    /// * [`WaitError::Interrupted`] if [`interrupt`](Self::interrupt) was called meanwhile
    pub fn await_final_outcome(&self, timeout: Duration) -> Result<OperationOutcome, WaitError> {
        self.inner.outcome.wait_timeout(timeout)
    }

    /// Wake threads blocked in [`await_final_outcome`](Self::await_final_outcome)
    /// on this operation with [`WaitError::Interrupted`]. The operation itself
    /// is unaffected.
    pub fn interrupt(&self) {
        self.inner.outcome.interrupt();
    }

    /// [`await_final_outcome`](Self::await_final_outcome) with the client's configured bound
    pub fn await_default_final_outcome(&self) -> Result<OperationOutcome, WaitError> {
        let timeout = match &self.inner.client {
            Some(client) => client.config().final_outcome_timeout(),
            None => ClientConfig::default().final_outcome_timeout(),
        };
        self.await_final_outcome(timeout)
    }

    /// Wait for the terminal outcome. Cancel by dropping the future.
    pub async fn final_outcome(&self) -> OperationOutcome {
        self.inner.outcome.wait().await
    }
}

impl std::fmt::Debug for PreparedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedOperation")
            .field("id", &self.inner.id)
            .field("prepared_result", &self.inner.prepared_result)
            .field("failure", &self.inner.failure)
            .field("done", &self.is_done())
            .finish()
    }
}
