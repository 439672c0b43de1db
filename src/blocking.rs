//! Blocking wait for the prepare phase

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{FailureDescription, ModelValue, OperationId, OperationListener, PreparedOperation, WaitError};

/// Listener that turns the asynchronous prepare callback into a blocking call.
///
/// Single use: pass one instance to one `execute`. The first
/// `operation_prepared` or pre-prepare `operation_failed` fills the slot;
/// a failure fills it with a [failed handle](PreparedOperation::failed), so a
/// channel close always releases the waiter. Later callbacks are informational;
/// use the handle's final-outcome methods for the terminal result.
///
/// Single consumer: retrieving concurrently from two threads is not supported.
pub struct BlockingOperationListener {
    slot: Mutex<Slot>,
    filled: Condvar,
}

#[derive(Default)]
struct Slot {
    prepared: Option<PreparedOperation>,
    interrupted: bool,
}

impl BlockingOperationListener {
    /// An empty, single-use listener
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            filled: Condvar::new(),
        }
    }

    /// Block until the operation is prepared or failed.
    ///
    /// Calling again after success returns the same handle without blocking.
    ///
    /// # Errors
    ///
    /// * [`WaitError::Interrupted`] if [`interrupt`](Self::interrupt) was called
    pub fn retrieve_prepared_operation(&self) -> Result<PreparedOperation, WaitError> {
        self.retrieve(None)
    }

    /// Like [`retrieve_prepared_operation`](Self::retrieve_prepared_operation), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// * [`WaitError::Timeout`] if nothing arrived in time
    /// * [`WaitError::Interrupted`] if [`interrupt`](Self::interrupt) was called
    pub fn retrieve_prepared_operation_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PreparedOperation, WaitError> {
        self.retrieve(Some(timeout))
    }

    /// Wake a blocked retrieval with [`WaitError::Interrupted`].
    ///
    /// The interrupt is consumed by the retrieval it wakes; if nobody is
    /// waiting, the next retrieval that would block fails instead.
    pub fn interrupt(&self) {
        self.slot.lock().interrupted = true;
        self.filled.notify_all();
    }

    /// Whether the slot has been filled
    pub fn is_ready(&self) -> bool {
        self.slot.lock().prepared.is_some()
    }

    fn retrieve(&self, timeout: Option<Duration>) -> Result<PreparedOperation, WaitError> {
        // A deadline past what `Instant` can represent waits untimed
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut slot = self.slot.lock();
        loop {
            if let Some(prepared) = &slot.prepared {
                return Ok(prepared.clone());
            }
            if slot.interrupted {
                slot.interrupted = false;
                return Err(WaitError::Interrupted);
            }
            match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    let timed_out = self.filled.wait_until(&mut slot, deadline).timed_out();
                    if timed_out && slot.prepared.is_none() && !slot.interrupted {
                        return Err(WaitError::Timeout(timeout));
                    }
                }
                _ => self.filled.wait(&mut slot),
            }
        }
    }

    fn fill(&self, prepared: PreparedOperation) {
        {
            let mut slot = self.slot.lock();
            if slot.prepared.is_some() {
                return;
            }
            slot.prepared = Some(prepared);
        }
        self.filled.notify_all();
    }
}

impl Default for BlockingOperationListener {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationListener for BlockingOperationListener {
    fn operation_prepared(&self, prepared: PreparedOperation) {
        self.fill(prepared);
    }

    fn operation_failed(&self, id: OperationId, failure: FailureDescription) {
        // No-op when already prepared; the handle carries the terminal outcome
        self.fill(PreparedOperation::failed(id, failure));
    }

    fn operation_complete(&self, id: OperationId, _result: ModelValue) {
        tracing::trace!(operation_id = %id, "Blocking listener saw completion");
    }
}
