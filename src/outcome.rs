//! Terminal outcome of an operation and the cell that publishes it

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::{FailureDescription, ModelValue, WaitError};

/// Terminal result of an operation
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    /// The participant finalized the operation and returned this result
    Completed(ModelValue),
    /// The operation failed, remotely or through a local synthetic failure
    Failed(FailureDescription),
}

impl OperationOutcome {
    /// Whether the participant finalized the operation
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Final result, when completed
    pub fn result(&self) -> Option<&ModelValue> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    /// Failure, when failed
    pub fn failure(&self) -> Option<&FailureDescription> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

type OutcomeCallback = Box<dyn FnOnce(&OperationOutcome) + Send>;

/// Write-once cell holding an operation's outcome.
///
/// Blocking waiters park on the condvar, async waiters on the `Notify`.
/// Callbacks run on the resolving thread, outside the lock.
pub(crate) struct OutcomeCell {
    slot: Mutex<OutcomeSlot>,
    resolved: Condvar,
    notify: Notify,
}

#[derive(Default)]
struct OutcomeSlot {
    outcome: Option<OperationOutcome>,
    callbacks: Vec<OutcomeCallback>,
    interrupts: u64,
}

impl OutcomeCell {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(OutcomeSlot::default()),
            resolved: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub(crate) fn resolved(outcome: OperationOutcome) -> Self {
        let cell = Self::new();
        cell.slot.lock().outcome = Some(outcome);
        cell
    }

    /// Publish the outcome. Returns `false` if one was already published.
    pub(crate) fn resolve(&self, outcome: OperationOutcome) -> bool {
        let callbacks = {
            let mut slot = self.slot.lock();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome.clone());
            std::mem::take(&mut slot.callbacks)
        };
        self.resolved.notify_all();
        self.notify.notify_waiters();
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    pub(crate) fn get(&self) -> Option<OperationOutcome> {
        self.slot.lock().outcome.clone()
    }

    /// Run `callback` once the outcome is known; immediately if it already is.
    pub(crate) fn subscribe(&self, callback: OutcomeCallback) {
        let outcome = {
            let mut slot = self.slot.lock();
            match &slot.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    slot.callbacks.push(callback);
                    return;
                }
            }
        };
        callback(&outcome);
    }

    /// Block until resolved, `timeout` elapses, or [`interrupt`](Self::interrupt) is called
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Result<OperationOutcome, WaitError> {
        // A deadline past what `Instant` can represent means no deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock();
        let generation = slot.interrupts;
        loop {
            if let Some(outcome) = &slot.outcome {
                return Ok(outcome.clone());
            }
            if slot.interrupts != generation {
                return Err(WaitError::Interrupted);
            }
            match deadline {
                Some(deadline) => {
                    if self.resolved.wait_until(&mut slot, deadline).timed_out() {
                        return match &slot.outcome {
                            Some(outcome) => Ok(outcome.clone()),
                            None => Err(WaitError::Timeout(timeout)),
                        };
                    }
                }
                None => self.resolved.wait(&mut slot),
            }
        }
    }

    /// Wake every thread currently blocked in `wait_timeout` with `Interrupted`
    pub(crate) fn interrupt(&self) {
        self.slot.lock().interrupts += 1;
        self.resolved.notify_all();
    }

    pub(crate) async fn wait(&self) -> OperationOutcome {
        loop {
            // Register before checking so a resolve in between is not missed
            let notified = self.notify.notified();
            if let Some(outcome) = self.get() {
                return outcome;
            }
            notified.await;
        }
    }
}
