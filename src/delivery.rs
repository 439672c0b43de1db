//! Ordered, single-deliverer callback mailbox for one operation

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::outcome::{OperationOutcome, OutcomeCell};
use crate::{
    FailureDescription, MessageSeverity, ModelValue, OperationId, OperationListener,
    OperationMessageHandler, PreparedOperation,
};

/// A callback waiting to be handed to caller code
pub(crate) enum Callback {
    Prepared(PreparedOperation),
    Complete(ModelValue),
    Failed(FailureDescription),
    Report(MessageSeverity, Box<str>),
}

struct Mailbox {
    queued: VecDeque<Callback>,
    delivering: bool,
}

/// Serializes caller callbacks for one operation.
///
/// Callbacks are enqueued while the client's table lock is held, so the queue
/// order matches the order of phase transitions. Whoever enqueues into an idle
/// mailbox becomes the deliverer and drains it outside every lock; anyone
/// enqueueing meanwhile (including the deliverer itself, re-entrantly from a
/// listener) just leaves the callback for the active deliverer.
pub(crate) struct OperationDelivery {
    id: OperationId,
    listener: Arc<dyn OperationListener>,
    messages: Arc<dyn OperationMessageHandler>,
    outcome: Arc<OutcomeCell>,
    mailbox: Mutex<Mailbox>,
}

impl OperationDelivery {
    pub fn new(
        id: OperationId,
        listener: Arc<dyn OperationListener>,
        messages: Arc<dyn OperationMessageHandler>,
    ) -> Self {
        Self {
            id,
            listener,
            messages,
            outcome: Arc::new(OutcomeCell::new()),
            mailbox: Mutex::new(Mailbox {
                queued: VecDeque::new(),
                delivering: false,
            }),
        }
    }

    pub fn outcome(&self) -> &Arc<OutcomeCell> {
        &self.outcome
    }

    /// Queue a callback. Returns `true` if the caller must now [`drain`](Self::drain).
    pub fn enqueue(&self, callback: Callback) -> bool {
        let mut mailbox = self.mailbox.lock();
        mailbox.queued.push_back(callback);
        if mailbox.delivering {
            return false;
        }
        mailbox.delivering = true;
        true
    }

    /// Deliver queued callbacks until the mailbox is empty.
    ///
    /// Must only be called after [`enqueue`](Self::enqueue) returned `true`, and never with a lock held.
    pub fn drain(&self) {
        loop {
            let next = {
                let mut mailbox = self.mailbox.lock();
                match mailbox.queued.pop_front() {
                    Some(callback) => callback,
                    None => {
                        mailbox.delivering = false;
                        return;
                    }
                }
            };
            self.invoke(next);
        }
    }

    fn invoke(&self, callback: Callback) {
        match callback {
            Callback::Prepared(prepared) => {
                self.guarded("prepared", || self.listener.operation_prepared(prepared))
            }
            Callback::Complete(result) => {
                let delivered = result.clone();
                self.guarded("complete", || self.listener.operation_complete(self.id, delivered));
                self.outcome.resolve(OperationOutcome::Completed(result));
            }
            Callback::Failed(failure) => {
                let delivered = failure.clone();
                self.guarded("failed", || self.listener.operation_failed(self.id, delivered));
                self.outcome.resolve(OperationOutcome::Failed(failure));
            }
            Callback::Report(severity, text) => {
                self.guarded("report", || self.messages.handle_report(severity, &text))
            }
        }
    }

    /// Run caller code; a panic is logged and does not stall the mailbox
    fn guarded(&self, callback: &'static str, f: impl FnOnce()) {
        if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::error!(operation_id = %self.id, callback = callback, "Caller callback panicked");
        }
    }
}
