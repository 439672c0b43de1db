//! Participant side: runs prepare/commit/rollback against a pluggable handler

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::now_millis;
use crate::messages::ExecutePayload;
use crate::transaction::{ParticipantTransaction, TransactionEntry};
use crate::{
    Decision, FailureDescription, InboundMessage, MessageHandler, MessageSeverity, ModelValue,
    OperationAttachments, OperationId, OutboundMessage, ParticipantEvent, ParticipantJournal,
};

/// What an operation does once it reaches the participant.
///
/// `prepare` validates and provisionally applies the request, holding the
/// change pending. Exactly one of `commit` / `rollback` follows for every
/// successful `prepare`.
///
/// # Example
///
/// ```rust,ignore
/// impl OperationHandler for ConfigStore {
///     fn prepare(&self, id: OperationId, request: &ModelValue, _attachments: &OperationAttachments,
///                reporter: &MessageReporter<'_>) -> Result<ModelValue, FailureDescription> {
///         reporter.info("validating");
///         self.stage(id, request)
///     }
///     fn commit(&self, id: OperationId) -> Result<ModelValue, FailureDescription> { self.apply(id) }
///     fn rollback(&self, id: OperationId) -> Result<ModelValue, FailureDescription> { self.discard(id) }
/// }
/// ```
pub trait OperationHandler: Send + Sync + 'static {
    /// Validate and provisionally apply the request
    fn prepare(
        &self,
        id: OperationId,
        request: &ModelValue,
        attachments: &OperationAttachments,
        reporter: &MessageReporter<'_>,
    ) -> Result<ModelValue, FailureDescription>;

    /// Make the prepared change durable
    fn commit(&self, id: OperationId) -> Result<ModelValue, FailureDescription>;

    /// Discard the prepared change
    fn rollback(&self, id: OperationId) -> Result<ModelValue, FailureDescription>;
}

/// Sends out-of-band messages back to the initiator while an operation runs
pub struct MessageReporter<'a> {
    id: OperationId,
    replies: &'a dyn MessageHandler,
}

impl MessageReporter<'_> {
    /// Send a message with the given severity
    pub fn report(&self, severity: MessageSeverity, text: &str) {
        self.replies.handle_message(InboundMessage::Message {
            id: self.id,
            severity,
            text: text.into(),
        });
    }

    /// Send an informational message
    pub fn info(&self, text: &str) {
        self.report(MessageSeverity::Info, text);
    }

    /// Send a warning
    pub fn warn(&self, text: &str) {
        self.report(MessageSeverity::Warn, text);
    }
}

/// Receives coordinator messages, drives the handler and answers with notifications.
///
/// Replies go to the `replies` handler passed with each message, typically the
/// transport's path back to the initiator. No lock is held while the handler
/// runs or while replies are sent.
pub struct ParticipantEndpoint<H: OperationHandler> {
    handler: H,
    journal: Arc<dyn ParticipantJournal>,
    transactions: Mutex<HashMap<OperationId, TransactionEntry>>,
}

impl<H: OperationHandler> ParticipantEndpoint<H> {
    /// Endpoint driving `handler`, recording to `journal`
    pub fn new(handler: H, journal: Arc<dyn ParticipantJournal>) -> Self {
        Self {
            handler,
            journal,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Ids currently held prepared, awaiting a decision
    pub fn prepared_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self
            .transactions
            .lock()
            .values()
            .filter(|entry| entry.is_prepared())
            .map(TransactionEntry::id)
            .collect();
        ids.sort();
        ids
    }

    /// Process one message from the coordinator
    pub fn handle(&self, message: OutboundMessage, replies: &dyn MessageHandler) {
        match message {
            OutboundMessage::Execute { id, payload } => self.execute(id, &payload, replies),
            OutboundMessage::Commit { id } => self.finalize(id, Decision::Commit, replies),
            OutboundMessage::Rollback { id } => self.finalize(id, Decision::Rollback, replies),
        }
    }

    fn execute(&self, id: OperationId, payload: &[u8], replies: &dyn MessageHandler) {
        let now = now_millis();
        {
            let mut transactions = self.transactions.lock();
            if transactions.contains_key(&id) {
                tracing::warn!(operation_id = %id, "Duplicate execute ignored");
                return;
            }
            transactions.insert(id, TransactionEntry::Received(ParticipantTransaction::new(id, now)));
        }
        self.record(id, ParticipantEvent::Received { received_at_millis: now });

        let prepared = match ExecutePayload::decode(payload) {
            Ok(payload) => {
                let reporter = MessageReporter { id, replies };
                self.handler
                    .prepare(id, &payload.request, &payload.attachments, &reporter)
            }
            Err(e) => Err(FailureDescription::rejected(format!("malformed operation: {}", e))),
        };

        let now = now_millis();
        match prepared {
            Ok(result) => {
                {
                    let mut transactions = self.transactions.lock();
                    if let Some(TransactionEntry::Received(tx)) = transactions.remove(&id) {
                        transactions.insert(id, TransactionEntry::Prepared(tx.prepare(now)));
                    }
                }
                self.record(id, ParticipantEvent::Prepared { prepared_at_millis: now });
                tracing::debug!(operation_id = %id, "Operation prepared");
                replies.handle_message(InboundMessage::Prepared { id, result });
            }
            Err(failure) => {
                self.transactions.lock().remove(&id);
                self.record(
                    id,
                    ParticipantEvent::Rejected {
                        failure: failure.clone(),
                        rejected_at_millis: now,
                    },
                );
                tracing::info!(operation_id = %id, error = %failure, "Operation rejected");
                replies.handle_message(InboundMessage::Failed { id, failure });
            }
        }
    }

    fn finalize(&self, id: OperationId, decision: Decision, replies: &dyn MessageHandler) {
        let tx = {
            let mut transactions = self.transactions.lock();
            match transactions.remove(&id) {
                Some(TransactionEntry::Prepared(tx)) => Some(tx),
                Some(other) => {
                    transactions.insert(id, other);
                    None
                }
                None => None,
            }
        };
        let Some(tx) = tx else {
            tracing::warn!(operation_id = %id, decision = %decision, "Decision for operation that is not prepared");
            replies.handle_message(InboundMessage::Failed {
                id,
                failure: FailureDescription::rejected(format!("no prepared operation {}", id)),
            });
            return;
        };

        let result = match decision {
            Decision::Commit => self.handler.commit(id),
            Decision::Rollback => self.handler.rollback(id),
        };
        let now = now_millis();
        match result {
            Ok(result) => {
                let (event, duration_ms) = match decision {
                    Decision::Commit => {
                        let done = tx.commit(now);
                        (ParticipantEvent::Committed { completed_at_millis: now }, done.duration_millis())
                    }
                    Decision::Rollback => {
                        let done = tx.roll_back(now);
                        (ParticipantEvent::RolledBack { completed_at_millis: now }, done.duration_millis())
                    }
                };
                self.record(id, event);
                tracing::debug!(operation_id = %id, decision = %decision, duration_ms = duration_ms, "Operation finalized");
                replies.handle_message(InboundMessage::Completed { id, result });
            }
            Err(failure) => {
                self.record(
                    id,
                    ParticipantEvent::FinalizeFailed {
                        decision,
                        failure: failure.clone(),
                        failed_at_millis: now,
                    },
                );
                tracing::warn!(operation_id = %id, decision = %decision, error = %failure, "Finalization failed");
                replies.handle_message(InboundMessage::Failed { id, failure });
            }
        }
    }

    fn record(&self, id: OperationId, event: ParticipantEvent) {
        if let Err(e) = self.journal.append(id, event) {
            tracing::error!(operation_id = %id, error = %e, "Failed to journal participant event");
        }
    }
}
