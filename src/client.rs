//! Initiator-side coordinator of transactional operations

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::now_millis;
use crate::delivery::{Callback, OperationDelivery};
use crate::messages::ExecutePayload;
use crate::state::PendingOperation;
use crate::stats::ClientStats;
use crate::{
    ChannelAssociation, ClientConfig, ClientError, ClientStatsSnapshot, Decision,
    FailureDescription, InboundMessage, MessageHandler, MessageSeverity, ModelValue, Operation,
    OperationId, OperationListener, OperationObserver, OperationPhase, OutboundMessage,
    PreparedOperation, ProtocolViolation,
};

/// Submits operations over one channel association and tracks them through
/// prepare and commit/rollback.
///
/// Create one with [`create_client`](crate::create_client). Dropping the
/// client (or calling [`close`](Self::close)) fails every still-pending
/// operation with a `ChannelClosed` failure.
pub struct TransactionalClient {
    shared: Arc<ClientShared>,
}

pub(crate) struct ClientShared {
    channel: Arc<dyn ChannelAssociation>,
    config: ClientConfig,
    observer: Arc<dyn OperationObserver>,
    stats: ClientStats,
    table: Mutex<OperationTable>,
}

/// The only mutable shared state. Never held across caller callbacks.
struct OperationTable {
    next_id: OperationId,
    closed: bool,
    pending: BTreeMap<OperationId, PendingOperation>,
}

/// Registered on the channel. Weak so the channel does not keep the client alive.
struct ClientHandler {
    shared: Weak<ClientShared>,
}

impl MessageHandler for ClientHandler {
    fn handle_message(&self, message: InboundMessage) {
        match self.shared.upgrade() {
            Some(shared) => shared.dispatch(message),
            None => tracing::debug!(kind = message.kind(), "Client dropped, ignoring notification"),
        }
    }
}

/// What an inbound notification resolved to, decided under the table lock
enum Resolution {
    Deliver {
        delivery: Arc<OperationDelivery>,
        drain: bool,
        elapsed_millis: u64,
    },
    /// No pending entry; `known` if the id was allocated by this client
    Unmatched { known: bool },
    /// Entry exists but the notification is not a valid edge from its phase
    OutOfOrder { phase: OperationPhase },
}

impl TransactionalClient {
    /// Build a client and register it as the channel's handler.
    ///
    /// # Errors
    ///
    /// * [`ClientError::Registration`] if the channel refuses the handler
    pub fn connect(
        channel: Arc<dyn ChannelAssociation>,
        config: ClientConfig,
        observer: Arc<dyn OperationObserver>,
    ) -> Result<Self, ClientError> {
        let shared = Arc::new(ClientShared {
            channel,
            config,
            observer,
            stats: ClientStats::new(),
            table: Mutex::new(OperationTable {
                next_id: OperationId::new(1),
                closed: false,
                pending: BTreeMap::new(),
            }),
        });
        let handler = Arc::new(ClientHandler {
            shared: Arc::downgrade(&shared),
        });
        shared
            .channel
            .add_handler(handler)
            .map_err(ClientError::Registration)?;
        tracing::debug!("Transactional client registered on channel");
        Ok(Self { shared })
    }

    /// Submit `operation`; `listener` receives its prepare and terminal callbacks.
    ///
    /// Returns as soon as the execute message is queued on the channel.
    ///
    /// # Errors
    ///
    /// * [`ClientError::ChannelUnavailable`] if the channel is not open, the
    ///   client is closed, or the channel refuses the message
    /// * [`ClientError::Serialization`] if the operation cannot be framed
    pub fn execute(
        &self,
        listener: Arc<dyn OperationListener>,
        operation: Operation,
    ) -> Result<OperationId, ClientError> {
        self.shared.execute(listener, operation)
    }

    /// Tear down: every pending operation fails with `ChannelClosed`, later
    /// submissions fail with `ChannelUnavailable`.
    pub fn close(&self) {
        self.shared.sweep();
    }

    /// Number of operations that have not reached a terminal phase
    pub fn pending_count(&self) -> usize {
        self.shared.table.lock().pending.len()
    }

    /// Phase of a pending operation; `None` once it is finished or if unknown
    pub fn phase_of(&self, id: OperationId) -> Option<OperationPhase> {
        self.shared.table.lock().pending.get(&id).map(|entry| entry.phase)
    }

    /// Whether [`close`](Self::close) ran or the channel reported closure
    pub fn is_closed(&self) -> bool {
        self.shared.table.lock().closed
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Current counter values
    pub fn stats(&self) -> ClientStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for TransactionalClient {
    fn drop(&mut self) {
        self.shared.sweep();
    }
}

impl std::fmt::Debug for TransactionalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalClient")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ClientShared {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn execute(
        &self,
        listener: Arc<dyn OperationListener>,
        operation: Operation,
    ) -> Result<OperationId, ClientError> {
        if !self.channel.is_open() {
            return Err(ClientError::ChannelUnavailable("channel is not open".into()));
        }
        let payload = ExecutePayload::encode(&operation, self.config.max_frame_bytes)?;

        let id = {
            let mut table = self.table.lock();
            if table.closed {
                return Err(ClientError::ChannelUnavailable("client is closed".into()));
            }
            let id = table.next_id;
            table.next_id = id.next();
            table
                .pending
                .insert(id, PendingOperation::new(id, operation, listener, now_millis()));
            id
        };
        ClientStats::incr(&self.stats.operations_submitted);
        self.observer.on_submitted(id);

        if let Err(e) = self.channel.send(OutboundMessage::Execute { id, payload }) {
            ClientStats::incr(&self.stats.send_failures);
            if self.table.lock().pending.remove(&id).is_none() {
                // Swept by a concurrent close; the listener already got its failure
                tracing::debug!(operation_id = %id, error = %e, "Execute send failed after sweep");
                return Ok(id);
            }
            tracing::warn!(operation_id = %id, error = %e, "Failed to send operation");
            return Err(ClientError::ChannelUnavailable(e.to_string().into()));
        }
        Ok(id)
    }

    /// Send the second-phase decision for a prepared operation
    pub(crate) fn decide(&self, id: OperationId, decision: Decision) -> Result<(), ClientError> {
        {
            let mut table = self.table.lock();
            let entry = match table.pending.get_mut(&id) {
                Some(entry) if entry.phase == OperationPhase::Prepared && entry.decision.is_none() => entry,
                _ => return Err(ClientError::AlreadyFinalized(id)),
            };
            entry.decision = Some(decision);
        }

        let message = match decision {
            Decision::Commit => OutboundMessage::Commit { id },
            Decision::Rollback => OutboundMessage::Rollback { id },
        };
        match self.channel.send(message) {
            Ok(()) => {
                match decision {
                    Decision::Commit => ClientStats::incr(&self.stats.commits_sent),
                    Decision::Rollback => ClientStats::incr(&self.stats.rollbacks_sent),
                }
                self.observer.on_decision_sent(id, decision);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                ClientStats::incr(&self.stats.send_failures);
                tracing::warn!(operation_id = %id, decision = %decision, error = %reason, "Failed to send decision");
                self.terminate(
                    id,
                    OperationPhase::Failed,
                    Callback::Failed(FailureDescription::send_failed(decision, &reason)),
                    "send_failed",
                );
                Err(ClientError::SendFailed {
                    id,
                    decision,
                    reason: reason.into(),
                })
            }
        }
    }

    fn dispatch(self: &Arc<Self>, message: InboundMessage) {
        tracing::trace!(kind = message.kind(), operation_id = ?message.id(), "Inbound notification");
        match message {
            InboundMessage::Prepared { id, result } => self.prepared(id, result),
            InboundMessage::Completed { id, result } => {
                self.terminate(id, OperationPhase::Completed, Callback::Complete(result), "completed")
            }
            InboundMessage::Failed { id, failure } => {
                self.terminate(id, OperationPhase::Failed, Callback::Failed(failure), "failed")
            }
            InboundMessage::Message { id, severity, text } => self.report(id, severity, text),
            InboundMessage::ChannelClosed => self.sweep(),
        }
    }

    fn prepared(self: &Arc<Self>, id: OperationId, result: ModelValue) {
        let resolution = {
            let mut table = self.table.lock();
            let known = id < table.next_id;
            match table.pending.get_mut(&id) {
                None => Resolution::Unmatched { known },
                Some(entry) => {
                    if !entry.transition(OperationPhase::Prepared) {
                        Resolution::OutOfOrder { phase: entry.phase }
                    } else {
                        let delivery = entry.delivery.clone();
                        let handle = PreparedOperation::new(
                            id,
                            result,
                            Arc::clone(self),
                            delivery.outcome().clone(),
                        );
                        let drain = delivery.enqueue(Callback::Prepared(handle));
                        Resolution::Deliver {
                            delivery,
                            drain,
                            elapsed_millis: entry.elapsed_millis(now_millis()),
                        }
                    }
                }
            }
        };

        match resolution {
            Resolution::Deliver {
                delivery,
                drain,
                elapsed_millis,
            } => {
                ClientStats::incr(&self.stats.operations_prepared);
                self.observer.on_prepared(id, elapsed_millis);
                if drain {
                    delivery.drain();
                }
            }
            Resolution::Unmatched { known } => self.unmatched(id, "prepared", known),
            Resolution::OutOfOrder { phase } => {
                ClientStats::incr(&self.stats.duplicate_notifications);
                tracing::debug!(operation_id = %id, phase = ?phase, "Duplicate prepared notification ignored");
            }
        }
    }

    /// Move `id` to a terminal phase, remove it and deliver `callback`
    fn terminate(&self, id: OperationId, next: OperationPhase, callback: Callback, kind: &'static str) {
        let failure = match &callback {
            Callback::Failed(failure) => Some(failure.clone()),
            _ => None,
        };
        let resolution = {
            let mut table = self.table.lock();
            let known = id < table.next_id;
            let refused = match table.pending.get_mut(&id) {
                None => Some(Resolution::Unmatched { known }),
                Some(entry) => {
                    if entry.transition(next) {
                        None
                    } else {
                        Some(Resolution::OutOfOrder { phase: entry.phase })
                    }
                }
            };
            match refused {
                Some(resolution) => resolution,
                None => match table.pending.remove(&id) {
                    Some(entry) => {
                        let drain = entry.delivery.enqueue(callback);
                        Resolution::Deliver {
                            elapsed_millis: entry.elapsed_millis(now_millis()),
                            delivery: entry.delivery,
                            drain,
                        }
                    }
                    None => Resolution::Unmatched { known },
                },
            }
        };

        match resolution {
            Resolution::Deliver {
                delivery,
                drain,
                elapsed_millis,
            } => {
                match next {
                    OperationPhase::Completed => {
                        ClientStats::incr(&self.stats.operations_completed);
                        self.observer.on_completed(id, elapsed_millis);
                    }
                    _ => {
                        ClientStats::incr(&self.stats.operations_failed);
                        if let Some(failure) = &failure {
                            self.observer.on_failed(id, failure);
                        }
                    }
                }
                if drain {
                    delivery.drain();
                }
            }
            Resolution::Unmatched { known } => self.unmatched(id, kind, known),
            Resolution::OutOfOrder { phase } => {
                let violation = ProtocolViolation::CompletedBeforePrepared { id };
                ClientStats::incr(&self.stats.protocol_violations);
                tracing::warn!(operation_id = %id, phase = ?phase, violation = %violation, "Out of order notification dropped");
                self.observer.on_protocol_violation(&violation);
            }
        }
    }

    fn report(&self, id: OperationId, severity: MessageSeverity, text: Box<str>) {
        let delivery = {
            let table = self.table.lock();
            table.pending.get(&id).map(|entry| {
                let drain = entry.delivery.enqueue(Callback::Report(severity, text));
                (entry.delivery.clone(), drain)
            })
        };
        match delivery {
            Some((delivery, true)) => delivery.drain(),
            Some((_, false)) => {}
            None => tracing::debug!(operation_id = %id, "Message for finished operation dropped"),
        }
    }

    fn unmatched(&self, id: OperationId, kind: &'static str, known: bool) {
        if known {
            // Finished already: a racing completion, a duplicate, or a reply after the sweep
            ClientStats::incr(&self.stats.duplicate_notifications);
            tracing::debug!(operation_id = %id, kind = kind, "Late notification for finished operation");
        } else {
            let violation = ProtocolViolation::UnknownOperation { id, kind };
            ClientStats::incr(&self.stats.protocol_violations);
            tracing::warn!(operation_id = %id, kind = kind, "Notification for unknown operation dropped");
            self.observer.on_protocol_violation(&violation);
        }
    }

    /// Fail every pending operation with `ChannelClosed`, in submission order
    fn sweep(&self) {
        let (swept, first_close) = {
            let mut table = self.table.lock();
            let first_close = !table.closed;
            table.closed = true;
            let swept: Vec<(OperationId, Arc<OperationDelivery>, bool)> = std::mem::take(&mut table.pending)
                .into_iter()
                .map(|(id, entry)| {
                    tracing::debug!(
                        operation_id = %id,
                        phase = ?entry.phase,
                        request = ?entry.operation.request(),
                        "Failing pending operation"
                    );
                    let drain = entry
                        .delivery
                        .enqueue(Callback::Failed(FailureDescription::channel_closed()));
                    (id, entry.delivery, drain)
                })
                .collect();
            (swept, first_close)
        };

        if first_close {
            ClientStats::incr(&self.stats.channel_closed_sweeps);
            self.observer.on_channel_closed(swept.len());
        }
        let failure = FailureDescription::channel_closed();
        for (id, delivery, drain) in swept {
            ClientStats::incr(&self.stats.operations_failed);
            self.observer.on_failed(id, &failure);
            if drain {
                delivery.drain();
            }
        }
    }
}
