//! In-memory channels, listeners and handlers for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    ChannelAssociation, ChannelError, FailureDescription, InMemoryJournal, InboundMessage,
    MessageHandler, MessageReporter, MessageSeverity, ModelValue, OperationAttachments,
    OperationHandler, OperationId, OperationListener, OperationMessageHandler, OutboundMessage,
    ParticipantEndpoint, PreparedOperation,
};

/// Install a fmt subscriber filtered by `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Channel that records outbound messages and lets the test inject notifications
pub struct RecordingChannel {
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    open: AtomicBool,
    fail_sends: AtomicBool,
}

impl RecordingChannel {
    /// An open channel with no handler
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// A channel whose handshake never completed
    pub fn unopened() -> Self {
        let channel = Self::new();
        channel.open.store(false, Ordering::SeqCst);
        channel
    }

    /// Deliver `message` to the registered handler on the calling thread
    pub fn deliver(&self, message: InboundMessage) {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler.handle_message(message),
            None => tracing::warn!(kind = message.kind(), "No handler registered, dropping"),
        }
    }

    /// Mark closed and deliver `ChannelClosed`
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.deliver(InboundMessage::ChannelClosed);
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every message sent so far
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Number of commit/rollback messages sent for `id`
    pub fn decisions_sent(&self, id: OperationId) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| !matches!(m, OutboundMessage::Execute { .. }) && m.id() == id)
            .count()
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelAssociation for RecordingChannel {
    fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Err(ChannelError::HandlerAlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Send("connection reset by peer".into()));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Channel whose far end is an in-process [`ParticipantEndpoint`].
///
/// Delivery is synchronous: replies reach the client before `send` returns.
pub struct LoopbackChannel<H: OperationHandler> {
    endpoint: ParticipantEndpoint<H>,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    open: AtomicBool,
}

impl<H: OperationHandler> LoopbackChannel<H> {
    /// Channel backed by an endpoint over `handler` and an in-memory journal
    pub fn new(handler: H) -> Self {
        Self {
            endpoint: ParticipantEndpoint::new(handler, Arc::new(InMemoryJournal::new())),
            handler: Mutex::new(None),
            open: AtomicBool::new(true),
        }
    }

    /// The in-process participant
    pub fn endpoint(&self) -> &ParticipantEndpoint<H> {
        &self.endpoint
    }

    /// Mark closed and deliver `ChannelClosed`
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.handle_message(InboundMessage::ChannelClosed);
        }
    }
}

impl<H: OperationHandler> ChannelAssociation for LoopbackChannel<H> {
    fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Err(ChannelError::HandlerAlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let handler = self.handler.lock().clone().ok_or(ChannelError::Closed)?;
        self.endpoint.handle(message, handler.as_ref());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Collects the notifications a [`ParticipantEndpoint`] sends back
pub struct CapturedReplies {
    messages: Mutex<Vec<InboundMessage>>,
}

impl CapturedReplies {
    /// Nothing captured yet
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Captured notifications in order
    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().clone()
    }
}

impl Default for CapturedReplies {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for CapturedReplies {
    fn handle_message(&self, message: InboundMessage) {
        self.messages.lock().push(message);
    }
}

/// One recorded listener callback
#[derive(Clone, Debug, PartialEq)]
pub enum ListenerEvent {
    /// `operation_prepared` with the prepared result
    Prepared(OperationId, ModelValue),
    /// `operation_complete`
    Complete(OperationId, ModelValue),
    /// `operation_failed`
    Failed(OperationId, FailureDescription),
}

/// What a [`RecordingListener`] does with a prepared handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnPrepared {
    /// Keep the handle for the test to decide
    Hold,
    /// Commit from inside the callback
    Commit,
    /// Roll back from inside the callback
    Rollback,
}

/// Listener that records every callback in order
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    prepared: Mutex<Option<PreparedOperation>>,
    on_prepared: OnPrepared,
}

impl RecordingListener {
    /// Listener that holds prepared handles
    pub fn new() -> Self {
        Self::with_policy(OnPrepared::Hold)
    }

    /// Listener that acts on prepare per `on_prepared`
    pub fn with_policy(on_prepared: OnPrepared) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            prepared: Mutex::new(None),
            on_prepared,
        }
    }

    /// Callbacks seen so far
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// The handle passed to `operation_prepared`, if any
    pub fn prepared(&self) -> Option<PreparedOperation> {
        self.prepared.lock().clone()
    }

    /// Number of terminal callbacks seen
    pub fn terminal_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| !matches!(e, ListenerEvent::Prepared(..)))
            .count()
    }
}

impl Default for RecordingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationListener for RecordingListener {
    fn operation_prepared(&self, prepared: PreparedOperation) {
        self.events.lock().push(ListenerEvent::Prepared(
            prepared.id(),
            prepared.prepared_result().clone(),
        ));
        *self.prepared.lock() = Some(prepared.clone());
        let decided = match self.on_prepared {
            OnPrepared::Hold => Ok(()),
            OnPrepared::Commit => prepared.commit(),
            OnPrepared::Rollback => prepared.rollback(),
        };
        if let Err(e) = decided {
            tracing::warn!(operation_id = %prepared.id(), error = %e, "Decision from listener failed");
        }
    }

    fn operation_failed(&self, id: OperationId, failure: FailureDescription) {
        self.events.lock().push(ListenerEvent::Failed(id, failure));
    }

    fn operation_complete(&self, id: OperationId, result: ModelValue) {
        self.events.lock().push(ListenerEvent::Complete(id, result));
    }
}

/// Message sink that keeps every report
pub struct CollectingMessages {
    reports: Mutex<Vec<(MessageSeverity, String)>>,
}

impl CollectingMessages {
    /// No reports yet
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Reports in arrival order
    pub fn reports(&self) -> Vec<(MessageSeverity, String)> {
        self.reports.lock().clone()
    }
}

impl Default for CollectingMessages {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationMessageHandler for CollectingMessages {
    fn handle_report(&self, severity: MessageSeverity, message: &str) {
        self.reports.lock().push((severity, message.to_owned()));
    }
}

/// Operation handler over an in-memory key/value store.
///
/// Accepts `{"operation": "write", "name": <string>, "value": <any>}`, stages
/// the write on prepare and applies it on commit.
pub struct KeyValueHandler {
    staged: Mutex<HashMap<OperationId, (String, ModelValue)>>,
    committed: Mutex<HashMap<String, ModelValue>>,
}

impl KeyValueHandler {
    /// Empty store
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(HashMap::new()),
            committed: Mutex::new(HashMap::new()),
        }
    }

    /// Build a write request
    pub fn write(name: &str, value: impl Into<ModelValue>) -> ModelValue {
        ModelValue::object()
            .with("operation", "write")
            .with("name", name)
            .with("value", value)
    }

    /// Committed value for `name`
    pub fn committed(&self, name: &str) -> Option<ModelValue> {
        self.committed.lock().get(name).cloned()
    }
}

impl Default for KeyValueHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for KeyValueHandler {
    fn prepare(
        &self,
        id: OperationId,
        request: &ModelValue,
        _attachments: &OperationAttachments,
        reporter: &MessageReporter<'_>,
    ) -> Result<ModelValue, FailureDescription> {
        if request.get("operation").and_then(ModelValue::as_str) != Some("write") {
            return Err(FailureDescription::rejected("unsupported operation"));
        }
        let name = request
            .get("name")
            .and_then(ModelValue::as_str)
            .ok_or_else(|| FailureDescription::rejected("missing name"))?;
        let value = request.get("value").cloned().unwrap_or_default();

        reporter.info(&format!("staging {}", name));
        self.staged.lock().insert(id, (name.to_owned(), value.clone()));
        Ok(ModelValue::object().with("outcome", "success").with("result", value))
    }

    fn commit(&self, id: OperationId) -> Result<ModelValue, FailureDescription> {
        let (name, value) = self
            .staged
            .lock()
            .remove(&id)
            .ok_or_else(|| FailureDescription::rejected("nothing staged"))?;
        self.committed.lock().insert(name, value);
        Ok(ModelValue::object().with("outcome", "success"))
    }

    fn rollback(&self, id: OperationId) -> Result<ModelValue, FailureDescription> {
        self.staged.lock().remove(&id);
        Ok(ModelValue::object().with("outcome", "success").with("rolled-back", true))
    }
}
