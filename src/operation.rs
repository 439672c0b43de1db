//! Operation envelope: request tree, message sink and attachments

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ModelValue;

/// Severity of an out-of-band message reported while an operation executes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    /// The operation hit a problem
    Error,
    /// Something the caller should look at
    Warn,
    /// Progress
    Info,
}

/// Sink for progress/log messages the participant reports during execution
pub trait OperationMessageHandler: Send + Sync + 'static {
    /// Receive one report; runs on the notification delivery path
    fn handle_report(&self, severity: MessageSeverity, message: &str);
}

/// Message sink that drops everything
pub struct DiscardMessages;

impl OperationMessageHandler for DiscardMessages {
    fn handle_report(&self, _severity: MessageSeverity, _message: &str) {}
}

/// Message sink that forwards reports to `tracing`
pub struct TracingMessages;

impl OperationMessageHandler for TracingMessages {
    fn handle_report(&self, severity: MessageSeverity, message: &str) {
        match severity {
            MessageSeverity::Error => tracing::error!(message = %message, "Operation report"),
            MessageSeverity::Warn => tracing::warn!(message = %message, "Operation report"),
            MessageSeverity::Info => tracing::info!(message = %message, "Operation report"),
        }
    }
}

/// A named binary stream travelling alongside the request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Name the participant refers to the stream by
    pub name: Box<str>,
    /// Stream contents
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment
    pub fn new(name: impl Into<Box<str>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Ordered set of attachments; empty by default
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationAttachments(Vec<Attachment>);

impl OperationAttachments {
    /// No attachments
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Attachments in the given order
    pub fn new(attachments: Vec<Attachment>) -> Self {
        Self(attachments)
    }

    /// Number of attachments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attachments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attachment by position
    pub fn get(&self, index: usize) -> Option<&Attachment> {
        self.0.get(index)
    }

    /// Attachment by name
    pub fn by_name(&self, name: &str) -> Option<&Attachment> {
        self.0.iter().find(|a| &*a.name == name)
    }

    /// Attachments in order
    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.0.iter()
    }
}

impl From<Vec<Attachment>> for OperationAttachments {
    fn from(v: Vec<Attachment>) -> Self {
        Self(v)
    }
}

/// Immutable envelope submitted to a [`TransactionalClient`](crate::TransactionalClient).
///
/// Cloning is cheap; every clone shares the same request, sink and attachments.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

struct OperationInner {
    request: ModelValue,
    message_handler: Arc<dyn OperationMessageHandler>,
    attachments: OperationAttachments,
}

impl Operation {
    /// Envelope with a discarding message sink and no attachments
    pub fn new(request: ModelValue) -> Self {
        Self::with_parts(request, Arc::new(DiscardMessages), OperationAttachments::empty())
    }

    /// Envelope with every part supplied
    pub fn with_parts(
        request: ModelValue,
        message_handler: Arc<dyn OperationMessageHandler>,
        attachments: OperationAttachments,
    ) -> Self {
        Self {
            inner: Arc::new(OperationInner {
                request,
                message_handler,
                attachments,
            }),
        }
    }

    /// The request tree
    pub fn request(&self) -> &ModelValue {
        &self.inner.request
    }

    /// Sink for the participant's out-of-band messages
    pub fn message_handler(&self) -> &Arc<dyn OperationMessageHandler> {
        &self.inner.message_handler
    }

    /// Streams sent with the request
    pub fn attachments(&self) -> &OperationAttachments {
        &self.inner.attachments
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("request", &self.inner.request)
            .field("attachments", &self.inner.attachments.len())
            .finish()
    }
}
