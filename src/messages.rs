//! Protocol messages exchanged over a channel association

use serde::{Deserialize, Serialize};

use crate::{
    ClientError, FailureDescription, MessageSeverity, ModelValue, Operation, OperationAttachments,
    OperationId,
};

/// Initiator -> participant
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// Submit an operation for its prepare phase; `payload` is an encoded [`ExecutePayload`]
    Execute {
        /// Client-assigned id
        id: OperationId,
        /// Encoded request and attachments
        payload: Vec<u8>,
    },
    /// Make a prepared operation durable
    Commit {
        /// Operation to commit
        id: OperationId,
    },
    /// Discard a prepared operation
    Rollback {
        /// Operation to roll back
        id: OperationId,
    },
}

impl OutboundMessage {
    /// Operation the message is about
    pub fn id(&self) -> OperationId {
        match self {
            Self::Execute { id, .. } => *id,
            Self::Commit { id } => *id,
            Self::Rollback { id } => *id,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::Commit { .. } => "commit",
            Self::Rollback { .. } => "rollback",
        }
    }
}

/// Participant -> initiator, plus the transport's own close notification
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Prepare succeeded; the operation awaits a decision
    Prepared {
        /// Prepared operation
        id: OperationId,
        /// Provisional result
        result: ModelValue,
    },
    /// Participant finalized the operation
    Completed {
        /// Finished operation
        id: OperationId,
        /// Final result
        result: ModelValue,
    },
    /// Prepare or finalization failed
    Failed {
        /// Failed operation
        id: OperationId,
        /// Why
        failure: FailureDescription,
    },
    /// Out-of-band progress message for a running operation
    Message {
        /// Operation the message belongs to
        id: OperationId,
        /// Report severity
        severity: MessageSeverity,
        /// Report text
        text: Box<str>,
    },
    /// The transport closed the association
    ChannelClosed,
}

impl InboundMessage {
    /// Operation the notification refers to; `None` for `ChannelClosed`
    pub fn id(&self) -> Option<OperationId> {
        match self {
            Self::Prepared { id, .. } => Some(*id),
            Self::Completed { id, .. } => Some(*id),
            Self::Failed { id, .. } => Some(*id),
            Self::Message { id, .. } => Some(*id),
            Self::ChannelClosed => None,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prepared { .. } => "prepared",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Message { .. } => "message",
            Self::ChannelClosed => "channel_closed",
        }
    }
}

/// The serializable part of an [`Operation`]: request tree and attachments.
///
/// The message sink stays on the initiator side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutePayload {
    /// Request tree
    pub request: ModelValue,
    /// Streams sent with the request
    pub attachments: OperationAttachments,
}

impl ExecutePayload {
    /// Encode `operation`, refusing frames larger than `max_frame_bytes`
    pub fn encode(operation: &Operation, max_frame_bytes: usize) -> Result<Vec<u8>, ClientError> {
        // serde_json writes NaN and infinities as null, which does not decode
        if !operation.request().is_finite() {
            return Err(ClientError::Serialization(
                "request contains a non-finite double".into(),
            ));
        }

        #[derive(Serialize)]
        struct Borrowed<'a> {
            request: &'a ModelValue,
            attachments: &'a OperationAttachments,
        }

        let bytes = serde_json::to_vec(&Borrowed {
            request: operation.request(),
            attachments: operation.attachments(),
        })
        .map_err(|e| ClientError::Serialization(e.to_string().into()))?;

        if bytes.len() > max_frame_bytes {
            return Err(ClientError::Serialization(
                format!(
                    "encoded operation is {} bytes, limit is {}",
                    bytes.len(),
                    max_frame_bytes
                )
                .into(),
            ));
        }
        Ok(bytes)
    }

    /// Decode a payload produced by [`ExecutePayload::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
