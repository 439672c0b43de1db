//! Two-phase remote operations over an asynchronous channel
//!
//! An initiator submits a structured operation to a participant, which
//! validates and provisionally applies it (*prepare*). The initiator then
//! decides, exactly once, to *commit* or *roll back*, and observes the final
//! outcome. All participant notifications arrive asynchronously over one
//! channel association; if the channel closes, every pending operation fails.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Create a client on an open channel association
//! let client = create_client(channel)?;
//!
//! // 2. Wrap the request and run the prepare phase
//! let request = ModelValue::object().with("operation", "write").with("name", "port");
//! let operation = wrap(request, Arc::new(TracingMessages), OperationAttachments::empty());
//! let prepared = execute_blocking(operation, &client)?;
//!
//! // 3. Decide, then wait for the participant's answer
//! if !prepared.is_failed() {
//!     prepared.commit()?;
//!     let outcome = prepared.await_default_final_outcome()?;
//! }
//! ```
//!
//! Listeners that prefer callbacks pass an [`OperationListener`] to
//! [`TransactionalClient::execute`] and decide from inside `operation_prepared`.

#![warn(missing_docs)]

// === Core Types ===
mod context;
mod errors;
mod operation;
mod value;

// === Protocol ===
mod channel;
mod messages;

// === Initiator ===
mod blocking;
mod client;
mod config;
mod delivery;
mod handlers;
mod listener;
mod outcome;
mod prepared;
mod state;

// === Participant ===
mod journal;
mod participant;
mod transaction;

// === Observability ===
mod observer;
mod stats;

// === Test Support ===
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod scenarios;

// === Re-exports ===

// Types
pub use context::{Decision, OperationId};
pub use operation::{
    Attachment, DiscardMessages, MessageSeverity, Operation, OperationAttachments,
    OperationMessageHandler, TracingMessages,
};
pub use value::ModelValue;

// Errors
pub use errors::{ChannelError, ClientError, FailureDescription, FailureKind, WaitError};

// Protocol
pub use channel::{ChannelAssociation, MessageHandler};
pub use messages::{ExecutePayload, InboundMessage, OutboundMessage};

// Initiator
pub use blocking::BlockingOperationListener;
pub use client::TransactionalClient;
pub use config::ClientConfig;
pub use handlers::{create_client, create_client_with_config, execute_blocking, wrap};
pub use listener::OperationListener;
pub use outcome::OperationOutcome;
pub use prepared::PreparedOperation;
pub use state::OperationPhase;

// Participant
pub use journal::{
    recover_prepared, InMemoryJournal, JournalEntry, JournalError, ParticipantEvent,
    ParticipantJournal,
};
pub use participant::{MessageReporter, OperationHandler, ParticipantEndpoint};
pub use transaction::{
    markers, Committed, ParticipantTransaction, Prepared, Received, RolledBack, TransactionEntry,
};

// Observability
pub use observer::{NoOpObserver, OperationObserver, ProtocolViolation, TracingObserver};
pub use stats::{ClientStats, ClientStatsSnapshot};
