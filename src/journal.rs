//! Participant journal storage trait

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Decision, FailureDescription, OperationId};

/// Events a participant records per operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParticipantEvent {
    /// Execute arrived
    Received {
        /// Arrival time
        received_at_millis: u64,
    },
    /// Handler prepared the change
    Prepared {
        /// Prepare time
        prepared_at_millis: u64,
    },
    /// Handler or decoding refused the operation
    Rejected {
        /// Reason sent back to the initiator
        failure: FailureDescription,
        /// Rejection time
        rejected_at_millis: u64,
    },
    /// Change committed
    Committed {
        /// Commit time
        completed_at_millis: u64,
    },
    /// Change rolled back
    RolledBack {
        /// Rollback time
        completed_at_millis: u64,
    },
    /// Handler failed to apply the decision
    FinalizeFailed {
        /// Decision that could not be applied
        decision: Decision,
        /// Reason sent back to the initiator
        failure: FailureDescription,
        /// Failure time
        failed_at_millis: u64,
    },
}

/// Journal storage trait
pub trait ParticipantJournal: Send + Sync + 'static {
    /// Record an event; returns its sequence number
    fn append(&self, id: OperationId, event: ParticipantEvent) -> Result<u64, JournalError>;
    /// Events for `id` in append order
    fn read(&self, id: OperationId) -> Result<Vec<JournalEntry>, JournalError>;
    /// Every operation with at least one event
    fn list_operations(&self) -> Result<Vec<OperationId>, JournalError>;
}

/// One recorded event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Journal-wide, increasing
    pub sequence: u64,
    /// When the entry was appended
    pub recorded_at_millis: u64,
    /// What happened
    pub event: ParticipantEvent,
}

/// Journal storage failures
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(Box<str>),
    /// No events for the operation
    #[error("Not found: {0}")]
    NotFound(OperationId),
}

/// In-memory journal for testing
pub struct InMemoryJournal {
    data: RwLock<BTreeMap<OperationId, Vec<JournalEntry>>>,
    counter: AtomicU64,
}

impl InMemoryJournal {
    /// An empty journal
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            counter: AtomicU64::new(1),
        }
    }
}

impl ParticipantJournal for InMemoryJournal {
    fn append(&self, id: OperationId, event: ParticipantEvent) -> Result<u64, JournalError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let entry = JournalEntry {
            sequence: seq,
            recorded_at_millis: crate::context::now_millis(),
            event,
        };

        self.data.write().entry(id).or_default().push(entry);

        Ok(seq)
    }

    fn read(&self, id: OperationId) -> Result<Vec<JournalEntry>, JournalError> {
        self.data.read().get(&id).cloned().ok_or(JournalError::NotFound(id))
    }

    fn list_operations(&self) -> Result<Vec<OperationId>, JournalError> {
        Ok(self.data.read().keys().copied().collect())
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations whose journal history ends in `Prepared`: the participant holds
/// their change pending and still needs a commit or rollback decision.
pub fn recover_prepared(journal: &dyn ParticipantJournal) -> Result<Vec<OperationId>, JournalError> {
    let mut prepared = Vec::new();
    for id in journal.list_operations()? {
        let entries = journal.read(id)?;
        if rebuild_state(&entries) == RebuiltState::Prepared {
            prepared.push(id);
        }
    }
    Ok(prepared)
}

/// Rebuild state from event history
fn rebuild_state(entries: &[JournalEntry]) -> RebuiltState {
    let mut state = RebuiltState::Unknown;

    for entry in entries {
        state = match &entry.event {
            ParticipantEvent::Received { .. } => RebuiltState::Received,
            ParticipantEvent::Prepared { .. } => RebuiltState::Prepared,
            ParticipantEvent::Rejected { .. }
            | ParticipantEvent::Committed { .. }
            | ParticipantEvent::RolledBack { .. }
            | ParticipantEvent::FinalizeFailed { .. } => RebuiltState::Finished,
        };
    }

    state
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RebuiltState {
    Unknown,
    Received,
    Prepared,
    Finished,
}
