//! Typestate for participant-side transactions

/// Marker traits bounding the typestate parameter
pub mod markers {
    /// Any state a [`ParticipantTransaction`](super::ParticipantTransaction) can be in
    pub trait TransactionState: Send + 'static {}
    /// States with no further transitions
    pub trait TerminalState: TransactionState {}
}

// State types

/// Execute received, handler not yet finished preparing
pub struct Received;
/// Change held pending a decision
pub struct Prepared {
    /// When prepare succeeded
    pub prepared_at_millis: u64,
}
/// Change made durable
pub struct Committed {
    /// When the commit finished
    pub completed_at_millis: u64,
}
/// Change discarded
pub struct RolledBack {
    /// When the rollback finished
    pub completed_at_millis: u64,
}

impl markers::TransactionState for Received {}
impl markers::TransactionState for Prepared {}
impl markers::TransactionState for Committed {}
impl markers::TransactionState for RolledBack {}

impl markers::TerminalState for Committed {}
impl markers::TerminalState for RolledBack {}

use crate::OperationId;

/// State container with typestate
pub struct ParticipantTransaction<S: markers::TransactionState> {
    /// Operation this transaction belongs to
    pub id: OperationId,
    /// When the execute message arrived
    pub received_at_millis: u64,
    /// Time of the last transition
    pub last_updated_at_millis: u64,
    /// State-specific data
    pub state: S,
}

impl ParticipantTransaction<Received> {
    /// Start tracking an operation whose execute just arrived
    pub fn new(id: OperationId, now_millis: u64) -> Self {
        Self {
            id,
            received_at_millis: now_millis,
            last_updated_at_millis: now_millis,
            state: Received,
        }
    }

    /// The handler prepared the change
    pub fn prepare(self, now_millis: u64) -> ParticipantTransaction<Prepared> {
        ParticipantTransaction {
            id: self.id,
            received_at_millis: self.received_at_millis,
            last_updated_at_millis: now_millis,
            state: Prepared {
                prepared_at_millis: now_millis,
            },
        }
    }
}

impl ParticipantTransaction<Prepared> {
    /// The handler committed the change
    pub fn commit(self, now_millis: u64) -> ParticipantTransaction<Committed> {
        ParticipantTransaction {
            id: self.id,
            received_at_millis: self.received_at_millis,
            last_updated_at_millis: now_millis,
            state: Committed {
                completed_at_millis: now_millis,
            },
        }
    }

    /// The handler discarded the change
    pub fn roll_back(self, now_millis: u64) -> ParticipantTransaction<RolledBack> {
        ParticipantTransaction {
            id: self.id,
            received_at_millis: self.received_at_millis,
            last_updated_at_millis: now_millis,
            state: RolledBack {
                completed_at_millis: now_millis,
            },
        }
    }
}

impl<S: markers::TerminalState> ParticipantTransaction<S> {
    /// Time from receipt to the terminal transition
    pub fn duration_millis(&self) -> u64 {
        self.last_updated_at_millis.saturating_sub(self.received_at_millis)
    }
}

/// Type-erased entry for the endpoint's table. Terminal states are not kept.
pub enum TransactionEntry {
    /// Prepare in progress
    Received(ParticipantTransaction<Received>),
    /// Awaiting commit or rollback
    Prepared(ParticipantTransaction<Prepared>),
}

impl TransactionEntry {
    /// Operation the entry tracks
    pub fn id(&self) -> OperationId {
        match self {
            Self::Received(t) => t.id,
            Self::Prepared(t) => t.id,
        }
    }

    /// Whether the entry awaits a decision
    pub fn is_prepared(&self) -> bool {
        matches!(self, Self::Prepared(_))
    }
}
