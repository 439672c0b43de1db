//! Client statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-client counters
pub struct ClientStats {
    /// Operations handed to the channel
    pub operations_submitted: AtomicU64,
    /// `PREPARED` notifications accepted
    pub operations_prepared: AtomicU64,
    /// Operations that ended `Completed`
    pub operations_completed: AtomicU64,
    /// Operations that ended `Failed`, including sweeps
    pub operations_failed: AtomicU64,
    /// Commit decisions sent
    pub commits_sent: AtomicU64,
    /// Rollback decisions sent
    pub rollbacks_sent: AtomicU64,
    /// Execute or decision sends the channel refused
    pub send_failures: AtomicU64,
    /// Notifications for unknown ids or out of order
    pub protocol_violations: AtomicU64,
    /// Late or repeated notifications for finished operations
    pub duplicate_notifications: AtomicU64,
    /// Times the pending table was swept on close
    pub channel_closed_sweeps: AtomicU64,
}

impl ClientStats {
    /// All counters at zero
    pub fn new() -> Self {
        Self {
            operations_submitted: AtomicU64::new(0),
            operations_prepared: AtomicU64::new(0),
            operations_completed: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            commits_sent: AtomicU64::new(0),
            rollbacks_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            duplicate_notifications: AtomicU64::new(0),
            channel_closed_sweeps: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            operations_submitted: self.operations_submitted.load(Ordering::Relaxed),
            operations_prepared: self.operations_prepared.load(Ordering::Relaxed),
            operations_completed: self.operations_completed.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            commits_sent: self.commits_sent.load(Ordering::Relaxed),
            rollbacks_sent: self.rollbacks_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            duplicate_notifications: self.duplicate_notifications.load(Ordering::Relaxed),
            channel_closed_sweeps: self.channel_closed_sweeps.load(Ordering::Relaxed),
        }
    }
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`ClientStats`]; fields mirror the counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientStatsSnapshot {
    /// Operations handed to the channel
    pub operations_submitted: u64,
    /// Prepared notifications accepted
    pub operations_prepared: u64,
    /// Completed operations
    pub operations_completed: u64,
    /// Failed operations
    pub operations_failed: u64,
    /// Commits sent
    pub commits_sent: u64,
    /// Rollbacks sent
    pub rollbacks_sent: u64,
    /// Refused sends
    pub send_failures: u64,
    /// Protocol violations
    pub protocol_violations: u64,
    /// Late or repeated notifications
    pub duplicate_notifications: u64,
    /// Close sweeps
    pub channel_closed_sweeps: u64,
}
