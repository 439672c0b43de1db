//! Caller-supplied callbacks for one submitted operation

use crate::{FailureDescription, ModelValue, OperationId, PreparedOperation};

/// Receives the lifecycle of one operation submitted through
/// [`TransactionalClient::execute`](crate::TransactionalClient::execute).
///
/// For a given operation the client guarantees:
/// - `operation_prepared` is called at most once, and never after a terminal callback
/// - exactly one of `operation_complete` / `operation_failed` is eventually called
///
/// Callbacks run on the channel's delivery thread. Long-running work
/// (including waiting on the final outcome) should be handed off to another
/// thread or task rather than done inline. A panicking callback is logged and
/// does not stop later callbacks for the operation.
///
/// # Example
///
/// ```rust,ignore
/// struct CommitOnPrepare;
///
/// impl OperationListener for CommitOnPrepare {
///     fn operation_prepared(&self, prepared: PreparedOperation) {
///         if let Err(e) = prepared.commit() {
///             tracing::warn!(error = %e, "commit failed");
///         }
///     }
///     fn operation_failed(&self, _id: OperationId, _failure: FailureDescription) {}
///     fn operation_complete(&self, _id: OperationId, _result: ModelValue) {}
/// }
/// ```
pub trait OperationListener: Send + Sync + 'static {
    /// The participant prepared the operation; decide via `prepared.commit()` or `prepared.rollback()`
    fn operation_prepared(&self, prepared: PreparedOperation);

    /// Terminal: the operation failed, before or after prepare
    fn operation_failed(&self, id: OperationId, failure: FailureDescription);

    /// Terminal: the participant finalized the operation
    fn operation_complete(&self, id: OperationId, result: ModelValue);
}
