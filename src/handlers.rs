//! Entry points: client construction, envelope wrapping, blocking execution

use std::sync::Arc;

use crate::{
    BlockingOperationListener, ChannelAssociation, ClientConfig, ClientError, ModelValue,
    Operation, OperationAttachments, OperationMessageHandler, PreparedOperation,
    TracingObserver, TransactionalClient,
};

/// Create a client on `channel` with the default configuration.
///
/// # Errors
///
/// * [`ClientError::Registration`] if the channel refuses the client's handler
pub fn create_client(channel: Arc<dyn ChannelAssociation>) -> Result<TransactionalClient, ClientError> {
    create_client_with_config(channel, ClientConfig::default())
}

/// Create a client on `channel`, reporting lifecycle events through `tracing`.
///
/// For a custom observer use [`TransactionalClient::connect`].
pub fn create_client_with_config(
    channel: Arc<dyn ChannelAssociation>,
    config: ClientConfig,
) -> Result<TransactionalClient, ClientError> {
    TransactionalClient::connect(channel, config, Arc::new(TracingObserver))
}

/// Wrap an operation's parts in an envelope
pub fn wrap(
    request: ModelValue,
    message_handler: Arc<dyn OperationMessageHandler>,
    attachments: OperationAttachments,
) -> Operation {
    Operation::with_parts(request, message_handler, attachments)
}

/// Execute `operation` and block until its prepare phase finishes.
///
/// Returns the prepared handle, or a [failed handle](PreparedOperation::is_failed)
/// if the participant rejected the operation. The wait is bounded by the
/// client's `prepare_timeout_millis` when set.
///
/// # Errors
///
/// * Whatever [`TransactionalClient::execute`] returns
/// * [`ClientError::ChannelClosed`] if the channel went away before prepare
/// * [`ClientError::Wait`] if the wait timed out
pub fn execute_blocking(
    operation: Operation,
    client: &TransactionalClient,
) -> Result<PreparedOperation, ClientError> {
    let listener = Arc::new(BlockingOperationListener::new());
    let id = client.execute(listener.clone(), operation)?;

    let prepared = match client.config().prepare_timeout() {
        Some(timeout) => listener.retrieve_prepared_operation_timeout(timeout)?,
        None => listener.retrieve_prepared_operation()?,
    };
    match prepared.failure() {
        Some(failure) if failure.is_channel_closed() => Err(ClientError::ChannelClosed(id)),
        _ => Ok(prepared),
    }
}
