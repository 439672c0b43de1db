//! Boundary with the multiplexed channel association

use std::sync::Arc;

use crate::{ChannelError, InboundMessage, OutboundMessage};

/// Receiver of inbound notifications, registered on a [`ChannelAssociation`].
///
/// The channel calls [`MessageHandler::handle_message`] from its own delivery
/// thread(s), possibly concurrently for distinct operations. Implementations
/// must not block the delivery path.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one notification; called on the channel's delivery thread
    fn handle_message(&self, message: InboundMessage);
}

/// A duplex transport that frames and delivers protocol messages.
///
/// Framing, handshake and byte layout are the transport's concern; this crate
/// only hands it discrete [`OutboundMessage`]s and expects every inbound
/// notification, including the final `ChannelClosed`, to reach the registered
/// handler.
pub trait ChannelAssociation: Send + Sync + 'static {
    /// Register the handler for inbound notifications.
    ///
    /// One handler per association; a second registration fails with
    /// [`ChannelError::HandlerAlreadyRegistered`].
    fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError>;

    /// Queue one message for transmission. Must not wait for the remote side.
    fn send(&self, message: OutboundMessage) -> Result<(), ChannelError>;

    /// Whether the channel is established and not yet closed
    fn is_open(&self) -> bool;
}
