//! Common traits
//!
//! A [`Bus`] is the transmit side of one CAN interface. Received frames from all interfaces arrive
//! through a single [`FrameRouter`], tagged with their origin.

use std::error;
use std::sync::Arc;

use crate::messages::{BusFrame, BusId, CanMessage};

/// Error type for CAN send operations containing the failed message
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct CanSendError(pub CanMessage);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN message: {:?}", self.0)
    }
}

impl error::Error for CanSendError {}

/// The operating mode of a CAN interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// The interface is powered down
    Off,
    /// The interface receives, but does not transmit or acknowledge
    Listen,
    /// Normal operation
    Active,
}

/// What happened to a successfully written frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The frame was put on the bus
    Delivered,
    /// The frame was accepted into a transmit queue
    Queued,
}

/// A CAN interface the master can transmit on
pub trait Bus: Send + Sync {
    /// The identity of this interface
    fn id(&self) -> BusId;

    /// A printable name for the interface, e.g. "can1"
    fn name(&self) -> &str;

    /// Transmit a frame
    fn write(&self, msg: CanMessage) -> Result<TxStatus, CanSendError>;

    /// Get the current operating mode
    fn power_mode(&self) -> BusMode;
}

/// A callback receiving every frame from every interface
pub type FrameListener = Arc<dyn Fn(BusFrame) + Send + Sync>;

/// A handle for removing a registered [`FrameListener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The source of received frames
///
/// Listeners may be called from any thread and must not block.
pub trait FrameRouter: Send + Sync {
    /// Start delivering frames to `listener`
    fn register_listener(&self, listener: FrameListener) -> ListenerId;

    /// Stop delivering frames to a listener
    ///
    /// Unknown IDs are ignored.
    fn deregister_listener(&self, id: ListenerId);
}
