//! Transport seam to the USB debug-link driver.
//!
//! The transport primitive itself — USB enumeration, the pairing dialog, raw
//! byte read/write, baud-rate configuration — is supplied by a lower-level
//! driver.  This module only defines the traits the subsystem calls into:
//!
//! - [`SerialLink`]: one board's serial channel (connect/disconnect, baud
//!   rate, chunked read delivery, string writes, permission revocation).
//! - [`UsbHost`]: page-level capability detection, enumeration of
//!   already-authorized devices, the device picker, and hotplug
//!   notifications.
//!
//! Chunk and hotplug delivery use `tokio::sync::mpsc` receivers rather than
//! registered closures; a receiver is handed out once per read session and
//! the consumer pumps it from its own task.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use bitlink_core::UsbIdentifier;

pub mod mock;

/// Error type for debug-link transport operations.
///
/// The variants carry enough classification for the engine to map a
/// connection-time failure onto a device status: a claimed interface means
/// another process owns the board, a bad setup-phase reply means the link is
/// in a bad state, and anything else is a generic failure.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Another process has already claimed the USB interface.
    #[error("unable to claim interface: {0}")]
    InterfaceClaimed(String),

    /// The debug link returned an unexpected reply to a setup-phase command.
    #[error("bad response for '{command}'")]
    BadResponse { command: String },

    /// The operation requires an open connection.
    #[error("link is not connected")]
    NotConnected,

    /// A serial read session is already running on this link.
    #[error("serial read already started")]
    ReadAlreadyStarted,

    /// Any other transport-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// One board's USB-backed serial channel.
///
/// Implementations own the raw transport handle; the protocol engine never
/// sees USB descriptors or endpoints, only this surface.
#[async_trait]
pub trait SerialLink: Send + Sync {
    /// Stable serial number of the board.
    ///
    /// Boards of the supported family always carry one; a handle without a
    /// serial number is a driver contract violation, not a runtime case.
    fn serial_number(&self) -> &str;

    /// Whether the link is currently open.
    fn is_connected(&self) -> bool;

    /// Opens the debug-link connection.
    async fn connect(&self) -> Result<(), LinkError>;

    /// Closes the debug-link connection.
    async fn disconnect(&self) -> Result<(), LinkError>;

    /// Currently configured serial baud rate.
    async fn baud_rate(&self) -> Result<u32, LinkError>;

    /// Reconfigures the serial baud rate.
    async fn set_baud_rate(&self, baud_rate: u32) -> Result<(), LinkError>;

    /// Begins a serial read session, returning the channel on which incoming
    /// chunks are delivered.  Chunk boundaries are arbitrary: a chunk may
    /// hold part of a record or several records.
    fn start_read(&self) -> Result<mpsc::UnboundedReceiver<String>, LinkError>;

    /// Stops the serial read session, closing the chunk channel.
    fn stop_read(&self);

    /// Writes a string to the serial channel.
    async fn write(&self, data: &str) -> Result<(), LinkError>;

    /// Revokes the USB permission grant for this board.  A forgotten board
    /// is not re-offered by future enumeration.
    async fn forget(&self) -> Result<(), LinkError>;
}

/// Page-level USB connect/disconnect notification.
pub enum HotplugEvent {
    /// A board appeared; carries the transport handle to register.
    Connected(Arc<dyn SerialLink>),
    /// A board went away; resolved against the registry by serial number.
    Disconnected(Arc<dyn SerialLink>),
}

/// The page-level USB host surface.
#[async_trait]
pub trait UsbHost: Send + Sync {
    /// Whether the host exposes the required USB capability at all.
    fn supported(&self) -> bool;

    /// Enumerates devices the user has already authorized.
    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn SerialLink>>, LinkError>;

    /// Opens the platform device picker restricted to `filter`.
    ///
    /// Resolves to `None` when the user dismisses the picker without
    /// choosing a device — cancellation is not an error.
    async fn request_device(
        &self,
        filter: UsbIdentifier,
    ) -> Result<Option<Arc<dyn SerialLink>>, LinkError>;

    /// Hands out the hotplug notification channel for this session.
    ///
    /// Returns `None` on subsequent calls: there is one subscription per
    /// session.
    fn hotplug_events(&self) -> Option<mpsc::UnboundedReceiver<HotplugEvent>>;
}
