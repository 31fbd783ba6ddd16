//! # bitlink-core
//!
//! Shared library for bitlink containing the serial wire protocol and the
//! domain entities of the micro:bit board family.
//!
//! This crate is used by the host-side fleet subsystem (`bitlink-host`).
//! It has zero dependencies on OS APIs, USB stacks, or async runtimes.
//!
//! - **`protocol`** – How bytes travel over the debug link.  Records are
//!   UTF-8 text lines: pipe-delimited fields terminated by `\n`.  The codec
//!   reassembles lines from arbitrarily chunked reads and parses each line
//!   into a typed [`protocol::record::Record`].
//!
//! - **`domain`** – Pure board-family knowledge: the USB identity of the
//!   board, its serial baud rate, version information reported by the
//!   firmware, and the lifecycle status of a managed device.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `bitlink_core::Record` instead of `bitlink_core::protocol::record::Record`.
pub use domain::board::{
    BoardInfo, DeviceStatus, UsbIdentifier, BAUD_RATE, BOARD_TYPE, MICROBIT_USB,
};
pub use protocol::codec::{encode_command, LineBuffer};
pub use protocol::record::{
    parse_record, BoardFault, Button, CommandReply, Gesture, HelloRecord, MicLevel, Pin, PinLevel,
    Record, RecordError,
};
