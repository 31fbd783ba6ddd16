//! Board identity and lifecycle types for the supported board family.

use serde::{Deserialize, Serialize};

// ── Board identity constants ──────────────────────────────────────────────────

/// Serial baud rate required by the board's debug link.
pub const BAUD_RATE: u32 = 115_200;

/// Board-type literal the firmware reports in its handshake reply.
pub const BOARD_TYPE: &str = "microbit";

/// USB vendor/product identifier pair of a single board family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbIdentifier {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// USB identity of the micro:bit's on-board debug interface.
pub const MICROBIT_USB: UsbIdentifier = UsbIdentifier {
    vendor_id: 0x0D28,
    product_id: 0x0204,
};

// ── Device lifecycle status ───────────────────────────────────────────────────

/// Lifecycle status of a managed device.
///
/// Not a strict linear state machine: `Initialising` is the only non-terminal
/// value.  Each of the others is reached directly from `Initialising` during a
/// setup attempt, and none (except `Ready`) has a further transition defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Connection and handshake in progress.
    Initialising,
    /// Handshake complete; normal commands are trusted.
    Ready,
    /// The transport connection could not be established.
    Failed,
    /// Another process has claimed the USB interface.
    AlreadyInUse,
    /// The debug link returned a bad reply to a setup-phase command.
    BadState,
}

// ── Board info ────────────────────────────────────────────────────────────────

/// Version information reported by the firmware in its handshake reply.
///
/// Populated only after a successful handshake; absent before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Hardware revision, three period-separated integers on the wire.
    pub hardware_version: [u32; 3],
    /// Firmware revision, two period-separated integers on the wire.
    pub firmware_version: [u32; 2],
}

// ── Tests ─────────────────────────────────────────────────────────────────────
