//! Application layer for the host subsystem.
//!
//! - **`device`** – The per-board serial protocol engine: connection setup
//!   and failure classification, the `hello` handshake, positional
//!   command/response correlation, and event classification into the two
//!   polling queues.  This is the most critical code path — every byte from
//!   every board flows through it.
//!
//! - **`fleet`** – The process-wide registry of known devices: pairing,
//!   forgetting, hotplug lifecycle, selection of the single active device,
//!   and publication of fleet state to observers.

pub mod device;
pub mod fleet;
