//! Infrastructure layer for the host subsystem.
//!
//! - **`transport`** – the seam to the USB debug-link driver: object-safe
//!   async traits for a single serial link and for the page-level USB host,
//!   plus channel-backed mocks for tests and the demo binary.
//! - **`storage`** – TOML configuration persistence.
//! - **`ui_bridge`** – serialization-ready DTOs for the published fleet
//!   snapshots consumed by an embedding frontend.

pub mod storage;
pub mod transport;
pub mod ui_bridge;
