//! Domain entities for bitlink.
//!
//! Pure board-family knowledge with no infrastructure dependencies: the USB
//! identity of the supported board, the versions its firmware reports, and
//! the lifecycle status of a managed device.

pub mod board;
