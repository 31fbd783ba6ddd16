//! Protocol module containing the line codec and the inbound record grammar.

pub mod codec;
pub mod record;

pub use codec::{encode_command, LineBuffer};
pub use record::*;
