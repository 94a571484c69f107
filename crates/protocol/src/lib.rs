//! Wire protocol for the LAN Rush arena server.
//!
//! This crate contains:
//! - The connection upgrade handshake
//! - WebSocket frame encoding and decoding
//! - JSON message definitions for both directions

mod error;
pub mod frame;
pub mod handshake;
pub mod messages;

pub use error::ProtocolError;
pub use frame::{Frame, Opcode};
pub use messages::{ClientMessage, ServerMessage};
