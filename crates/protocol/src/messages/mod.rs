//! JSON application messages carried in text frames.
//!
//! Every message is an object tagged by its `type` field. Inbound messages
//! decode into [`ClientMessage`], outbound ones are built as [`ServerMessage`].

mod client;
mod server;

pub use client::*;
pub use server::*;
