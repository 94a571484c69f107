//! LAN Rush arena server library.

pub mod collision;
pub mod config;
pub mod economy;
pub mod entity;
pub mod scheduler;
pub mod server;
pub mod simulation;
pub mod sync;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::{Event, GameState, run, serve};
