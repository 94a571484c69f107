//! Game entities.

mod orb;
mod player;

pub use orb::Orb;
pub use player::{Player, PlayerId, TrailPoint, retention};
