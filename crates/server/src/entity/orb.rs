//! Collectible orb.

use glam::Vec2;
use protocol::messages::OrbView;

/// A collectible worth `value` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orb {
    pub position: Vec2,
    /// Dropped on a death rather than spawned by replenishment.
    pub bonus: bool,
    pub value: u32,
}

impl Orb {
    pub fn ordinary(position: Vec2, value: u32) -> Self {
        Self {
            position,
            bonus: false,
            value,
        }
    }

    pub fn bonus(position: Vec2, value: u32) -> Self {
        Self {
            position,
            bonus: true,
            value,
        }
    }

    #[inline]
    pub fn view(&self) -> OrbView {
        OrbView {
            x: self.position.x,
            y: self.position.y,
            bonus: self.bonus,
            value: self.value,
        }
    }
}
