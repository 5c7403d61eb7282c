//! Core type definitions used throughout the codebase

use std::fmt;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Simulation tick counter
pub type Tick = u64;

/// Integer tile coordinate: x grows east, y grows south, z grows up
pub type TilePos = IVec3;

/// Unique identifier for a combatant in a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Faction that owns a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Carried item identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Rules the battle is played under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleMode {
    /// Orders cost time units, refilled each turn
    TurnBased,
    #[default]
    RealTime,
}

/// Tile containing a fractional position
pub fn tile_of(position: Vec3) -> TilePos {
    position.floor().as_ivec3()
}

/// Floor-level center of a tile
pub fn tile_center(tile: TilePos) -> Vec3 {
    tile.as_vec3() + Vec3::new(0.5, 0.5, 0.0)
}

/// Tile distance used for ordering units toward a target
///
/// Largest axis delta plus the sum of all deltas, so diagonal travel ranks
/// further than straight travel of the same length.
pub fn tile_distance(a: TilePos, b: TilePos) -> i32 {
    let delta = (a - b).abs();
    delta.max_element() + delta.x + delta.y + delta.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_of_floors_negative_fractions() {
        assert_eq!(tile_of(Vec3::new(2.5, 3.99, 0.0)), IVec3::new(2, 3, 0));
        assert_eq!(tile_of(Vec3::new(-0.5, 0.0, 1.2)), IVec3::new(-1, 0, 1));
    }

    #[test]
    fn test_tile_center() {
        assert_eq!(tile_center(IVec3::new(4, 1, 2)), Vec3::new(4.5, 1.5, 2.0));
    }

    #[test]
    fn test_tile_distance_prefers_straight() {
        let origin = IVec3::ZERO;
        assert_eq!(tile_distance(origin, IVec3::new(3, 0, 0)), 6);
        assert_eq!(tile_distance(origin, IVec3::new(3, 3, 0)), 9);
        assert_eq!(tile_distance(origin, origin), 0);
    }

    #[test]
    fn test_unit_id_display() {
        assert_eq!(UnitId(7).to_string(), "unit#7");
    }
}
