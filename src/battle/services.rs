//! Contracts for the services a battle unit consumes
//!
//! The unit never owns the map, animation tables or audio device. It talks
//! to them through these traits so the battle can plug in any backend.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::battle::facing::Facing;
use crate::battle::states::{BodyState, HandState, MovementState};
use crate::core::types::{TilePos, UnitId};

/// Part of a tile a ray can hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapPart {
    Ground,
    /// Wall on the west edge of a tile
    LeftWall,
    /// Wall on the north edge of a tile
    RightWall,
    Feature,
}

/// Result of tracing a segment through the map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collision {
    /// Tiles entered in order, starting with the origin tile
    pub tiles_passed: Vec<TilePos>,
    /// Terminal hit, if the segment was stopped
    pub hit: Option<(MapPart, TilePos)>,
}

/// Coarse visibility region, marked visible as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LosBlock {
    pub start: TilePos,
    /// Exclusive upper corner
    pub end: TilePos,
}

impl LosBlock {
    pub fn tiles(&self) -> impl Iterator<Item = TilePos> + '_ {
        (self.start.z..self.end.z).flat_map(move |z| {
            (self.start.y..self.end.y)
                .flat_map(move |y| (self.start.x..self.end.x).map(move |x| IVec3::new(x, y, z)))
        })
    }
}

/// Spatial queries and occupancy
pub trait TileMap {
    fn size(&self) -> IVec3;

    fn contains(&self, tile: TilePos) -> bool {
        tile.cmpge(IVec3::ZERO).all() && tile.cmplt(self.size()).all()
    }

    /// Tile has a floor a unit can rest on
    fn can_stand(&self, tile: TilePos, large: bool) -> bool;

    /// Where a unit settles in a tile: center, on top of the floor
    fn resting_position(&self, tile: TilePos, large: bool) -> Vec3;

    /// Tile has room for a body of `height` (in height units)
    fn is_passable(&self, tile: TilePos, height: i32) -> bool;

    /// A unit may step directly from `from` into `to`
    fn can_enter_tile(&self, from: TilePos, to: TilePos, large: bool) -> bool;

    /// Occlusion contributed by the tile's contents
    fn vision_blockage(&self, tile: TilePos) -> i32;

    /// Trace the segment, recording every tile entered until the first hit
    fn find_collision(&self, from: Vec3, to: Vec3) -> Collision;

    /// Shortest walkable path, excluding `start`
    ///
    /// When `goal` cannot be reached within `cost_limit` the path leads to
    /// the explored tile closest to it.
    fn find_shortest_path(
        &self,
        start: TilePos,
        goal: TilePos,
        cost_limit: f32,
        large: bool,
    ) -> Vec<TilePos>;

    fn los_block_index(&self, tile: TilePos) -> Option<usize>;

    fn los_block(&self, index: usize) -> Option<LosBlock>;

    fn los_block_count(&self) -> usize;

    /// Units whose body occupies the tile
    fn units_at(&self, tile: TilePos) -> Vec<UnitId>;

    /// Move a unit's occupancy; `None` removes it from the map
    fn place_unit(&mut self, unit: UnitId, tile: Option<TilePos>);

    /// Tile lets units leave the battle
    fn is_exit(&self, tile: TilePos) -> bool;

    /// Footstep samples for walking over the tile
    fn walk_sfx(&self, tile: TilePos) -> &[String];
}

/// Body transition being asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPose<'a> {
    pub item: Option<&'a str>,
    pub from: BodyState,
    pub to: BodyState,
    pub hand: HandState,
    pub movement: MovementState,
    pub facing: Facing,
}

/// Hand transition being asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandPose<'a> {
    pub item: Option<&'a str>,
    pub body: BodyState,
    pub from: HandState,
    pub to: HandState,
    pub movement: MovementState,
    pub facing: Facing,
}

/// Firing animation being asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiringPose<'a> {
    pub item: Option<&'a str>,
    pub body: BodyState,
    pub movement: MovementState,
    pub facing: Facing,
}

/// Frame counts for pose transitions. Zero means no animation exists.
pub trait AnimationPack {
    fn body_frames(&self, pose: &BodyPose<'_>) -> u32;
    fn hand_frames(&self, pose: &HandPose<'_>) -> u32;
    fn firing_frames(&self, pose: &FiringPose<'_>) -> u32;
}

/// Fire-and-forget sample playback
pub trait SoundBackend {
    fn play_sample(&mut self, sample: &str, position: Vec3, gain: f32);
}

/// Drops every sample
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSoundBackend;

impl SoundBackend for SilentSoundBackend {
    fn play_sample(&mut self, _sample: &str, _position: Vec3, _gain: f32) {}
}

/// Reports samples to the trace log, for headless runs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSoundBackend;

impl SoundBackend for TracingSoundBackend {
    fn play_sample(&mut self, sample: &str, position: Vec3, gain: f32) {
        trace!(sample, x = position.x, y = position.y, z = position.z, gain, "play sample");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_los_block_tiles_cover_volume() {
        let block = LosBlock {
            start: IVec3::new(2, 2, 0),
            end: IVec3::new(4, 5, 2),
        };
        let tiles: Vec<_> = block.tiles().collect();
        assert_eq!(tiles.len(), 2 * 3 * 2);
        assert!(tiles.contains(&IVec3::new(3, 4, 1)));
        assert!(!tiles.contains(&IVec3::new(4, 4, 1)));
    }
}
