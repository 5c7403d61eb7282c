//! Voxel tile grid implementing the battle's spatial service
//!
//! Each tile may carry a floor, a solid feature, walls on its west and
//! north edges, an occlusion value and an exit marker. The grid is split
//! into fixed LOS blocks that are revealed as a whole.

use ahash::AHashMap;
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::battle::constants::LOS_BLOCK_SIZE;
use crate::battle::pathfinding::find_path;
use crate::battle::services::{Collision, LosBlock, MapPart, TileMap};
use crate::core::types::{tile_of, TilePos, UnitId};

/// Minimum floor thickness a ray must clear
const GROUND_THICKNESS: f32 = 0.05;
/// Ray samples per tile of travel
const COLLISION_SAMPLES_PER_TILE: f32 = 16.0;

/// Contents of a single tile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridTile {
    pub ground: bool,
    /// Floor surface height as a fraction of a tile
    pub ground_height: f32,
    /// Solid block filling the tile
    pub feature: bool,
    /// Wall on the west edge
    pub left_wall: bool,
    /// Wall on the north edge
    pub right_wall: bool,
    pub vision_blockage: i32,
    pub exit: bool,
    pub walk_sfx: Vec<String>,
}

/// Reference tile map
#[derive(Debug, Clone)]
pub struct GridMap {
    size: IVec3,
    tiles: Vec<GridTile>,
    occupancy: AHashMap<TilePos, Vec<UnitId>>,
    unit_tiles: AHashMap<UnitId, TilePos>,
}

impl GridMap {
    /// Map with a floor on every tile of the bottom layer
    pub fn new(size: IVec3) -> Self {
        let mut map = Self::empty(size);
        for y in 0..size.y {
            for x in 0..size.x {
                map.set_ground(IVec3::new(x, y, 0), true);
            }
        }
        map
    }

    /// Map with no floors at all
    pub fn empty(size: IVec3) -> Self {
        let size = size.max(IVec3::ONE);
        let count = (size.x * size.y * size.z) as usize;
        Self {
            size,
            tiles: vec![GridTile::default(); count],
            occupancy: AHashMap::new(),
            unit_tiles: AHashMap::new(),
        }
    }

    fn index(&self, tile: TilePos) -> Option<usize> {
        if !self.contains(tile) {
            return None;
        }
        Some((tile.x + tile.y * self.size.x + tile.z * self.size.x * self.size.y) as usize)
    }

    pub fn tile(&self, tile: TilePos) -> Option<&GridTile> {
        self.index(tile).map(|i| &self.tiles[i])
    }

    pub fn tile_mut(&mut self, tile: TilePos) -> Option<&mut GridTile> {
        self.index(tile).map(move |i| &mut self.tiles[i])
    }

    pub fn set_ground(&mut self, tile: TilePos, ground: bool) {
        if let Some(t) = self.tile_mut(tile) {
            t.ground = ground;
        }
    }

    pub fn set_feature(&mut self, tile: TilePos, feature: bool) {
        if let Some(t) = self.tile_mut(tile) {
            t.feature = feature;
        }
    }

    pub fn set_left_wall(&mut self, tile: TilePos, wall: bool) {
        if let Some(t) = self.tile_mut(tile) {
            t.left_wall = wall;
        }
    }

    pub fn set_right_wall(&mut self, tile: TilePos, wall: bool) {
        if let Some(t) = self.tile_mut(tile) {
            t.right_wall = wall;
        }
    }

    pub fn set_vision_blockage(&mut self, tile: TilePos, blockage: i32) {
        if let Some(t) = self.tile_mut(tile) {
            t.vision_blockage = blockage;
        }
    }

    pub fn set_exit(&mut self, tile: TilePos, exit: bool) {
        if let Some(t) = self.tile_mut(tile) {
            t.exit = exit;
        }
    }

    pub fn set_walk_sfx(&mut self, tile: TilePos, samples: Vec<String>) {
        if let Some(t) = self.tile_mut(tile) {
            t.walk_sfx = samples;
        }
    }

    /// Wall between two horizontally adjacent tiles on the same level
    fn edge_blocked(&self, from: TilePos, to: TilePos) -> Option<(MapPart, TilePos)> {
        let d = to - from;
        let wall = |tile: TilePos, part: MapPart| {
            let t = self.tile(tile)?;
            let present = match part {
                MapPart::LeftWall => t.left_wall,
                MapPart::RightWall => t.right_wall,
                _ => false,
            };
            present.then_some((part, tile))
        };
        match (d.x, d.y) {
            (1, 0) => wall(to, MapPart::LeftWall),
            (-1, 0) => wall(from, MapPart::LeftWall),
            (0, 1) => wall(to, MapPart::RightWall),
            (0, -1) => wall(from, MapPart::RightWall),
            _ => None,
        }
    }

    fn blocks_ray(&self, tile: TilePos, point: Vec3) -> Option<MapPart> {
        let t = self.tile(tile)?;
        if t.feature {
            return Some(MapPart::Feature);
        }
        if t.ground && point.z - (tile.z as f32) < t.ground_height.max(GROUND_THICKNESS) {
            return Some(MapPart::Ground);
        }
        None
    }
}

impl TileMap for GridMap {
    fn size(&self) -> IVec3 {
        self.size
    }

    fn can_stand(&self, tile: TilePos, _large: bool) -> bool {
        self.tile(tile).is_some_and(|t| t.ground && !t.feature)
    }

    fn resting_position(&self, tile: TilePos, large: bool) -> Vec3 {
        let height = if self.can_stand(tile, large) {
            self.tile(tile).map_or(0.0, |t| t.ground_height)
        } else {
            0.0
        };
        tile.as_vec3() + Vec3::new(0.5, 0.5, height)
    }

    fn is_passable(&self, tile: TilePos, _height: i32) -> bool {
        self.tile(tile).is_some_and(|t| !t.feature)
    }

    fn can_enter_tile(&self, from: TilePos, to: TilePos, large: bool) -> bool {
        let d = to - from;
        if d == IVec3::ZERO || d.abs().max_element() > 1 || !self.contains(from) {
            return false;
        }
        if !self.is_passable(to, 0) || !self.can_stand(to, large) {
            return false;
        }

        // Horizontal part is checked on the level we leave from
        let flat_to = IVec3::new(to.x, to.y, from.z);
        if d.x != 0 && d.y != 0 {
            let via_x = from + IVec3::new(d.x, 0, 0);
            let via_y = from + IVec3::new(0, d.y, 0);
            if !self.is_passable(via_x, 0) || !self.is_passable(via_y, 0) {
                return false;
            }
            let blocked = self.edge_blocked(from, via_x).is_some()
                || self.edge_blocked(from, via_y).is_some()
                || self.edge_blocked(via_x, flat_to).is_some()
                || self.edge_blocked(via_y, flat_to).is_some();
            return !blocked;
        }
        self.edge_blocked(from, flat_to).is_none()
    }

    fn vision_blockage(&self, tile: TilePos) -> i32 {
        self.tile(tile).map_or(0, |t| t.vision_blockage)
    }

    fn find_collision(&self, from: Vec3, to: Vec3) -> Collision {
        let mut collision = Collision::default();
        let length = from.distance(to);
        let steps = ((length * COLLISION_SAMPLES_PER_TILE).ceil() as u32).max(1);

        let mut last = tile_of(from);
        if !self.contains(last) {
            return collision;
        }
        collision.tiles_passed.push(last);

        for step in 1..=steps {
            let point = from.lerp(to, step as f32 / steps as f32);
            let tile = tile_of(point);
            if tile == last {
                if let Some(part) = self.blocks_ray(tile, point) {
                    collision.hit = Some((part, tile));
                    return collision;
                }
                continue;
            }

            // A sample may cross an x edge and a y edge at once
            let d = tile - last;
            let mut crossings = Vec::with_capacity(2);
            if d.x != 0 {
                crossings.push((last, last + IVec3::new(d.x, 0, 0)));
            }
            if d.y != 0 {
                let start = last + IVec3::new(d.x, 0, 0);
                crossings.push((start, start + IVec3::new(0, d.y, 0)));
            }
            for (a, b) in crossings {
                if let Some((part, wall_tile)) = self.edge_blocked(a, b) {
                    if wall_tile == tile {
                        collision.tiles_passed.push(tile);
                    }
                    collision.hit = Some((part, wall_tile));
                    return collision;
                }
            }

            if !self.contains(tile) {
                return collision;
            }
            collision.tiles_passed.push(tile);
            last = tile;

            if let Some(part) = self.blocks_ray(tile, point) {
                collision.hit = Some((part, tile));
                return collision;
            }
        }
        collision
    }

    fn find_shortest_path(
        &self,
        start: TilePos,
        goal: TilePos,
        cost_limit: f32,
        large: bool,
    ) -> Vec<TilePos> {
        find_path(self, start, goal, cost_limit, large)
    }

    fn los_block_index(&self, tile: TilePos) -> Option<usize> {
        if !self.contains(tile) {
            return None;
        }
        let blocks_x = (self.size.x + LOS_BLOCK_SIZE - 1) / LOS_BLOCK_SIZE;
        let bx = tile.x / LOS_BLOCK_SIZE;
        let by = tile.y / LOS_BLOCK_SIZE;
        Some((bx + by * blocks_x) as usize)
    }

    fn los_block(&self, index: usize) -> Option<LosBlock> {
        if index >= self.los_block_count() {
            return None;
        }
        let blocks_x = ((self.size.x + LOS_BLOCK_SIZE - 1) / LOS_BLOCK_SIZE) as usize;
        let bx = (index % blocks_x) as i32;
        let by = (index / blocks_x) as i32;
        let start = IVec3::new(bx * LOS_BLOCK_SIZE, by * LOS_BLOCK_SIZE, 0);
        let end = (start + IVec3::new(LOS_BLOCK_SIZE, LOS_BLOCK_SIZE, self.size.z)).min(self.size);
        Some(LosBlock { start, end })
    }

    fn los_block_count(&self) -> usize {
        let blocks_x = (self.size.x + LOS_BLOCK_SIZE - 1) / LOS_BLOCK_SIZE;
        let blocks_y = (self.size.y + LOS_BLOCK_SIZE - 1) / LOS_BLOCK_SIZE;
        (blocks_x * blocks_y) as usize
    }

    fn units_at(&self, tile: TilePos) -> Vec<UnitId> {
        self.occupancy.get(&tile).cloned().unwrap_or_default()
    }

    fn place_unit(&mut self, unit: UnitId, tile: Option<TilePos>) {
        if let Some(previous) = self.unit_tiles.remove(&unit) {
            if let Some(units) = self.occupancy.get_mut(&previous) {
                units.retain(|u| *u != unit);
                if units.is_empty() {
                    self.occupancy.remove(&previous);
                }
            }
        }
        if let Some(tile) = tile {
            self.unit_tiles.insert(unit, tile);
            self.occupancy.entry(tile).or_default().push(unit);
        }
    }

    fn is_exit(&self, tile: TilePos) -> bool {
        self.tile(tile).is_some_and(|t| t.exit)
    }

    fn walk_sfx(&self, tile: TilePos) -> &[String] {
        self.tile(tile)
            .map(|t| t.walk_sfx.as_slice())
            .unwrap_or(&[])
    }
}
