//! Per-faction fog of war and unit vision
//!
//! Vision is reactive: a unit recomputes what it sees when it moves, turns,
//! changes pose or wakes up. Seen tiles are remembered per faction for the
//! rest of the battle; seen rival units are tracked per unit and merged into
//! a faction-wide set.

use ahash::{AHashMap, AHashSet};
use glam::{IVec3, Vec3};

use crate::battle::constants::{LOS_RANGE, VISION_ARC_HALF_WIDTH};
use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::services::MapPart;
use crate::battle::unit::BattleUnit;
use crate::core::types::{OwnerId, TilePos, UnitId};

/// What each faction has seen so far
#[derive(Debug, Clone, Default)]
pub struct VisibilityIndex {
    size: IVec3,
    block_count: usize,
    tiles: AHashMap<OwnerId, Vec<bool>>,
    blocks: AHashMap<OwnerId, Vec<bool>>,
    units: AHashMap<OwnerId, AHashSet<UnitId>>,
}

impl VisibilityIndex {
    pub fn new(size: IVec3, block_count: usize) -> Self {
        Self {
            size,
            block_count,
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.blocks.clear();
        self.units.clear();
    }

    fn tile_index(&self, tile: TilePos) -> Option<usize> {
        if tile.cmplt(IVec3::ZERO).any() || tile.cmpge(self.size).any() {
            return None;
        }
        Some((tile.z * self.size.x * self.size.y + tile.y * self.size.x + tile.x) as usize)
    }

    pub fn is_tile_visible(&self, owner: OwnerId, tile: TilePos) -> bool {
        match (self.tile_index(tile), self.tiles.get(&owner)) {
            (Some(i), Some(tiles)) => tiles[i],
            _ => false,
        }
    }

    pub fn set_tile_visible(&mut self, owner: OwnerId, tile: TilePos) {
        let Some(i) = self.tile_index(tile) else {
            return;
        };
        let len = (self.size.x * self.size.y * self.size.z).max(0) as usize;
        self.tiles.entry(owner).or_insert_with(|| vec![false; len])[i] = true;
    }

    pub fn is_block_visible(&self, owner: OwnerId, block: usize) -> bool {
        self.blocks
            .get(&owner)
            .and_then(|b| b.get(block).copied())
            .unwrap_or(false)
    }

    fn set_block_visible(&mut self, owner: OwnerId, block: usize) {
        let count = self.block_count;
        if let Some(b) = self.blocks.entry(owner).or_insert_with(|| vec![false; count]).get_mut(block) {
            *b = true;
        }
    }

    pub fn visible_tile_count(&self, owner: OwnerId) -> usize {
        self.tiles
            .get(&owner)
            .map_or(0, |t| t.iter().filter(|v| **v).count())
    }

    /// Rival units currently seen by anyone in the faction
    pub fn units_seen_by(&self, owner: OwnerId) -> impl Iterator<Item = UnitId> + '_ {
        self.units.get(&owner).into_iter().flat_map(|s| s.iter().copied())
    }

    pub fn is_unit_seen_by(&self, owner: OwnerId, unit: UnitId) -> bool {
        self.units.get(&owner).is_some_and(|s| s.contains(&unit))
    }

    fn add_unit(&mut self, owner: OwnerId, unit: UnitId) -> bool {
        self.units.entry(owner).or_default().insert(unit)
    }

    fn remove_unit(&mut self, owner: OwnerId, unit: UnitId) -> bool {
        self.units.get_mut(&owner).is_some_and(|s| s.remove(&unit))
    }
}

/// Far tile of each of the rays sweeping the vision arc
///
/// Range falls off one tile forward for every two tiles sideways. Diagonal
/// facings flip axes halfway through the sweep.
pub fn vision_arc(tile: TilePos, facing: glam::IVec2) -> Vec<(i32, i32)> {
    let diagonal = facing.x != 0 && facing.y != 0;
    let mut swap = facing.x == 0;
    let mut inverse = false;
    let mut sign_c2 = if diagonal && facing.y > 0 { -1 } else { 1 };
    let mut sign_c1 = if (swap && facing.y < 0) || (!swap && facing.x < 0) { -1 } else { 1 };

    let mut rays = Vec::with_capacity((VISION_ARC_HALF_WIDTH * 2 + 1) as usize);
    for i in -VISION_ARC_HALF_WIDTH..=VISION_ARC_HALF_WIDTH {
        let c2 = if inverse { 1 - i } else { i };
        let c1 = LOS_RANGE - (c2.abs() + 1) / 2;
        let (x, y) = if swap {
            (tile.x + c2 * sign_c2, tile.y + c1 * sign_c1)
        } else {
            (tile.x + c1 * sign_c1, tile.y + c2 * sign_c2)
        };
        rays.push((x, y));

        if i == 0 && diagonal {
            swap = !swap;
            let previous = sign_c1;
            sign_c1 = -sign_c2;
            sign_c2 = -previous;
            inverse = true;
        }
    }
    rays
}

impl BattleUnit {
    /// Recompute what this unit sees and fold it into its faction's view
    pub fn update_vision(&mut self, battle: &mut BattleState) {
        let last_visible = std::mem::take(&mut self.visible_units);

        if self.is_conscious() && !self.is_gone() {
            self.mark_los_block(battle);
            self.sweep_vision_arc(battle);
        }

        for unit in &self.visible_units {
            if !last_visible.contains(unit) && battle.visibility.add_unit(self.owner, *unit) {
                battle.log_event(
                    BattleEventType::UnitSpotted {
                        owner: self.owner,
                        unit: *unit,
                    },
                    format!("{} spotted {}", self.id, unit),
                );
            }
        }

        for unit in last_visible.difference(&self.visible_units) {
            let someone_else_sees = battle
                .units
                .values()
                .any(|u| u.owner == self.owner && !u.is_gone() && u.visible_units.contains(unit));
            if !someone_else_sees && battle.visibility.remove_unit(self.owner, *unit) {
                battle.log_event(
                    BattleEventType::UnitLost {
                        owner: self.owner,
                        unit: *unit,
                    },
                    format!("{} lost sight of {}", self.id, unit),
                );
            }
        }
    }

    fn mark_los_block(&self, battle: &mut BattleState) {
        let Some(index) = battle.map.los_block_index(self.tile()) else {
            return;
        };
        if battle.visibility.is_block_visible(self.owner, index) {
            return;
        }
        battle.visibility.set_block_visible(self.owner, index);
        if let Some(block) = battle.map.los_block(index) {
            for tile in block.tiles() {
                battle.visibility.set_tile_visible(self.owner, tile);
            }
        }
    }

    fn sweep_vision_arc(&mut self, battle: &mut BattleState) {
        let eyes = self.muzzle_location();
        let here = self.tile();
        let levels = battle.map.size().z;

        for (x, y) in vision_arc(here, self.facing.offset()) {
            for z in 0..levels {
                let target = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
                let mut collision = battle.map.find_collision(eyes, target);

                // Walls and floors are only seen from their front side
                let back_face = match collision.hit {
                    Some((MapPart::Ground, _)) => z > here.z,
                    Some((MapPart::LeftWall, _)) => x > here.x,
                    Some((MapPart::RightWall, _)) => y > here.y,
                    _ => false,
                };
                if back_face {
                    collision.tiles_passed.pop();
                }

                self.walk_ray(battle, &collision.tiles_passed, here);
            }
        }
    }

    /// Mark tiles along a ray until range plus accumulated smoke runs out
    fn walk_ray(&mut self, battle: &mut BattleState, tiles: &[TilePos], here: TilePos) {
        let mut blockage_so_far = 0.0f32;
        let mut distance_to_last_tile = 0;
        let mut accumulated_since_last_tile = 0.0f32;
        let mut tiles_with_blockage = 0;

        for tile in tiles.iter().copied().filter(|t| *t != here) {
            let distance = (tile.as_vec3() - self.position).length();
            let whole = distance as i32;
            if whole > distance_to_last_tile {
                if tiles_with_blockage > 0 {
                    blockage_so_far += accumulated_since_last_tile
                        * (whole - distance_to_last_tile) as f32
                        / tiles_with_blockage as f32;
                }
                distance_to_last_tile = whole;
                accumulated_since_last_tile = 0.0;
                tiles_with_blockage = 0;
            }

            if (distance + blockage_so_far) as i32 > LOS_RANGE {
                break;
            }

            let blockage = battle.map.vision_blockage(tile);
            if blockage > 0 {
                accumulated_since_last_tile += blockage as f32;
                tiles_with_blockage += 1;
            }

            battle.visibility.set_tile_visible(self.owner, tile);
            for other in battle.map.units_at(tile) {
                if other == self.id {
                    continue;
                }
                let seen = battle
                    .units
                    .get(&other)
                    .is_some_and(|u| u.owner != self.owner && u.is_conscious() && !u.is_gone());
                if seen {
                    self.visible_units.insert(other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::facing::Facing;
    use crate::battle::grid_map::GridMap;
    use crate::battle::testing::*;

    fn map_battle(map: GridMap) -> BattleState {
        let mut battle = BattleState::new(
            Box::new(map),
            Box::new(crate::battle::animation::TableAnimationPack::new(2, 2, 1)),
            Default::default(),
        );
        battle.start_battle();
        battle
    }

    #[test]
    fn test_arc_has_27_rays() {
        for facing in Facing::ALL {
            assert_eq!(vision_arc(IVec3::ZERO, facing.offset()).len(), 27);
        }
    }

    #[test]
    fn test_arc_east_reaches_twenty() {
        let rays = vision_arc(IVec3::new(2, 10, 0), Facing::East.offset());
        assert!(rays.contains(&(22, 10)));
        assert!(rays.contains(&(15, 23)));
        assert!(rays.contains(&(15, -3)));
        assert!(rays.iter().all(|(x, _)| *x > 2));
    }

    #[test]
    fn test_arc_north_points_up() {
        let rays = vision_arc(IVec3::new(10, 30, 0), Facing::North.offset());
        assert!(rays.contains(&(10, 10)));
        assert!(rays.iter().all(|(_, y)| *y < 30));
    }

    #[test]
    fn test_arc_diagonal_covers_both_axes() {
        let rays = vision_arc(IVec3::new(0, 0, 0), Facing::SouthEast.offset());
        assert!(rays.iter().all(|(x, y)| *x >= 0 && *y >= 0));
        assert!(rays.iter().any(|(x, y)| x > y));
        assert!(rays.iter().any(|(x, y)| y > x));
    }

    #[test]
    fn test_rival_in_front_is_seen() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        assert!(battle.unit(a).unwrap().visible_units.contains(&b));
        assert!(battle.visibility.is_unit_seen_by(OwnerId(0), b));
        assert!(battle.visibility.is_tile_visible(OwnerId(0), IVec3::new(17, 10, 0)));
    }

    #[test]
    fn test_rival_behind_is_not_seen() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (20, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (5, 10), Facing::East);
        assert!(!battle.unit(a).unwrap().visible_units.contains(&b));
    }

    #[test]
    fn test_feature_blocks_sight() {
        let mut map = GridMap::new(IVec3::new(32, 32, 1));
        for y in 0..32 {
            map.set_feature(IVec3::new(10, y, 0), true);
        }
        let mut battle = map_battle(map);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        assert!(!battle.unit(a).unwrap().visible_units.contains(&b));
        assert!(battle.visibility.is_tile_visible(OwnerId(0), IVec3::new(10, 10, 0)));
        assert!(!battle.visibility.is_tile_visible(OwnerId(0), IVec3::new(17, 10, 0)));
    }

    #[test]
    fn test_smoke_shortens_sight() {
        let mut map = GridMap::new(IVec3::new(32, 32, 1));
        for x in 4..9 {
            for y in 0..32 {
                map.set_vision_blockage(IVec3::new(x, y, 0), 4);
            }
        }
        let mut battle = map_battle(map);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        assert!(!battle.unit(a).unwrap().visible_units.contains(&b));
    }

    #[test]
    fn test_unconscious_unit_sees_nothing() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        battle.command(a, |unit, battle| {
            unit.stun_damage_in_ticks = 1000 * crate::battle::constants::STUN_TICKS_PER_POINT;
            unit.update_vision(battle);
            assert!(unit.visible_units.is_empty());
        });
        assert!(!battle.visibility.is_unit_seen_by(OwnerId(0), b));
    }

    #[test]
    fn test_faction_keeps_unit_while_teammate_sees_it() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let _c = spawn(&mut battle, OwnerId(0), (2, 12), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        battle.command(a, |unit, battle| unit.set_facing(battle, Facing::West));
        assert!(!battle.unit(a).unwrap().visible_units.contains(&b));
        assert!(battle.visibility.is_unit_seen_by(OwnerId(0), b));
    }

    #[test]
    fn test_destroyed_unit_stops_seeing() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        battle.command(a, |unit, battle| unit.destroy(battle));
        assert!(battle.unit(a).unwrap().visible_units.is_empty());
        assert!(!battle.visibility.is_unit_seen_by(OwnerId(0), b));
        assert_eq!(
            battle
                .events_of(|e| matches!(e, BattleEventType::UnitLost { unit, .. } if *unit == b))
                .count(),
            1
        );
    }

    #[test]
    fn test_gone_teammate_does_not_hold_sight() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let c = spawn(&mut battle, OwnerId(0), (2, 12), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (17, 10), Facing::West);
        battle.units.get_mut(&c).unwrap().retreated = true;
        battle.command(a, |unit, battle| unit.set_facing(battle, Facing::West));
        assert!(battle.unit(c).unwrap().visible_units.contains(&b));
        assert!(!battle.visibility.is_unit_seen_by(OwnerId(0), b));
    }

    #[test]
    fn test_los_block_marked_on_spawn() {
        let mut battle = open_battle(32);
        spawn(&mut battle, OwnerId(0), (2, 10), Facing::North);
        assert!(battle.visibility.is_tile_visible(OwnerId(0), IVec3::new(7, 15, 0)));
        assert!(!battle.visibility.is_tile_visible(OwnerId(1), IVec3::new(7, 15, 0)));
    }

    #[test]
    fn test_end_battle_discards_index() {
        let mut battle = open_battle(32);
        spawn(&mut battle, OwnerId(0), (2, 10), Facing::North);
        battle.end_battle();
        assert_eq!(battle.visibility.visible_tile_count(OwnerId(0)), 0);
    }
}
