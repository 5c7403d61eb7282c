//! Coordinated movement of a selection of units
//!
//! One unit leads to the target; the rest fan out into formation slots
//! around wherever the leader ends up, oriented by the leader's approach.
//!
//! ```text
//!  arrive from the southwest          arrive from the south
//!
//!          6                                   7
//!        5   6                               7   7
//!      4   5   6                           6   6   6
//!    3   F   5   6                       5   5   5   5
//!  2   1   G   5   6                   F   F   G   F   F
//!    2   1   F   5                       4   1   1   4
//!      2   1   4                           2   2   2
//!        2   3                               3   3
//!          2                                   3
//!
//!  G goal, F flanks, 1-3 back rows and their sides, 5-7 front rows
//! ```

use glam::{IVec2, IVec3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::battle::execution::BattleState;
use crate::battle::mission::Mission;
use crate::core::types::{tile_distance, TilePos, UnitId};

/// Slots around a goal approached diagonally, from the northeast when unrotated
const DIAGONAL_OFFSETS: [(i32, i32); 24] = [
    // Flanks
    (-1, -1),
    (1, 1),
    // 1st back row
    (-1, 1),
    (-2, 0),
    (0, 2),
    // 2nd back row
    (-2, 2),
    (-3, 1),
    (-1, 3),
    (-4, 0),
    (0, 4),
    // Sides of the 1st back row
    (-3, -1),
    (1, 3),
    // Sides of the flanks
    (-2, -2),
    (2, 2),
    // 1st front row
    (1, -1),
    (0, -2),
    (2, 0),
    (-1, -3),
    (3, 1),
    // 2nd front row
    (2, -2),
    (1, -3),
    (3, -1),
    (0, -4),
    (4, 0),
];

/// Slots around a goal approached straight, from the south when unrotated
const LINEAR_OFFSETS: [(i32, i32); 24] = [
    // 1st back row
    (-1, 1),
    (1, 1),
    // 2nd back row
    (0, 2),
    (-2, 2),
    (2, 2),
    // 3rd back row
    (-1, 3),
    (1, 3),
    (0, 4),
    // Sides of the 1st back row
    (-3, 1),
    (3, 1),
    // Flanks
    (-2, 0),
    (2, 0),
    (-4, 0),
    (4, 0),
    // 1st front row
    (-1, -1),
    (1, -1),
    (-3, -1),
    (3, -1),
    // 2nd front row
    (0, -2),
    (-2, -2),
    (2, -2),
    // 3rd front row
    (-1, -3),
    (1, -3),
    (0, -4),
];

/// Quarter turns clockwise
fn rotate(offset: IVec2, quarter_turns: u8) -> IVec2 {
    match quarter_turns % 4 {
        1 => IVec2::new(-offset.y, offset.x),
        2 => IVec2::new(-offset.x, -offset.y),
        3 => IVec2::new(offset.y, -offset.x),
        _ => offset,
    }
}

/// Formation table and its rotation for an approach direction
fn formation_for(direction: IVec2) -> (&'static [(i32, i32)], u8) {
    if direction.x != 0 && direction.y != 0 {
        let turns = match (direction.x, direction.y) {
            (1, 1) => 1,
            (-1, 1) => 2,
            (-1, -1) => 3,
            _ => 0,
        };
        (&DIAGONAL_OFFSETS[..], turns)
    } else {
        let turns = match (direction.x, direction.y) {
            (1, 0) => 1,
            (0, 1) => 2,
            (-1, 0) => 3,
            _ => 0,
        };
        (&LINEAR_OFFSETS[..], turns)
    }
}

/// Outcome of a group move order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMovePlan {
    pub leader: UnitId,
    /// Where the leader is going; the requested target if reachable
    pub target: TilePos,
    /// Formation slot given to each follower
    pub assignments: Vec<(UnitId, TilePos)>,
    /// Followers left without a slot or that refused their order
    pub unplaced: Vec<UnitId>,
}

impl BattleState {
    /// Units ordered by how soon they could reach `target`
    fn sorted_by_arrival(&self, units: &mut [UnitId], target: TilePos) {
        units.sort_by_key(|id| {
            self.unit(*id).map_or(OrderedFloat(f32::INFINITY), |u| {
                let speed = u.agent.modified_stats.actual_speed() as f32;
                OrderedFloat(tile_distance(u.tile(), target) as f32 / speed)
            })
        });
    }

    fn goto_order(target: TilePos, demand_give_way: bool) -> Mission {
        let mission = Mission::goto_location(target);
        if demand_give_way {
            mission.demanding_give_way()
        } else {
            mission
        }
    }

    fn cancel_trial(&mut self, unit: UnitId, target: TilePos) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.cancel_goto(target);
        }
    }

    /// Send a group of units to `target` in formation
    ///
    /// Returns `None` when no unit can take a movement order toward the
    /// target.
    pub fn group_move(&mut self, units: &[UnitId], target: TilePos, demand_give_way: bool) -> Option<GroupMovePlan> {
        let mut candidates: Vec<UnitId> = units
            .iter()
            .copied()
            .filter(|id| self.unit(*id).is_some_and(|u| !u.is_gone()))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        self.sorted_by_arrival(&mut candidates, target);
        debug!(?target, units = candidates.len(), "group move, looking for a leader");

        // The leader is whoever gets closest; reaching the target ends the search
        let mut leader: Option<(UnitId, TilePos, Vec<TilePos>)> = None;
        let mut best_distance = i32::MAX;
        let mut dropped = Vec::new();
        for &id in &candidates {
            let order = Self::goto_order(target, demand_give_way);
            let added = self.command(id, |u, b| u.set_mission(b, order)).unwrap_or(false);
            if !added {
                debug!(unit = %id, "cannot take a move order, dropped from group");
                dropped.push(id);
                continue;
            }
            let start = self.unit(id).map_or(target, |u| u.tile());
            let path = self
                .command(id, |u, b| u.planned_path_to(b, target))
                .flatten()
                .unwrap_or_default();
            let end = path.last().copied().or((start == target).then_some(start));
            let Some(end) = end else {
                self.cancel_trial(id, target);
                continue;
            };

            let distance = tile_distance(end, target);
            if distance < best_distance {
                if let Some((previous, ..)) = leader.take() {
                    self.cancel_trial(previous, target);
                }
                best_distance = distance;
                leader = Some((id, start, path));
            } else {
                self.cancel_trial(id, target);
            }
            if distance == 0 {
                break;
            }
        }

        let Some((leader, leader_start, leader_path)) = leader else {
            warn!(?target, "no unit could path toward the group target");
            return None;
        };

        // Settle for the leader's destination if the target was out of reach
        let target = leader_path.last().copied().unwrap_or(leader_start);
        let from = if leader_path.len() > 3 {
            leader_path[leader_path.len() - 4]
        } else {
            leader_start
        };
        let mut direction = (target - from).truncate().clamp(IVec2::splat(-1), IVec2::ONE);
        if direction == IVec2::ZERO {
            direction = IVec2::new(0, -1);
        }
        let (offsets, turns) = formation_for(direction);

        let mut followers: Vec<UnitId> = candidates
            .into_iter()
            .filter(|id| *id != leader && !dropped.contains(id))
            .collect();
        self.sorted_by_arrival(&mut followers, target);

        let large = self.unit(leader).is_some_and(|u| u.is_large());
        let mut slots = offsets.iter();
        let mut assignments = Vec::new();
        let mut unplaced = Vec::new();
        for id in followers {
            let mut placed = false;
            for &(x, y) in slots.by_ref() {
                let offset = rotate(IVec2::new(x, y), turns);
                let slot = target + IVec3::new(offset.x, offset.y, 0);
                if !self.map.contains(slot) {
                    continue;
                }
                let reach = offset.x.abs().max(offset.y.abs()) + offset.x.abs() + offset.y.abs();
                let cost_limit = 1.5 * 2.0 * reach as f32;
                let path = self.map.find_shortest_path(target, slot, cost_limit, large);
                if path.last() != Some(&slot) {
                    continue;
                }
                // The first reachable slot is this unit's, taken or not
                let order = Self::goto_order(slot, demand_give_way);
                if self.command(id, |u, b| u.set_mission(b, order)).unwrap_or(false) {
                    assignments.push((id, slot));
                    placed = true;
                }
                break;
            }
            if !placed {
                unplaced.push(id);
            }
        }
        if !unplaced.is_empty() {
            warn!(count = unplaced.len(), "some units were left without a formation slot");
        }

        info!(%leader, ?target, followers = assignments.len(), "group move ordered");
        Some(GroupMovePlan {
            leader,
            target,
            assignments,
            unplaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::facing::Facing;
    use crate::battle::grid_map::GridMap;
    use crate::battle::mission::MissionType;
    use crate::battle::testing::*;
    use crate::core::types::OwnerId;

    #[test]
    fn test_rotation_quarter_turns() {
        let v = IVec2::new(-1, 1);
        assert_eq!(rotate(v, 0), v);
        assert_eq!(rotate(v, 1), IVec2::new(-1, -1));
        assert_eq!(rotate(v, 2), IVec2::new(1, -1));
        assert_eq!(rotate(v, 3), IVec2::new(1, 1));
        assert_eq!(rotate(v, 4), v);
    }

    #[test]
    fn test_formation_picks_table_by_direction() {
        assert_eq!(formation_for(IVec2::new(1, -1)).1, 0);
        assert_eq!(formation_for(IVec2::new(-1, -1)).1, 3);
        assert_eq!(formation_for(IVec2::new(0, -1)).1, 0);
        assert_eq!(formation_for(IVec2::new(-1, 0)).1, 3);
        assert_eq!(formation_for(IVec2::new(1, 1)).0.len(), DIAGONAL_OFFSETS.len());
    }

    #[test]
    fn test_line_approaching_from_west() {
        let mut battle = open_battle(24);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(0), (3, 10), Facing::East);
        let c = spawn(&mut battle, OwnerId(0), (4, 10), Facing::East);

        let plan = battle.group_move(&[a, b, c], IVec3::new(20, 10, 0), false).unwrap();
        assert_eq!(plan.leader, c);
        assert_eq!(plan.target, IVec3::new(20, 10, 0));
        assert_eq!(
            plan.assignments,
            vec![(b, IVec3::new(19, 9, 0)), (a, IVec3::new(19, 11, 0))]
        );
        assert!(plan.unplaced.is_empty());

        // The leader keeps its order
        let leader = battle.unit(c).unwrap();
        let mode = battle.config.mode;
        assert!(leader.missions.iter().any(|m| {
            m.mission_type() == MissionType::GotoLocation
                && m.goto_target() == Some(plan.target)
                && !m.is_finished(leader, mode)
        }));
    }

    #[test]
    fn test_busy_follower_gives_up_its_slot() {
        let mut battle = open_battle(24);
        let thrower = spawn_with_grenade(&mut battle, OwnerId(0), (3, 10), Facing::East);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let c = spawn(&mut battle, OwnerId(0), (4, 10), Facing::East);
        battle.command(thrower, |unit, battle| {
            let mode = battle.config.mode;
            let throw = Mission::throw_item(unit, mode, GRENADE, glam::Vec3::new(3.5, 5.5, 0.0)).unwrap();
            assert!(unit.set_mission(battle, throw));
        });

        let plan = battle.group_move(&[a, thrower, c], IVec3::new(20, 10, 0), false).unwrap();
        assert_eq!(plan.leader, c);
        assert_eq!(plan.unplaced, vec![thrower]);
        assert_eq!(plan.assignments, vec![(a, IVec3::new(19, 11, 0))]);
        assert_eq!(
            battle.unit(thrower).unwrap().missions.front().map(|m| m.mission_type()),
            Some(MissionType::ThrowItem)
        );
    }

    #[test]
    fn test_unreachable_target_moves_toward_nearest_tile() {
        let mut map = GridMap::new(IVec3::new(16, 16, 1));
        map.set_feature(IVec3::new(12, 5, 0), true);
        let mut battle = crate::battle::execution::BattleState::new(
            Box::new(map),
            Box::new(crate::battle::animation::TableAnimationPack::new(2, 2, 1)),
            crate::core::config::BattleConfig::default(),
        );
        battle.start_battle();
        let a = spawn(&mut battle, OwnerId(0), (2, 5), Facing::East);
        let plan = battle.group_move(&[a], IVec3::new(12, 5, 0), false).unwrap();
        assert_eq!(plan.leader, a);
        assert_ne!(plan.target, IVec3::new(12, 5, 0));
        assert_eq!(tile_distance(plan.target, IVec3::new(12, 5, 0)), 2);
    }

    #[test]
    fn test_gone_units_are_ignored() {
        let mut battle = open_battle(12);
        let a = spawn(&mut battle, OwnerId(0), (2, 2), Facing::East);
        battle.units.get_mut(&a).unwrap().retreated = true;
        assert!(battle.group_move(&[a], IVec3::new(8, 8, 0), false).is_none());
    }
}
