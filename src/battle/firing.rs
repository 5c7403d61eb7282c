//! Targeting and weapon firing
//!
//! Attacking is a standing order: the unit keeps aiming and firing the
//! weapons in the selected hands until the target is lost, goes out of
//! range or the order is withdrawn.

use glam::Vec3;
use tracing::debug;

use crate::battle::constants::TILE_GROUND_TARGET_HEIGHT;
use crate::battle::equipment::EquipmentSlot;
use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::mission::{Mission, MissionKind};
use crate::battle::states::{BodyState, HandState, MovementState, TargetingMode, WeaponStatus};
use crate::battle::unit::BattleUnit;
use crate::core::types::{tile_of, BattleMode, ItemId, TilePos, UnitId};

impl BattleUnit {
    /// Set the hands to fire with, merging with any current order
    pub fn start_attacking(&mut self, battle: &BattleState, status: WeaponStatus) {
        let mut status = status;
        match battle.config.mode {
            BattleMode::TurnBased => {
                // A running order cannot be overridden in turn-based play
                if self.is_attacking() {
                    return;
                }
                // One hand at a time, right hand first
                if status == WeaponStatus::FiringBothHands {
                    let right_ready = self
                        .agent
                        .item_in_slot(EquipmentSlot::RightHand)
                        .is_some_and(|w| w.can_fire());
                    status = if right_ready {
                        WeaponStatus::FiringRightHand
                    } else {
                        WeaponStatus::FiringLeftHand
                    };
                }
            }
            BattleMode::RealTime => {
                let opposite = matches!(
                    (self.weapon_status, status),
                    (WeaponStatus::FiringLeftHand, WeaponStatus::FiringRightHand)
                        | (WeaponStatus::FiringRightHand, WeaponStatus::FiringLeftHand)
                );
                if opposite {
                    status = WeaponStatus::FiringBothHands;
                }
            }
        }
        self.weapon_status = status;
        self.ticks_till_next_target_check = 0;
    }

    pub fn start_attacking_unit(&mut self, battle: &BattleState, target: UnitId, status: WeaponStatus) {
        self.start_attacking(battle, status);
        self.target_unit = Some(target);
        self.targeting_mode = TargetingMode::Unit;
    }

    /// Fire at a tile, either level with the muzzle or at the ground
    pub fn start_attacking_tile(&mut self, battle: &BattleState, tile: TilePos, status: WeaponStatus, at_ground: bool) {
        self.start_attacking(battle, status);
        self.target_tile = tile;
        self.targeting_mode = if at_ground {
            TargetingMode::TileGround
        } else {
            TargetingMode::TileCenter
        };
    }

    pub fn stop_attacking(&mut self) {
        self.weapon_status = WeaponStatus::NotFiring;
        self.targeting_mode = TargetingMode::NoTarget;
        self.target_unit = None;
        self.ticks_till_next_target_check = 0;
        for slot in [EquipmentSlot::RightHand, EquipmentSlot::LeftHand] {
            if let Some(weapon) = self.agent.item_in_slot_mut(slot) {
                weapon.stop_firing();
            }
        }
    }

    /// Where the current target is, if any
    pub fn target_position(&self, battle: &BattleState) -> Option<Vec3> {
        match self.targeting_mode {
            TargetingMode::Unit => self
                .target_unit
                .and_then(|id| battle.unit(id))
                .filter(|u| !u.is_gone())
                .map(BattleUnit::voxel_center),
            TargetingMode::TileCenter => {
                // Shoot parallel to the ground
                let muzzle_z = self.muzzle_location().z;
                Some(self.target_tile.as_vec3() + Vec3::new(0.5, 0.5, muzzle_z.fract()))
            }
            TargetingMode::TileGround => {
                Some(self.target_tile.as_vec3() + Vec3::new(0.5, 0.5, TILE_GROUND_TARGET_HEIGHT))
            }
            TargetingMode::NoTarget => None,
        }
    }

    /// Reload if needed; the weapon in `slot` if it can fire afterwards
    fn ready_weapon(&mut self, slot: EquipmentSlot) -> Option<ItemId> {
        let weapon = self.agent.item_in_slot_mut(slot)?;
        if weapon.needs_reload() {
            weapon.load_ammo();
        }
        weapon.can_fire().then_some(weapon.id)
    }

    pub fn update_firing(&mut self, battle: &mut BattleState, ticks: u32) {
        let muzzle = self.muzzle_location();
        let target_position = self.target_position(battle);

        let (mut right, mut left) = match self.weapon_status {
            WeaponStatus::FiringBothHands => (
                self.ready_weapon(EquipmentSlot::RightHand),
                self.ready_weapon(EquipmentSlot::LeftHand),
            ),
            WeaponStatus::FiringRightHand => (self.ready_weapon(EquipmentSlot::RightHand), None),
            WeaponStatus::FiringLeftHand => (None, self.ready_weapon(EquipmentSlot::LeftHand)),
            WeaponStatus::NotFiring => (None, None),
        };

        if self.is_attacking() {
            if self.targeting_mode == TargetingMode::Unit {
                self.ticks_till_next_target_check = self.ticks_till_next_target_check.saturating_sub(ticks);
            }
            let mut can_fire = (right.is_some() || left.is_some()) && target_position.is_some();

            // Tile targets are checked once after starting and once each
            // time the unit stops moving
            if can_fire && self.ticks_till_next_target_check == 0 {
                self.ticks_till_next_target_check = battle.config.target_check_interval;
                if self.targeting_mode == TargetingMode::Unit {
                    match self.target_unit.and_then(|id| battle.unit(id)) {
                        Some(target) if target.is_conscious() && !target.is_gone() => {
                            self.target_tile = tile_of(target.position);
                        }
                        _ => can_fire = false,
                    }
                }
                if let (true, Some(target)) = (can_fire, target_position) {
                    let in_range = |id: Option<ItemId>, unit: &BattleUnit| {
                        id.filter(|id| unit.agent.item(*id).is_some_and(|w| w.in_range(muzzle, target)))
                    };
                    right = in_range(right, self);
                    left = in_range(left, self);
                    can_fire = right.is_some() || left.is_some();
                }
                if can_fire && self.current_movement_state == MovementState::None {
                    self.turn_to_target(battle);
                }
            }

            if !can_fire {
                debug!(unit = %self.id, "cannot keep firing, stopping attack");
                self.stop_attacking();
            }
        }

        if self.is_attacking() {
            self.process_firing(battle, muzzle, target_position, right, left);
        } else if self.aiming_ticks_remaining > 0 {
            self.aiming_ticks_remaining = self.aiming_ticks_remaining.saturating_sub(ticks);
        } else if self.firing_animation_ticks_remaining == 0
            && self.hand_animation_ticks_remaining == 0
            && self.current_hand_state == HandState::Aiming
        {
            self.begin_hand_state_change(battle, HandState::AtEase);
        }
    }

    fn turn_to_target(&mut self, battle: &mut BattleState) {
        let mode = battle.config.mode;
        let wanted = crate::battle::facing::Facing::toward_tile(self.tile(), self.target_tile);
        let already_queued = self.missions.iter().any(|m| {
            matches!(m.kind, MissionKind::Turn { target_facing } if Some(target_facing) == wanted)
        });
        if already_queued {
            return;
        }
        if let Some(turn) = Mission::turn(self, mode, self.target_tile) {
            if turn.is_finished(self, mode) {
                self.refund_time_units(mode, turn.cost_paid_up_front);
            } else {
                self.add_mission(battle, turn);
            }
        }
    }

    fn process_firing(
        &mut self,
        battle: &mut BattleState,
        muzzle: Vec3,
        target_position: Option<Vec3>,
        mut right: Option<ItemId>,
        mut left: Option<ItemId>,
    ) {
        let Some(target) = target_position else {
            return;
        };

        if self.target_hand_state == HandState::Aiming {
            for id in [right, left].into_iter().flatten() {
                if let Some(weapon) = self.agent.item_mut(id) {
                    if !weapon.is_firing() {
                        weapon.start_firing();
                    }
                }
            }
        }

        let mut fired = false;
        if self.firing_animation_ticks_remaining == 0 && self.target_hand_state == HandState::Aiming {
            let ready = |id: Option<ItemId>, unit: &BattleUnit| {
                id.and_then(|id| unit.agent.item(id)).is_some_and(|w| w.is_ready_to_fire())
            };
            let mut firing = if ready(right, self) {
                right.take()
            } else if ready(left, self) {
                left.take()
            } else {
                None
            };

            // Only inside the frontal half-plane
            let to_target = target - muzzle;
            let flat = Vec3::new(to_target.x, to_target.y, 0.0);
            if flat.dot(self.facing.to_vec3()) <= 0.0 {
                firing = None;
            }

            if let Some(id) = firing {
                if let Some(power) = self.agent.item_mut(id).and_then(|w| w.fire()) {
                    self.displayed_item = Some(id);
                    self.set_hand_state(battle, HandState::Firing);
                    fired = true;
                    battle.log_event(
                        BattleEventType::WeaponFired {
                            unit: self.id,
                            item: id,
                            target,
                        },
                        format!("{} fired {} (power {})", self.id, id, power),
                    );
                }
            }
        }

        // Firing at the ground or a friend is a single shot per hand
        let at_friend = self.targeting_mode == TargetingMode::Unit
            && self.target_unit.and_then(|id| battle.owner_of(id)) == Some(self.owner);
        if fired && (self.targeting_mode != TargetingMode::Unit || at_friend) {
            match self.weapon_status {
                WeaponStatus::FiringBothHands => match (right, left) {
                    (None, None) => self.stop_attacking(),
                    (None, Some(_)) => self.weapon_status = WeaponStatus::FiringLeftHand,
                    (Some(_), None) => self.weapon_status = WeaponStatus::FiringRightHand,
                    (Some(_), Some(_)) => {}
                },
                WeaponStatus::FiringLeftHand if left.is_none() => self.stop_attacking(),
                WeaponStatus::FiringRightHand if right.is_none() => self.stop_attacking(),
                _ => {}
            }
        }

        let moving_too_fast = matches!(
            self.current_movement_state,
            MovementState::Running | MovementState::Strafing
        );
        let crawling =
            self.current_body_state == BodyState::Prone && self.current_movement_state != MovementState::None;
        if self.is_attacking()
            && self.firing_animation_ticks_remaining == 0
            && self.hand_animation_ticks_remaining == 0
            && self.body_animation_ticks_remaining == 0
            && self.current_hand_state != HandState::Aiming
            && !moving_too_fast
            && !crawling
        {
            self.begin_hand_state_change(battle, HandState::Aiming);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::facing::Facing;
    use crate::battle::testing::*;
    use crate::core::types::OwnerId;
    use glam::IVec3;

    #[test]
    fn test_real_time_merges_hands() {
        let mut battle = open_battle(8);
        let id = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.start_attacking(battle, WeaponStatus::FiringLeftHand);
            unit.start_attacking(battle, WeaponStatus::FiringRightHand);
            assert_eq!(unit.weapon_status, WeaponStatus::FiringBothHands);
        });
    }

    #[test]
    fn test_turn_based_picks_one_hand_and_keeps_order() {
        let mut battle = open_turn_based_battle(8);
        let id = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.start_attacking(battle, WeaponStatus::FiringBothHands);
            assert_eq!(unit.weapon_status, WeaponStatus::FiringRightHand);
            unit.start_attacking(battle, WeaponStatus::FiringLeftHand);
            assert_eq!(unit.weapon_status, WeaponStatus::FiringRightHand);
        });
    }

    #[test]
    fn test_stop_attacking_clears_target() {
        let mut battle = open_battle(8);
        let a = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        let b = spawn(&mut battle, OwnerId(1), (3, 1), Facing::South);
        battle.command(a, |unit, battle| {
            unit.start_attacking_unit(battle, b, WeaponStatus::FiringRightHand);
            assert!(unit.is_attacking());
            unit.stop_attacking();
            assert!(!unit.is_attacking());
            assert_eq!(unit.target_unit, None);
            assert_eq!(unit.targeting_mode, TargetingMode::NoTarget);
        });
    }

    #[test]
    fn test_no_weapon_stops_attack() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.start_attacking_tile(battle, IVec3::new(3, 0, 0), WeaponStatus::FiringRightHand, false);
            unit.update_firing(battle, 1);
            assert!(!unit.is_attacking());
        });
    }

    #[test]
    fn test_target_out_of_range_stops_attack() {
        let mut battle = open_battle(40);
        let id = spawn_armed(&mut battle, OwnerId(0), (1, 1), Facing::East);
        battle.command(id, |unit, battle| {
            unit.start_attacking_tile(battle, IVec3::new(35, 1, 0), WeaponStatus::FiringRightHand, false);
            unit.update_firing(battle, 1);
            assert!(!unit.is_attacking());
        });
    }

    #[test]
    fn test_target_behind_queues_turn() {
        let mut battle = open_battle(12);
        let id = spawn_armed(&mut battle, OwnerId(0), (5, 5), Facing::North);
        battle.command(id, |unit, battle| {
            unit.start_attacking_tile(battle, IVec3::new(5, 10, 0), WeaponStatus::FiringRightHand, true);
            unit.update_firing(battle, 1);
            assert!(unit.is_attacking());
            assert_eq!(
                unit.missions.front().map(|m| m.kind.clone()),
                Some(MissionKind::Turn {
                    target_facing: Facing::South
                })
            );
        });
    }

    #[test]
    fn test_tile_center_target_is_at_muzzle_height() {
        let mut battle = open_battle(8);
        let id = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.start_attacking_tile(battle, IVec3::new(3, 0, 0), WeaponStatus::FiringRightHand, false);
            let target = unit.target_position(battle).unwrap();
            assert!((target.z - unit.muzzle_location().z.fract()).abs() < 1e-6);
            unit.start_attacking_tile(battle, IVec3::new(3, 0, 0), WeaponStatus::FiringRightHand, true);
            let target = unit.target_position(battle).unwrap();
            assert!((target.z - TILE_GROUND_TARGET_HEIGHT).abs() < 1e-6);
        });
    }

    #[test]
    fn test_aiming_relaxes_after_linger() {
        let mut battle = open_battle(8);
        let id = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.set_hand_state(battle, HandState::Aiming);
            let linger = unit.aiming_ticks_remaining;
            unit.update_firing(battle, linger);
            assert_eq!(unit.current_hand_state, HandState::Aiming);
            unit.update_firing(battle, 1);
            assert_eq!(unit.target_hand_state, HandState::AtEase);
        });
    }
}
