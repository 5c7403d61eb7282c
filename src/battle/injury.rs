//! Damage, wounds, death and the terminal exits of a unit
//!
//! Damage arrives as a power and a damage type. It is rolled, absorbed by
//! a shield or reduced by armor, and then dealt as health loss or stun.
//! Dying or passing out drops the unit to the ground and strips its gear.

use glam::Vec3;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::battle::constants::*;
use crate::battle::damage::{body_part_hit, roll_damage_0_200, roll_damage_50_150, DamageEffect, DamageType};
use crate::battle::execution::{BattleEventType, BattleState, GroundItem};
use crate::battle::mission::{Mission, MissionKind};
use crate::battle::states::{BodyPart, BodyState, HandState, MovementState};
use crate::battle::unit::BattleUnit;
use crate::core::types::{ItemId, TilePos};

/// Pose change that skips the allowance and cost checks
fn forced_body_state(target: BodyState) -> Mission {
    Mission {
        kind: MissionKind::ChangeBodyState { target },
        cost_paid_up_front: 0,
    }
}

impl BattleUnit {
    /// Body part struck by a projectile arriving at `impact` along `direction`
    pub fn determine_body_part_hit(&self, damage_type: &DamageType, impact: Vec3, direction: Vec3) -> BodyPart {
        let height = self.current_height().max(1) as f32;
        let altitude = (impact.z - self.position.z) * HEIGHT_UNITS_PER_TILE / height;
        body_part_hit(self.facing, altitude, direction, damage_type.always_impacts_head())
    }

    /// Roll and apply a hit. Returns true if a shield took it.
    pub fn apply_damage(
        &mut self,
        battle: &mut BattleState,
        power: i32,
        damage_type: &DamageType,
        part: BodyPart,
    ) -> bool {
        if damage_type.does_impact_damage() {
            let samples = battle.hit_sounds.clone();
            battle.play_random_sample(&samples, self.position, 1.0);
        }

        let mut power = power;
        let mut damage = if damage_type.effect == DamageEffect::Smoke {
            power = SMOKE_DAMAGE_POWER;
            roll_damage_50_150(&mut battle.rng, power)
        } else if damage_type.explosive || !battle.config.ufo_damage_model {
            roll_damage_50_150(&mut battle.rng, power)
        } else {
            roll_damage_0_200(&mut battle.rng, power)
        };

        if !damage_type.ignore_shield {
            if let Some(shield) = self.agent.first_shield_mut() {
                if let Some(modifier) = shield.damage_modifier().cloned() {
                    damage = damage_type.deal_damage(damage, &modifier);
                }
                shield.ammo -= damage;
                let (shield_id, depleted) = (shield.id, shield.ammo <= 0);
                if depleted {
                    debug!(unit = %self.id, item = %shield_id, "shield depleted");
                    self.agent.remove_equipment(shield_id);
                }
                battle.place_doodad(SHIELD_DOODAD, self.voxel_center());
                battle.log_event(
                    BattleEventType::ShieldAbsorbed { unit: self.id, damage },
                    format!("{}'s shield absorbed {} damage", self.id, damage),
                );
                return true;
            }
        }

        let (armor_value, modifier, armor_id) = match self.agent.armor(part) {
            Some(armor) => (
                armor.ammo,
                armor
                    .damage_modifier()
                    .cloned()
                    .unwrap_or_else(|| self.agent.agent_type.damage_modifier.clone()),
                Some(armor.id),
            ),
            None => (
                self.agent.agent_type.armor_value(part),
                self.agent.agent_type.damage_modifier.clone(),
                None,
            ),
        };
        // Smoke and gas slip past armor but not past its modifier
        let armor_value = if damage_type.ignores_armor_value() { 0 } else { armor_value };
        let damage = damage_type.deal_damage(damage, &modifier) - armor_value;
        if damage <= 0 {
            return false;
        }

        if damage_type.deals_armor_damage() {
            if let Some(armor) = armor_id.and_then(|id| self.agent.item_mut(id)) {
                armor.ammo -= damage / 10 + 1;
                if armor.ammo <= 0 {
                    let id = armor.id;
                    debug!(unit = %self.id, item = %id, "armor destroyed");
                    self.agent.remove_equipment(id);
                }
            }
        }

        battle.log_event(
            BattleEventType::UnitDamaged {
                unit: self.id,
                damage,
                part,
            },
            format!("{} took {} damage to {:?}", self.id, damage, part),
        );
        let stun_power = if damage_type.deals_stun_damage() { power } else { 0 };
        self.deal_damage(battle, damage, damage_type.deals_fatal_wounds(), part, stun_power);
        false
    }

    /// Apply rolled damage as stun (when `stun_power` > 0) or health loss
    pub fn deal_damage(
        &mut self,
        battle: &mut BattleState,
        damage: i32,
        generate_fatal_wounds: bool,
        part: BodyPart,
        stun_power: i32,
    ) {
        let was_conscious = self.is_conscious();
        let mut fatal = false;

        if stun_power > 0 {
            // Stun never exceeds the remaining health
            let cap = stun_power.min(self.health()).max(0) * STUN_TICKS_PER_POINT;
            let room = (cap - self.stun_damage_in_ticks).max(0);
            self.stun_damage_in_ticks += (damage * STUN_TICKS_PER_POINT).clamp(0, room);
        } else {
            self.agent.modified_stats.health -= damage;
        }

        if generate_fatal_wounds {
            let mut remaining = damage;
            let mut wounds = 0;
            while remaining > FATAL_WOUND_DAMAGE_STEP {
                remaining -= FATAL_WOUND_DAMAGE_STEP;
                wounds += 1;
            }
            if battle.rng.gen_range(0..FATAL_WOUND_DAMAGE_STEP) < remaining {
                wounds += 1;
            }
            if wounds > 0 {
                *self.fatal_wounds.entry(part).or_insert(0) += wounds;
                fatal = true;
                battle.log_event(
                    BattleEventType::FatalWound { unit: self.id, part },
                    format!("{} suffered {} fatal wound(s) to {:?}", self.id, wounds, part),
                );
            }
        }

        if self.is_dead() {
            self.die(battle);
            return;
        }
        if was_conscious && !self.is_conscious() {
            self.fall_unconscious(battle);
        }

        let sounds = &self.agent.agent_type.sounds;
        if fatal {
            let samples = sounds.fatal_wound.clone();
            self.play_gendered(battle, &samples);
        } else if stun_power == 0 && generate_fatal_wounds {
            let samples = sounds.damage.clone();
            self.play_gendered(battle, &samples);
        }
    }

    pub fn die(&mut self, battle: &mut BattleState) {
        for watcher in std::mem::take(&mut self.focused_by) {
            if let Some(u) = battle.units.get_mut(&watcher) {
                u.focus_unit = None;
            }
        }
        if let Some(target) = self.focus_unit.take() {
            if let Some(u) = battle.units.get_mut(&target) {
                u.focused_by.retain(|id| *id != self.id);
            }
        }

        let samples = self.agent.agent_type.sounds.die.clone();
        self.play_gendered(battle, &samples);
        battle.log_event(BattleEventType::UnitDied { unit: self.id }, format!("{} died", self.id));
        self.drop_down(battle);
    }

    pub fn fall_unconscious(&mut self, battle: &mut BattleState) {
        battle.log_event(
            BattleEventType::UnitKnockedOut { unit: self.id },
            format!("{} was knocked out", self.id),
        );
        self.drop_down(battle);
    }

    /// Collapse to the ground, shedding all gear
    pub fn drop_down(&mut self, battle: &mut BattleState) {
        self.reset_goal();
        self.stop_attacking();
        self.is_healing = false;
        self.set_movement_state(battle, MovementState::None);
        self.set_hand_state(battle, HandState::AtEase);
        let body = self.target_body_state;
        self.set_body_state(battle, body);

        // Work down to a pose that has a falling animation
        while !self.has_body_animation(battle, BodyState::Downed) {
            let allowed = |s| self.agent.is_body_state_allowed(s);
            let next = match self.current_body_state {
                BodyState::Jumping | BodyState::Throwing | BodyState::Flying
                    if allowed(BodyState::Standing) =>
                {
                    BodyState::Standing
                }
                BodyState::Jumping | BodyState::Throwing | BodyState::Flying | BodyState::Standing
                    if allowed(BodyState::Kneeling) =>
                {
                    BodyState::Kneeling
                }
                BodyState::Jumping
                | BodyState::Throwing
                | BodyState::Flying
                | BodyState::Standing
                | BodyState::Kneeling => BodyState::Prone,
                BodyState::Prone | BodyState::Downed | BodyState::Dead => break,
            };
            self.set_body_state(battle, next);
        }

        let items: Vec<ItemId> = self.agent.equipment.iter().map(|e| e.id).collect();
        for item in items {
            self.add_mission(battle, Mission::drop_item(item));
        }
        self.missions.clear();
        self.add_mission(battle, forced_body_state(BodyState::Downed));
    }

    /// Get back up after the stun wore off
    pub fn try_to_rise_up(&mut self, battle: &mut BattleState) {
        if battle.conscious_unit_at(self.tile(), self.id).is_some() {
            return;
        }

        let facing = self.facing;
        let tile = self.tile();
        let mut target = BodyState::Standing;
        while target != BodyState::Downed && !self.has_body_animation(battle, target) {
            let allowed = |s| self.agent.is_body_state_allowed(s);
            target = match target {
                BodyState::Standing if allowed(BodyState::Flying) => BodyState::Flying,
                BodyState::Standing | BodyState::Flying if allowed(BodyState::Kneeling) => {
                    BodyState::Kneeling
                }
                BodyState::Standing | BodyState::Flying | BodyState::Kneeling
                    if self.can_prone(battle, tile, facing) =>
                {
                    BodyState::Prone
                }
                _ => BodyState::Downed,
            };
        }

        // No animation to rise with, snap into anything allowed
        if target == BodyState::Downed {
            let allowed = |s| self.agent.is_body_state_allowed(s);
            target = if allowed(BodyState::Standing) {
                BodyState::Standing
            } else if allowed(BodyState::Flying) {
                BodyState::Flying
            } else if allowed(BodyState::Kneeling) {
                BodyState::Kneeling
            } else if self.can_prone(battle, tile, facing) {
                BodyState::Prone
            } else {
                error!(unit = %self.id, "unit has no pose to rise into");
                return;
            }
        }

        self.missions.clear();
        let mode = battle.config.mode;
        let mission = Mission::change_body_state(self, mode, target).unwrap_or_else(|| forced_body_state(target));
        self.add_mission(battle, mission);
        battle.log_event(BattleEventType::UnitRoseUp { unit: self.id }, format!("{} got back up", self.id));
    }

    /// Put an item on the ground at the unit's feet
    pub fn drop_item(&mut self, battle: &mut BattleState, item: ItemId) {
        let Some(equipment) = self.agent.remove_equipment(item) else {
            warn!(unit = %self.id, %item, "cannot drop an item the unit does not carry");
            return;
        };
        battle.ground_items.push(GroundItem {
            item: equipment,
            position: self.position,
        });
        battle.log_event(
            BattleEventType::ItemDropped { unit: self.id, item },
            format!("{} dropped {}", self.id, item),
        );
        self.update_displayed_item(battle);
    }

    /// Release a thrown item; it lands at `target`
    pub fn throw_item(&mut self, battle: &mut BattleState, item: ItemId, target: Vec3) {
        let Some(equipment) = self.agent.remove_equipment(item) else {
            warn!(unit = %self.id, %item, "cannot throw an item the unit does not carry");
            return;
        };
        battle.ground_items.push(GroundItem {
            item: equipment,
            position: target,
        });
        battle.log_event(
            BattleEventType::ItemThrown {
                unit: self.id,
                item,
                target,
            },
            format!("{} threw {}", self.id, item),
        );
    }

    pub fn teleport_to(&mut self, battle: &mut BattleState, tile: TilePos) {
        if !battle.map.contains(tile) {
            warn!(unit = %self.id, ?tile, "teleport target outside the map");
            return;
        }
        let position = battle.map.resting_position(tile, self.is_large());
        self.set_movement_state(battle, MovementState::None);
        self.falling = false;
        self.set_position(battle, position);
        self.reset_goal();
    }

    /// Leave the battle through an exit
    pub fn retreat(&mut self, battle: &mut BattleState) {
        battle.map.place_unit(self.id, None);
        self.retreated = true;
        self.update_vision(battle);
        battle.remove_from_squad(self);
        battle.refresh_watchers(self.id, self.owner);
        info!(unit = %self.id, "retreated");
        battle.log_event(BattleEventType::UnitRetreated { unit: self.id }, format!("{} retreated", self.id));
    }

    /// Remove the unit from play entirely
    pub fn destroy(&mut self, battle: &mut BattleState) {
        battle.map.place_unit(self.id, None);
        self.destroyed = true;
        self.missions.clear();
        self.update_vision(battle);
        battle.refresh_watchers(self.id, self.owner);
        battle.log_event(BattleEventType::UnitDestroyed { unit: self.id }, format!("{} destroyed", self.id));
    }

    /// Treat a wounded part with the medikit in hand
    pub fn start_healing(&mut self, part: BodyPart) -> bool {
        if !self.agent.has_medikit_in_hands() || self.fatal_wounds.get(&part).copied().unwrap_or(0) == 0 {
            return false;
        }
        self.is_healing = true;
        self.healing_body_part = part;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::animation::TableAnimationPack;
    use crate::battle::damage::DamageModifierId;
    use crate::battle::equipment::{Equipment, EquipmentSlot};
    use crate::battle::facing::Facing;
    use crate::battle::mission::MissionType;
    use crate::battle::testing::*;
    use crate::core::types::OwnerId;

    #[test]
    fn test_lethal_damage_kills_and_wounds() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.agent.modified_stats.health = 10;
            unit.deal_damage(battle, 25, true, BodyPart::Body, 0);
            assert_eq!(unit.health(), -15);
            assert!(unit.is_dead());
            assert!(unit.fatal_wounds_total() >= 2);
            assert_eq!(
                unit.missions[0].kind,
                MissionKind::ChangeBodyState {
                    target: BodyState::Downed
                }
            );
        });
        assert!(battle
            .events_of(|e| matches!(e, BattleEventType::UnitDied { .. }))
            .next()
            .is_some());
    }

    #[test]
    fn test_stun_capped_at_health() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.deal_damage(battle, 500, false, BodyPart::Body, 1000);
            assert_eq!(unit.health(), 40);
            assert_eq!(unit.stun_damage(), 40);
            assert!(unit.is_unconscious());
            assert!(unit.fatal_wounds.is_empty());
        });
    }

    #[test]
    fn test_stun_capped_at_power() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.deal_damage(battle, 30, false, BodyPart::Body, 5);
            assert_eq!(unit.stun_damage(), 5);
            unit.deal_damage(battle, 30, false, BodyPart::Body, 5);
            assert_eq!(unit.stun_damage(), 5);
            assert!(unit.is_conscious());
        });
    }

    #[test]
    fn test_shield_absorbs_hit() {
        let mut battle = open_battle(8);
        let shield = Equipment::shield(ItemId(7), "shield", 5, DamageModifierId::new("energy"));
        let id = battle.spawn_unit(OwnerId(0), soldier().with_equipment(shield), glam::IVec3::new(3, 3, 0), Facing::North);
        assert!(battle.hit_unit(id, 40, &DamageType::kinetic(), Vec3::new(3.5, 3.5, 0.5), Vec3::X));
        let unit = battle.unit(id).unwrap();
        assert_eq!(unit.health(), 40);
        // 40 power rolls at least 20, which depletes the shield
        assert!(unit.agent.item(ItemId(7)).is_none());
        assert!(battle
            .events_of(|e| matches!(e, BattleEventType::DoodadPlaced { .. }))
            .next()
            .is_some());
    }

    #[test]
    fn test_armor_blocks_weak_hits_and_erodes() {
        let mut battle = open_battle(8);
        let vest = Equipment::armor(ItemId(9), "vest", BodyPart::Body, 50, DamageModifierId::new("flak"));
        let id = battle.spawn_unit(OwnerId(0), soldier().with_equipment(vest), glam::IVec3::new(3, 3, 0), Facing::North);
        battle.command(id, |unit, battle| {
            assert!(!unit.apply_damage(battle, 10, &DamageType::kinetic(), BodyPart::Body));
            assert_eq!(unit.health(), 40);
            assert_eq!(unit.agent.item(ItemId(9)).map(|a| a.ammo), Some(50));

            unit.agent.item_mut(ItemId(9)).unwrap().ammo = 1;
            unit.apply_damage(battle, 20, &DamageType::kinetic(), BodyPart::Body);
            assert!(unit.health() < 40);
            assert!(unit.agent.item(ItemId(9)).is_none());
        });
    }

    #[test]
    fn test_smoke_only_stuns() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.apply_damage(battle, 100, &DamageType::smoke(), BodyPart::Helmet);
            assert_eq!(unit.health(), 40);
            assert!(unit.stun_damage() <= SMOKE_DAMAGE_POWER);
            assert!(unit.fatal_wounds.is_empty());
        });
    }

    #[test]
    fn test_dead_units_ignore_hits() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, _| unit.agent.modified_stats.health = 0);
        battle.hit_unit(id, 50, &DamageType::kinetic(), Vec3::new(3.5, 3.5, 0.5), Vec3::X);
        assert_eq!(battle.unit(id).unwrap().health(), 0);
    }

    #[test]
    fn test_gas_hits_head() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        let unit = battle.unit(id).unwrap();
        let part = unit.determine_body_part_hit(&DamageType::toxic_gas(), Vec3::new(3.5, 3.5, 0.05), Vec3::X);
        assert_eq!(part, BodyPart::Helmet);
        let part = unit.determine_body_part_hit(&DamageType::kinetic(), Vec3::new(3.5, 3.5, 0.05), Vec3::X);
        assert_eq!(part, BodyPart::Legs);
    }

    #[test]
    fn test_drop_down_sheds_gear() {
        let mut battle = open_battle(8);
        let id = spawn_armed(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.fall_unconscious(battle);
            assert!(unit.agent.equipment.is_empty());
            assert_eq!(unit.missions.len(), 1);
            assert_eq!(unit.missions[0].mission_type(), MissionType::ChangeBodyState);
        });
        assert_eq!(battle.ground_items.len(), 1);
    }

    #[test]
    fn test_drop_down_works_through_poses_without_animation() {
        let pack = TableAnimationPack::new(2, 2, 1)
            .with_body_transition(BodyState::Standing, BodyState::Downed, HandState::AtEase, MovementState::None, 0)
            .with_body_transition(BodyState::Kneeling, BodyState::Downed, HandState::AtEase, MovementState::None, 0);
        let mut battle = battle_with_pack(8, pack);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.drop_down(battle);
            assert_eq!(unit.current_body_state, BodyState::Prone);
            assert_eq!(unit.missions.len(), 1);
        });
    }

    #[test]
    fn test_rise_up_prefers_animated_pose() {
        let pack = TableAnimationPack::new(2, 2, 1).with_body_transition(
            BodyState::Downed,
            BodyState::Standing,
            HandState::AtEase,
            MovementState::None,
            0,
        );
        let mut battle = battle_with_pack(8, pack);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.set_body_state(battle, BodyState::Downed);
            unit.try_to_rise_up(battle);
            assert_eq!(
                unit.missions[0].kind,
                MissionKind::ChangeBodyState {
                    target: BodyState::Kneeling
                }
            );
        });
    }

    #[test]
    fn test_retreat_leaves_squad_and_map() {
        let mut battle = open_battle(8);
        let a = spawn(&mut battle, OwnerId(0), (1, 1), Facing::North);
        let b = spawn(&mut battle, OwnerId(0), (2, 1), Facing::North);
        battle.command(a, |unit, battle| unit.retreat(battle));
        let unit = battle.unit(a).unwrap();
        assert!(unit.is_gone());
        assert_eq!(unit.squad_number, None);
        assert!(battle.map.units_at(glam::IVec3::new(1, 1, 0)).is_empty());
        assert_eq!(battle.unit(b).unwrap().squad_position, 0);
    }

    #[test]
    fn test_retreat_takes_faction_sight_along() {
        let mut battle = open_battle(32);
        let a = spawn(&mut battle, OwnerId(0), (2, 10), Facing::East);
        let b = spawn(&mut battle, OwnerId(1), (8, 10), Facing::West);
        assert!(battle.visibility.is_unit_seen_by(OwnerId(0), b));
        battle.command(a, |unit, battle| unit.retreat(battle));
        for _ in 0..5 {
            battle.update(1);
        }
        assert!(battle.unit(a).unwrap().visible_units.is_empty());
        assert!(!battle.visibility.is_unit_seen_by(OwnerId(0), b));
    }

    #[test]
    fn test_healing_needs_medikit_and_wound() {
        let mut battle = open_battle(8);
        let kit = Equipment::medikit(ItemId(3), EquipmentSlot::LeftHand);
        let id = battle.spawn_unit(OwnerId(0), soldier().with_equipment(kit), glam::IVec3::new(3, 3, 0), Facing::North);
        battle.command(id, |unit, _| {
            assert!(!unit.start_healing(BodyPart::Legs));
            unit.fatal_wounds.insert(BodyPart::Legs, 1);
            assert!(unit.start_healing(BodyPart::Legs));
            assert!(unit.is_healing);
        });
    }
}
