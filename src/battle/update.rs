//! The per-tick update of one unit and its idle behaviour

use std::ops::ControlFlow;

use glam::IVec3;
use tracing::debug;

use crate::battle::constants::*;
use crate::battle::execution::BattleState;
use crate::battle::give_way::GiveWayRequest;
use crate::battle::mission::{body_state_change_cost, Mission};
use crate::battle::states::{BodyPart, BodyState, KneelingMode, MovementMode, MovementState};
use crate::battle::unit::BattleUnit;

impl BattleUnit {
    /// Advance the unit by `ticks`
    pub fn update(&mut self, battle: &mut BattleState, ticks: u32) {
        if self.is_gone() {
            return;
        }

        for item in self.agent.equipment.iter_mut() {
            item.update(ticks);
        }
        self.with_mission_at(battle, 0, |mission, unit, battle| mission.update(unit, battle, ticks));

        if self.stun_damage_in_ticks > 0 {
            self.stun_damage_in_ticks = (self.stun_damage_in_ticks - ticks as i32).max(0);
        }

        if self.is_healing {
            self.is_healing = self.agent.has_medikit_in_hands();
        }
        self.update_wounds(battle, ticks);

        // Stun wore off while lying on the ground
        if self.current_body_state == BodyState::Downed
            && self.target_body_state == BodyState::Downed
            && !self.is_dead()
            && self.stun_damage() < self.health()
            && self.missions.is_empty()
        {
            self.try_to_rise_up(battle);
        }

        if self.missions.is_empty() && self.is_conscious() {
            self.decide_idle(battle);
        }

        if let ControlFlow::Break(()) = self.advance_motion(battle, ticks) {
            return;
        }
        self.update_firing(battle, ticks);
    }

    /// Bleed from fatal wounds; a medikit treats one part at a time
    fn update_wounds(&mut self, battle: &mut BattleState, ticks: u32) {
        if !self.is_fatally_wounded() || self.is_dead() {
            return;
        }
        self.wound_ticks_accumulated += ticks;
        'bleeding: while self.wound_ticks_accumulated > TICKS_PER_UNIT_EFFECT {
            self.wound_ticks_accumulated -= TICKS_PER_UNIT_EFFECT;
            let wounds: Vec<(BodyPart, u32)> = self
                .fatal_wounds
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(part, count)| (*part, *count))
                .collect();
            for (part, count) in wounds {
                self.deal_damage(battle, count as i32, false, BodyPart::Body, 0);
                if self.is_dead() {
                    break 'bleeding;
                }
                if self.is_healing && self.healing_body_part == part {
                    if let Some(w) = self.fatal_wounds.get_mut(&part) {
                        *w -= 1;
                    }
                    // Also restores the point just lost
                    let max = self.agent.current_stats.health;
                    let health = &mut self.agent.modified_stats.health;
                    *health = (*health + HEALING_PER_WOUND).min(max);
                }
            }
        }
        let healed = self.fatal_wounds.get(&self.healing_body_part).copied().unwrap_or(0) == 0;
        if self.is_healing && healed {
            debug!(unit = %self.id, part = ?self.healing_body_part, "wound treated");
            self.is_healing = false;
        }
    }

    fn can_afford_body_state(&self, battle: &BattleState, target: BodyState) -> bool {
        self.can_afford(battle.config.mode, body_state_change_cost(self.target_body_state, target))
    }

    fn change_body_state_order(&mut self, battle: &mut BattleState, target: BodyState) {
        let mode = battle.config.mode;
        let mission = Mission::change_body_state(self, mode, target);
        self.set_mission(battle, mission);
    }

    /// What an idle unit does on its own
    fn decide_idle(&mut self, battle: &mut BattleState) {
        // Finish the step in progress before anything else
        if !self.at_goal {
            self.add_mission(battle, Mission::reach_goal());
            return;
        }

        if !self.give_way_requests.is_empty() {
            self.give_way(battle);
            return;
        }

        self.set_movement_state(battle, MovementState::None);
        let current = self.current_body_state;
        let kneeling = self.kneeling_mode == KneelingMode::Kneeling;
        let upright = if self.agent.is_body_state_allowed(BodyState::Standing) {
            BodyState::Standing
        } else {
            BodyState::Flying
        };

        if kneeling
            && current != BodyState::Kneeling
            && self.can_kneel()
            && self.can_afford_body_state(battle, BodyState::Kneeling)
        {
            self.change_body_state_order(battle, BodyState::Kneeling);
        } else if self.movement_mode == MovementMode::Prone
            && current != BodyState::Prone
            && !kneeling
            && self.can_prone(battle, self.tile(), self.facing)
            && self.can_afford_body_state(battle, BodyState::Prone)
        {
            self.change_body_state_order(battle, BodyState::Prone);
        } else if matches!(self.movement_mode, MovementMode::Walking | MovementMode::Running)
            && !kneeling
            && current != BodyState::Standing
            && current != BodyState::Flying
        {
            if self.can_afford_body_state(battle, upright) {
                self.change_body_state_order(battle, upright);
            }
        } else if current == BodyState::Flying
            && battle.map.can_stand(self.tile(), self.is_large())
            && self.agent.is_body_state_allowed(BodyState::Standing)
            && self.can_afford_body_state(battle, BodyState::Standing)
        {
            self.change_body_state_order(battle, BodyState::Standing);
        }

        // Legs left hanging over a drop
        if self.current_body_state == BodyState::Prone && self.missions.is_empty() {
            let legs = self.tile() - self.facing.offset().extend(0);
            let large = self.is_large();
            let supported = battle.map.can_stand(self.tile(), large) && battle.map.can_stand(legs, large);
            if !supported && self.can_afford_body_state(battle, BodyState::Kneeling) {
                self.change_body_state_order(battle, BodyState::Kneeling);
            }
        }
    }

    /// Act on pending give-way requests, then forget them
    fn give_way(&mut self, battle: &mut BattleState) {
        let requests = std::mem::take(&mut self.give_way_requests);
        let mode = battle.config.mode;

        if requests == [GiveWayRequest::Kneel] && self.can_afford_body_state(battle, BodyState::Kneeling) {
            self.change_body_state_order(battle, BodyState::Kneeling);
            self.append_mission(Mission::snooze(TICKS_PER_SECOND));
            return;
        }

        let here = self.tile();
        let large = self.is_large();
        let levels = battle.map.size().z;
        for request in requests {
            let GiveWayRequest::Step(direction) = request else {
                continue;
            };
            let beside = here + direction.offset().extend(0);
            for dz in [0, -1, 1] {
                let to = beside + IVec3::new(0, 0, dz);
                if to.z < 0 || to.z >= levels {
                    continue;
                }
                if !battle.map.can_enter_tile(here, to, large) || !battle.map.can_enter_tile(to, here, large) {
                    continue;
                }
                debug!(unit = %self.id, ?to, "giving way");
                let facing = self.facing;
                if !self.set_mission(battle, Mission::goto_location(to)) {
                    return;
                }
                if let Some(turn) = Mission::turn_to_facing(self, mode, facing) {
                    self.append_mission(turn);
                }
                self.append_mission(Mission::snooze(GIVE_WAY_SNOOZE_TICKS));
                self.append_mission(Mission::goto_location(here));
                if let Some(turn) = Mission::turn_to_facing(self, mode, facing) {
                    self.append_mission(turn);
                }
                return;
            }
        }
    }
}
