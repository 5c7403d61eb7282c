//! Per-tick animation and movement of a unit
//!
//! A tick grants four independent budgets (movement, body, hands and
//! turning). Each pass of the loop spends what it can of each; finishing
//! one animation may start another, so passes repeat until no budget
//! changes.

use std::ops::ControlFlow;

use glam::{IVec3, Vec3};
use tracing::{debug, warn};

use crate::battle::constants::*;
use crate::battle::execution::BattleState;
use crate::battle::mission::{Mission, MissionKind};
use crate::battle::states::{BodyPart, BodyState, HandState, MovementState};
use crate::battle::unit::BattleUnit;
use crate::core::types::tile_of;

/// Ticks left to spend on each animated axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MotionBudget {
    /// Movement units, consumed twice as fast when not running
    movement: u32,
    body: u32,
    hands: u32,
    turning: u32,
}

impl BattleUnit {
    /// Advance every animation of the unit by `ticks`
    ///
    /// Breaks if the unit left the battle while finishing a mission.
    pub(crate) fn advance_motion(&mut self, battle: &mut BattleState, ticks: u32) -> ControlFlow<()> {
        let was_using_lift = self.using_lift;
        self.using_lift = false;

        // Jets spool down as soon as we land
        if self.current_body_state != BodyState::Flying {
            self.flying_speed_modifier = 0;
        }

        // Unconscious units can only animate their body or fall
        let conscious = self.is_conscious();
        let mut budget = MotionBudget {
            movement: ticks * self.agent.modified_stats.actual_speed() * 2,
            body: ticks,
            hands: if conscious { ticks } else { 0 },
            turning: if conscious { ticks } else { 0 },
        };

        let mut last = MotionBudget::default();
        let mut passes = 0;
        while budget != last {
            last = budget;
            passes += 1;
            if passes > battle.config.max_convergence_passes {
                warn!(unit = %self.id, ?budget, "motion did not settle, giving up for this tick");
                break;
            }

            self.check_support(battle);
            self.advance_body(battle, &mut budget.body)?;
            self.advance_hands(battle, &mut budget.hands);
            if budget.movement > 0 {
                if self.falling {
                    self.advance_falling(battle, &mut budget.movement);
                } else if self.is_moving() {
                    self.advance_movement(battle, &mut budget.movement, was_using_lift)?;
                } else {
                    self.settle_position(battle)?;
                }
            }
            self.advance_turning(battle, &mut budget.turning)?;
            self.update_displayed_item(battle);
        }
        ControlFlow::Continue(())
    }

    /// Start falling without support, or take off if we can fly
    fn check_support(&mut self, battle: &mut BattleState) {
        if self.falling || (self.can_fly() && self.current_body_state == BodyState::Flying) {
            return;
        }
        let large = self.is_large();
        let mut has_support = false;
        let mut fully_supported = true;
        if battle.map.can_stand(self.tile(), large) {
            has_support = true;
        } else {
            fully_supported = false;
        }
        if !self.at_goal {
            if battle.map.can_stand(tile_of(self.goal_position), large) {
                has_support = true;
            } else {
                fully_supported = false;
            }
        }

        if !has_support && !self.can_fly() {
            debug!(unit = %self.id, "lost footing, falling");
            self.start_falling(battle);
        }
        if !fully_supported && self.can_fly() && self.current_body_state == self.target_body_state {
            self.set_body_state(battle, BodyState::Flying);
            if let Some(Mission {
                kind: MissionKind::ChangeBodyState { target },
                ..
            }) = self.missions.front_mut()
            {
                *target = BodyState::Flying;
            }
        }
    }

    fn advance_body(&mut self, battle: &mut BattleState, budget: &mut u32) -> ControlFlow<()> {
        if *budget == 0 {
            return ControlFlow::Continue(());
        }
        if self.body_animation_ticks_remaining > *budget {
            self.body_animation_ticks_remaining -= *budget;
            *budget = 0;
            return ControlFlow::Continue(());
        }
        if self.body_animation_ticks_remaining > 0 {
            *budget -= self.body_animation_ticks_remaining;
            let target = self.target_body_state;
            self.set_body_state(battle, target);
        }
        if self.pop_finished_missions(battle) {
            return ControlFlow::Break(());
        }
        // Not while firing, and not while the hands move unless to aim
        if self.firing_animation_ticks_remaining == 0
            && (self.hand_animation_ticks_remaining == 0 || self.target_hand_state == HandState::Aiming)
        {
            if let Some(next) = self.next_body_state(battle) {
                self.begin_body_state_change(battle, next);
            }
        }
        ControlFlow::Continue(())
    }

    fn advance_hands(&mut self, battle: &mut BattleState, budget: &mut u32) {
        if *budget == 0 {
            return;
        }
        if self.firing_animation_ticks_remaining > 0 {
            if self.firing_animation_ticks_remaining > *budget {
                self.firing_animation_ticks_remaining -= *budget;
                *budget = 0;
            } else {
                *budget -= self.firing_animation_ticks_remaining;
                self.firing_animation_ticks_remaining = 0;
                self.set_hand_state(battle, HandState::Aiming);
            }
        } else if self.hand_animation_ticks_remaining > *budget {
            self.hand_animation_ticks_remaining -= *budget;
            *budget = 0;
        } else if self.hand_animation_ticks_remaining > 0 {
            *budget -= self.hand_animation_ticks_remaining;
            self.hand_animation_ticks_remaining = 0;
            let target = self.target_hand_state;
            self.set_hand_state(battle, target);
        }
    }

    /// Falling eats the whole movement budget, one acceleration step per tick
    fn advance_falling(&mut self, battle: &mut BattleState, budget: &mut u32) {
        let steps = *budget / (self.agent.modified_stats.actual_speed() * 2);
        *budget = 0;

        let mut new_position = self.position;
        for _ in 0..steps {
            self.falling_speed += FALLING_ACCELERATION;
            new_position.z -= self.falling_speed / TICK_SCALE / VELOCITY_SCALE.z;
        }
        if new_position == self.position {
            return;
        }

        // Fell onto someone
        if self.is_conscious() && battle.conscious_unit_at(tile_of(new_position), self.id).is_some() {
            self.stun_damage_in_ticks = 0;
            let damage = self.agent.current_stats.health * 3 / 2;
            self.deal_damage(battle, damage, false, BodyPart::Body, LANDING_STUN_POWER);
        }

        // Land on the first floor passed through, top down
        let large = self.is_large();
        let from_z = self.tile().z;
        let to_tile = tile_of(new_position);
        let mut landing = None;
        for z in (to_tile.z.max(0)..=from_z).rev() {
            let tile = IVec3::new(to_tile.x, to_tile.y, z);
            if !battle.map.can_stand(tile, large) {
                continue;
            }
            let resting = battle.map.resting_position(tile, large);
            if new_position.z < resting.z {
                landing = Some(resting);
                break;
            }
        }
        if landing.is_none() && to_tile.z < 0 {
            landing = Some(battle.map.resting_position(IVec3::new(to_tile.x, to_tile.y, 0), large));
        }

        match landing {
            Some(resting) => {
                self.falling = false;
                self.falling_speed = 0.0;
                // Bodies drop where they fell, the living find their footing
                let landed = if self.is_conscious() {
                    resting
                } else {
                    Vec3::new(new_position.x, new_position.y, resting.z)
                };
                self.set_position(battle, landed);
                self.reset_goal();
                debug!(unit = %self.id, tile = ?self.tile(), "landed");
            }
            None => {
                self.set_position(battle, new_position);
                // Falling units can always turn
                self.goal_position = self.position;
                self.at_goal = true;
            }
        }
    }

    fn advance_movement(&mut self, battle: &mut BattleState, budget: &mut u32, was_using_lift: bool) -> ControlFlow<()> {
        let flying = self.current_body_state == BodyState::Flying;
        let speed_modifier = if flying {
            self.flying_speed_modifier.max(1)
        } else {
            100
        };
        let to_goal = self.goal_position - self.position;
        let exact_distance = (to_goal * VELOCITY_SCALE * TICKS_PER_UNIT_TRAVELLED as f32).length();
        let distance = exact_distance.ceil() as u32;
        let rate = if self.current_movement_state == MovementState::Running {
            1
        } else {
            2
        };

        // Straight up or down without flying means a lift
        if distance > 0 && !flying && to_goal.x == 0.0 && to_goal.y == 0.0 {
            if battle.config.gravlift_sounds && !was_using_lift {
                if let Some(sample) = &self.agent.agent_type.sounds.gravlift {
                    battle.sounds.play_sample(sample, self.position, 0.25);
                }
            }
            self.using_lift = true;
            self.movement_ticks_passed = 0;
        }

        let accumulated;
        if distance * rate * 100 / speed_modifier > *budget {
            let steps = *budget / rate;
            accumulated = steps;
            if flying && self.flying_speed_modifier < 100 {
                self.flying_speed_modifier = (self.flying_speed_modifier + steps / FLYING_ACCELERATION_DIVISOR).min(100);
            }
            // Partial step toward the goal, never past it
            let travel = (steps as f32 * speed_modifier as f32 / 100.0).min(exact_distance);
            let new_position = self.position + to_goal * (travel / exact_distance);
            self.set_position(battle, new_position);
            *budget %= rate;
            self.at_goal = false;
        } else {
            if distance > 0 {
                accumulated = distance;
                if flying && self.flying_speed_modifier < 100 {
                    self.flying_speed_modifier = (self.flying_speed_modifier + distance / FLYING_ACCELERATION_DIVISOR).min(100);
                }
                *budget = budget.saturating_sub(distance * rate);
                let goal = self.goal_position;
                self.set_position(battle, goal);
                self.goal_position = self.position;
            } else {
                accumulated = 0;
            }
            self.at_goal = true;
            if self.pop_finished_missions(battle) {
                return ControlFlow::Break(());
            }
            if let Some(next) = self.next_destination(battle) {
                self.goal_position = next;
                self.at_goal = false;
            }
        }

        // Isometric screen scaling: diagonals on screen look longer
        let offset = self.facing.offset();
        self.movement_ticks_passed += if offset.x == offset.y {
            accumulated * 100 / 150
        } else if offset.x == -offset.y {
            accumulated * 141 / 150
        } else {
            accumulated
        };

        if self.should_play_footstep() && self.current_body_state != BodyState::Flying {
            self.play_footstep(battle);
        }
        ControlFlow::Continue(())
    }

    /// Standing still: snap to the resting spot or pick up the next step
    fn settle_position(&mut self, battle: &mut BattleState) -> ControlFlow<()> {
        if self.goal_position == self.position {
            self.goal_position = battle.map.resting_position(self.tile(), self.is_large());
        }
        self.at_goal = self.goal_position == self.position;
        if !self.at_goal {
            if self.is_conscious() && self.add_mission(battle, Mission::reach_goal()) {
                let gait = self.movement_state_for_mode();
                self.set_movement_state(battle, gait);
            }
            return ControlFlow::Continue(());
        }
        if self.pop_finished_missions(battle) {
            return ControlFlow::Break(());
        }
        if let Some(next) = self.next_destination(battle) {
            self.goal_position = next;
            self.at_goal = false;
        }
        ControlFlow::Continue(())
    }

    fn advance_turning(&mut self, battle: &mut BattleState, budget: &mut u32) -> ControlFlow<()> {
        if *budget == 0 {
            return ControlFlow::Continue(());
        }
        if self.turning_animation_ticks_remaining > *budget {
            self.turning_animation_ticks_remaining -= *budget;
            *budget = 0;
            return ControlFlow::Continue(());
        }
        if self.turning_animation_ticks_remaining > 0 {
            *budget -= self.turning_animation_ticks_remaining;
            let facing = self.goal_facing;
            self.set_facing(battle, facing);
        }
        if self.pop_finished_missions(battle) {
            return ControlFlow::Break(());
        }
        if let Some(facing) = self.next_facing(battle) {
            self.begin_turning(facing);
        }
        ControlFlow::Continue(())
    }

    /// Movement units covered since the gait last changed
    pub fn distance_travelled(&self) -> u32 {
        self.movement_ticks_passed / TICKS_PER_UNIT_TRAVELLED
    }

    fn should_play_footstep(&mut self) -> bool {
        let due = self.distance_travelled() / UNITS_TRAVELLED_PER_SOUND;
        if due == self.movement_sounds_played {
            return false;
        }
        let divisor = if self.current_movement_state == MovementState::Running {
            UNITS_TRAVELLED_PER_SOUND_RUNNING_DIVISOR
        } else {
            1
        };
        self.movement_sounds_played = due;
        (due + divisor - 1) % divisor == 0
    }

    /// Alternates left and right foot
    fn walk_sound_index(&self) -> usize {
        let played = if self.current_movement_state == MovementState::Running {
            self.movement_sounds_played.div_ceil(UNITS_TRAVELLED_PER_SOUND_RUNNING_DIVISOR)
        } else {
            self.movement_sounds_played
        };
        (played % 2) as usize
    }

    fn play_footstep(&self, battle: &mut BattleState) {
        let index = self.walk_sound_index();
        let own = &self.agent.agent_type.sounds.walk;
        if !own.is_empty() {
            battle.sounds.play_sample(&own[index % own.len()], self.position, 0.25);
            return;
        }
        let terrain = battle.map.walk_sfx(self.tile());
        if !terrain.is_empty() {
            battle.sounds.play_sample(&terrain[index % terrain.len()], self.position, 0.25);
        }
    }
}
