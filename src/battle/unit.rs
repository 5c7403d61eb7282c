//! Battle unit state and pose setters
//!
//! A unit is one combatant on the battle map. Its state is spread over
//! four animated axes (body, hands, movement, turning) that each move from
//! a current to a target value over a number of ticks.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashSet;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::battle::agent::{Agent, GenderedSamples};
use crate::battle::constants::*;
use crate::battle::execution::BattleState;
use crate::battle::facing::Facing;
use crate::battle::give_way::GiveWayRequest;
use crate::battle::mission::Mission;
use crate::battle::services::{BodyPose, FiringPose, HandPose};
use crate::battle::states::*;
use crate::core::types::{tile_of, BattleMode, ItemId, OwnerId, TilePos, UnitId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleUnit {
    pub id: UnitId,
    pub owner: OwnerId,
    pub squad_number: Option<usize>,
    pub squad_position: usize,
    pub agent: Agent,

    // Kinematics
    pub position: Vec3,
    pub facing: Facing,
    pub goal_position: Vec3,
    pub goal_facing: Facing,
    pub at_goal: bool,
    pub falling: bool,
    pub falling_speed: f32,
    /// Percent of full speed reached while flying
    pub flying_speed_modifier: u32,
    pub using_lift: bool,

    // Body
    pub current_body_state: BodyState,
    pub target_body_state: BodyState,
    pub body_animation_ticks_remaining: u32,

    // Hands
    pub current_hand_state: HandState,
    pub target_hand_state: HandState,
    pub hand_animation_ticks_remaining: u32,
    pub firing_animation_ticks_remaining: u32,
    pub aiming_ticks_remaining: u32,

    // Movement and turning
    pub current_movement_state: MovementState,
    pub movement_ticks_passed: u32,
    pub movement_sounds_played: u32,
    pub turning_animation_ticks_remaining: u32,

    // Standing orders
    pub kneeling_mode: KneelingMode,
    pub movement_mode: MovementMode,

    // Vitals
    pub stun_damage_in_ticks: i32,
    pub fatal_wounds: BTreeMap<BodyPart, u32>,
    pub wound_ticks_accumulated: u32,
    pub is_healing: bool,
    pub healing_body_part: BodyPart,

    // Combat
    pub weapon_status: WeaponStatus,
    pub targeting_mode: TargetingMode,
    pub target_unit: Option<UnitId>,
    pub target_tile: TilePos,
    pub ticks_till_next_target_check: u32,

    // Perception
    pub visible_units: AHashSet<UnitId>,

    pub missions: VecDeque<Mission>,
    pub give_way_requests: Vec<GiveWayRequest>,

    // Focus graph, by id
    pub focus_unit: Option<UnitId>,
    pub focused_by: Vec<UnitId>,

    pub displayed_item: Option<ItemId>,
    pub destroyed: bool,
    pub retreated: bool,
}

impl BattleUnit {
    pub fn new(id: UnitId, owner: OwnerId, agent: Agent, position: Vec3, facing: Facing) -> Self {
        let body = if agent.is_body_state_allowed(BodyState::Standing) {
            BodyState::Standing
        } else {
            BodyState::Flying
        };
        let mut unit = Self {
            id,
            owner,
            squad_number: None,
            squad_position: 0,
            agent,
            position,
            facing,
            goal_position: position,
            goal_facing: facing,
            at_goal: true,
            falling: false,
            falling_speed: 0.0,
            flying_speed_modifier: 100,
            using_lift: false,
            current_body_state: body,
            target_body_state: body,
            body_animation_ticks_remaining: 0,
            current_hand_state: HandState::AtEase,
            target_hand_state: HandState::AtEase,
            hand_animation_ticks_remaining: 0,
            firing_animation_ticks_remaining: 0,
            aiming_ticks_remaining: 0,
            current_movement_state: MovementState::None,
            movement_ticks_passed: 0,
            movement_sounds_played: 0,
            turning_animation_ticks_remaining: 0,
            kneeling_mode: KneelingMode::None,
            movement_mode: MovementMode::Walking,
            stun_damage_in_ticks: 0,
            fatal_wounds: BTreeMap::new(),
            wound_ticks_accumulated: 0,
            is_healing: false,
            healing_body_part: BodyPart::Body,
            weapon_status: WeaponStatus::NotFiring,
            targeting_mode: TargetingMode::NoTarget,
            target_unit: None,
            target_tile: tile_of(position),
            ticks_till_next_target_check: 0,
            visible_units: AHashSet::new(),
            missions: VecDeque::new(),
            give_way_requests: Vec::new(),
            focus_unit: None,
            focused_by: Vec::new(),
            displayed_item: None,
            destroyed: false,
            retreated: false,
        };
        unit.displayed_item = unit.agent.dominant_item_in_hands(None);
        unit
    }

    // Vitals

    pub fn health(&self) -> i32 {
        self.agent.modified_stats.health
    }

    /// Stun in health points
    pub fn stun_damage(&self) -> i32 {
        self.stun_damage_in_ticks / STUN_TICKS_PER_POINT
    }

    pub fn is_dead(&self) -> bool {
        self.health() <= 0 || self.destroyed
    }

    pub fn is_conscious(&self) -> bool {
        !self.is_dead()
            && self.stun_damage() < self.health()
            && (self.current_body_state != BodyState::Downed
                || self.target_body_state != BodyState::Downed)
    }

    pub fn is_unconscious(&self) -> bool {
        !self.is_dead() && !self.is_conscious()
    }

    pub fn is_fatally_wounded(&self) -> bool {
        self.fatal_wounds.values().any(|w| *w > 0)
    }

    pub fn fatal_wounds_total(&self) -> u32 {
        self.fatal_wounds.values().sum()
    }

    /// Out of play: not ticked, not targetable, not seen
    pub fn is_gone(&self) -> bool {
        self.destroyed || self.retreated
    }

    // Activity

    pub fn is_attacking(&self) -> bool {
        self.weapon_status != WeaponStatus::NotFiring
    }

    pub fn is_busy(&self) -> bool {
        !self.missions.is_empty() || self.is_attacking()
    }

    pub fn is_moving(&self) -> bool {
        self.current_movement_state != MovementState::None
    }

    /// Standing still with nothing queued
    pub fn is_static(&self) -> bool {
        !self.is_moving() && self.at_goal && self.missions.is_empty()
    }

    pub fn is_large(&self) -> bool {
        self.agent.is_large()
    }

    pub fn can_move(&self) -> bool {
        self.is_conscious() && !self.falling
    }

    /// Only a conscious pilot keeps a flyer airborne
    pub fn can_fly(&self) -> bool {
        self.is_conscious() && self.agent.is_body_state_allowed(BodyState::Flying)
    }

    pub fn can_kneel(&self) -> bool {
        self.agent.is_body_state_allowed(BodyState::Kneeling)
    }

    /// Lying down needs floor behind the unit for the legs
    pub fn can_prone(&self, battle: &BattleState, tile: TilePos, facing: Facing) -> bool {
        if !self.agent.is_body_state_allowed(BodyState::Prone) {
            return false;
        }
        let offset = facing.offset();
        let legs = tile - offset.extend(0);
        battle.map.can_stand(legs, self.is_large())
            && battle.map.is_passable(legs, self.current_height())
            && battle.conscious_unit_at(legs, self.id).is_none()
    }

    pub fn body_allows_movement(&self) -> bool {
        self.current_body_state.allows_movement()
            && (self.current_body_state != BodyState::Prone
                || self.movement_mode == MovementMode::Prone)
    }

    /// Gait used for ordered movement
    pub fn movement_state_for_mode(&self) -> MovementState {
        if self.movement_mode == MovementMode::Running
            && self.agent.is_movement_state_allowed(MovementState::Running)
        {
            MovementState::Running
        } else {
            MovementState::Normal
        }
    }

    // Geometry

    pub fn tile(&self) -> TilePos {
        tile_of(self.position)
    }

    pub fn current_height(&self) -> i32 {
        self.agent.agent_type.body.height(self.current_body_state)
    }

    pub fn muzzle_location(&self) -> Vec3 {
        let z = self.agent.agent_type.body.muzzle_z(self.current_body_state) as f32;
        self.position + Vec3::new(0.0, 0.0, z / HEIGHT_UNITS_PER_TILE)
    }

    pub fn voxel_center(&self) -> Vec3 {
        let z = self.current_height() as f32 / 2.0;
        self.position + Vec3::new(0.0, 0.0, z / HEIGHT_UNITS_PER_TILE)
    }

    pub fn displayed_item_type(&self) -> Option<&str> {
        self.displayed_item
            .and_then(|id| self.agent.item(id))
            .map(|item| item.type_name.as_str())
    }

    // Time units

    pub fn can_afford(&self, mode: BattleMode, cost: i32) -> bool {
        mode == BattleMode::RealTime || self.agent.modified_stats.time_units >= cost
    }

    /// Pay `cost` if affordable; real-time battles never charge
    pub fn spend_time_units(&mut self, mode: BattleMode, cost: i32) -> bool {
        if mode == BattleMode::RealTime {
            return true;
        }
        if self.agent.modified_stats.time_units < cost {
            return false;
        }
        self.agent.modified_stats.time_units -= cost;
        true
    }

    pub fn refund_time_units(&mut self, mode: BattleMode, cost: i32) {
        if mode == BattleMode::TurnBased && cost > 0 {
            self.agent.modified_stats.time_units += cost;
        }
    }

    // Position and facing

    pub fn set_position(&mut self, battle: &mut BattleState, position: Vec3) {
        let old_tile = self.tile();
        self.position = position;
        let new_tile = self.tile();
        if old_tile != new_tile {
            battle.map.place_unit(self.id, Some(new_tile));
            self.update_vision(battle);
            battle.refresh_watchers(self.id, self.owner);
        }
    }

    /// Forget any destination and settle where we are
    pub fn reset_goal(&mut self) {
        self.goal_position = self.position;
        self.goal_facing = self.facing;
        self.at_goal = true;
    }

    pub fn set_facing(&mut self, battle: &mut BattleState, facing: Facing) {
        let changed = self.facing != facing;
        self.facing = facing;
        self.goal_facing = facing;
        self.turning_animation_ticks_remaining = 0;
        if changed {
            self.update_vision(battle);
        }
    }

    pub fn begin_turning(&mut self, facing: Facing) {
        self.goal_facing = facing;
        self.turning_animation_ticks_remaining = TICKS_PER_FRAME_UNIT;
    }

    // Body

    fn body_frames(&self, battle: &BattleState, to: BodyState, hand: HandState, movement: MovementState) -> u32 {
        battle.animations.body_frames(&BodyPose {
            item: self.displayed_item_type(),
            from: self.current_body_state,
            to,
            hand,
            movement,
            facing: self.facing,
        })
    }

    /// Whether the animation pack has a body transition into `to`
    pub fn has_body_animation(&self, battle: &BattleState, to: BodyState) -> bool {
        self.body_frames(battle, to, self.current_hand_state, self.current_movement_state) > 0
    }

    /// Start moving the body toward `state`
    ///
    /// Without an animation for the current hands and gait, the unit first
    /// stops moving, then lowers its weapon, and finally snaps instantly.
    pub fn begin_body_state_change(&mut self, battle: &mut BattleState, state: BodyState) {
        if self.target_body_state == state {
            return;
        }

        // Cease hand animation immediately
        if self.hand_animation_ticks_remaining != 0 {
            let hand = self.target_hand_state;
            self.set_hand_state(battle, hand);
        }

        let mut frames = self.body_frames(battle, state, self.current_hand_state, self.current_movement_state);
        if frames == 0 && self.current_movement_state != MovementState::None {
            frames = self.body_frames(battle, state, self.current_hand_state, MovementState::None);
            if frames > 0 {
                self.set_movement_state(battle, MovementState::None);
            }
        }
        if frames == 0 && self.current_hand_state != HandState::AtEase {
            frames = self.body_frames(battle, state, HandState::AtEase, MovementState::None);
            if frames > 0 {
                self.set_movement_state(battle, MovementState::None);
                self.set_hand_state(battle, HandState::AtEase);
            }
        }

        if frames > 0 && state != self.current_body_state {
            self.target_body_state = state;
            self.body_animation_ticks_remaining = frames * TICKS_PER_FRAME_UNIT;
        } else {
            self.set_body_state(battle, state);
        }
    }

    pub fn set_body_state(&mut self, battle: &mut BattleState, state: BodyState) {
        let changed = self.current_body_state != state;
        self.current_body_state = state;
        self.target_body_state = state;
        self.body_animation_ticks_remaining = 0;
        if changed {
            self.update_vision(battle);
        }
    }

    // Hands

    fn hand_frames(&self, battle: &BattleState, to: HandState) -> u32 {
        battle.animations.hand_frames(&HandPose {
            item: self.displayed_item_type(),
            body: self.current_body_state,
            from: self.current_hand_state,
            to,
            movement: self.current_movement_state,
            facing: self.facing,
        })
    }

    pub fn begin_hand_state_change(&mut self, battle: &mut BattleState, state: HandState) {
        if self.target_hand_state == state {
            return;
        }
        let frames = self.hand_frames(battle, state);
        if frames > 0 {
            self.target_hand_state = state;
            self.hand_animation_ticks_remaining = frames * TICKS_PER_FRAME_UNIT;
        } else {
            self.set_hand_state(battle, state);
        }
        self.aiming_ticks_remaining = 0;
    }

    pub fn set_hand_state(&mut self, battle: &mut BattleState, state: HandState) {
        self.current_hand_state = state;
        self.target_hand_state = state;
        self.hand_animation_ticks_remaining = 0;
        self.firing_animation_ticks_remaining = if state == HandState::Firing {
            // A missing firing animation still holds the hands for one frame
            let frames = battle.animations.firing_frames(&FiringPose {
                item: self.displayed_item_type(),
                body: self.current_body_state,
                movement: self.current_movement_state,
                facing: self.facing,
            });
            frames.max(1) * TICKS_PER_FRAME_UNIT
        } else {
            0
        };
        self.aiming_ticks_remaining = if state == HandState::Aiming {
            AIMING_LINGER_TICKS
        } else {
            0
        };
    }

    // Movement

    pub fn set_movement_state(&mut self, battle: &mut BattleState, state: MovementState) {
        if self.current_movement_state == state {
            return;
        }
        self.current_movement_state = state;
        match state {
            MovementState::None => {
                self.movement_ticks_passed = 0;
                self.movement_sounds_played = 0;
                self.ticks_till_next_target_check = 0;
            }
            MovementState::Running | MovementState::Strafing => {
                if self.current_hand_state != HandState::AtEase
                    || self.target_hand_state != HandState::AtEase
                {
                    self.set_hand_state(battle, HandState::AtEase);
                }
            }
            MovementState::Normal => {}
        }
    }

    /// Drop everything and start falling
    pub fn start_falling(&mut self, battle: &mut BattleState) {
        self.set_movement_state(battle, MovementState::None);
        self.falling = true;
    }

    /// Show the item being thrown, else the dominant item in hand
    pub fn update_displayed_item(&mut self, battle: &mut BattleState) {
        let last = self.displayed_item;
        let thrown = self.missions.iter().find_map(Mission::item_being_thrown);
        self.displayed_item = match thrown {
            Some(item) => Some(item),
            None => {
                let preferred = if self.firing_animation_ticks_remaining > 0 {
                    last
                } else {
                    None
                };
                self.agent.dominant_item_in_hands(preferred)
            }
        };
        if (thrown.is_some() || self.displayed_item != last)
            && (self.hand_animation_ticks_remaining > 0
                || self.current_hand_state != HandState::AtEase)
        {
            self.set_hand_state(battle, HandState::AtEase);
        }
    }

    // Audio

    pub(crate) fn play_gendered(&self, battle: &mut BattleState, samples: &GenderedSamples) {
        if let Some(list) = samples.get(&self.agent.gender) {
            battle.play_random_sample(list, self.position, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::testing::*;

    #[test]
    fn test_new_unit_is_settled() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::East);
        let unit = battle.unit(id).unwrap();
        assert!(unit.is_conscious());
        assert!(unit.at_goal);
        assert_eq!(unit.current_body_state, BodyState::Standing);
        assert_eq!(unit.position, Vec3::new(3.5, 3.5, 0.0));
    }

    #[test]
    fn test_body_change_with_animation_is_timed() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.begin_body_state_change(battle, BodyState::Kneeling);
            assert_eq!(unit.current_body_state, BodyState::Standing);
            assert_eq!(unit.target_body_state, BodyState::Kneeling);
            assert_eq!(unit.body_animation_ticks_remaining, 2 * TICKS_PER_FRAME_UNIT);
        });
    }

    #[test]
    fn test_body_change_falls_back_to_lowering_weapon() {
        let pack = crate::battle::animation::TableAnimationPack::new(2, 2, 1)
            .with_body_transition(BodyState::Standing, BodyState::Kneeling, HandState::Aiming, MovementState::None, 0);
        let mut battle = battle_with_pack(8, pack);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.set_hand_state(battle, HandState::Aiming);
            unit.begin_body_state_change(battle, BodyState::Kneeling);
            assert_eq!(unit.current_hand_state, HandState::AtEase);
            assert_eq!(unit.target_body_state, BodyState::Kneeling);
            assert!(unit.body_animation_ticks_remaining > 0);
        });
    }

    #[test]
    fn test_missing_animation_snaps() {
        let mut battle = battle_with_pack(8, crate::battle::animation::TableAnimationPack::instant());
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.begin_body_state_change(battle, BodyState::Prone);
            assert_eq!(unit.current_body_state, BodyState::Prone);
            assert_eq!(unit.body_animation_ticks_remaining, 0);
        });
    }

    #[test]
    fn test_firing_without_animation_holds_one_frame() {
        let mut battle = battle_with_pack(8, crate::battle::animation::TableAnimationPack::instant());
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.set_hand_state(battle, HandState::Firing);
            assert_eq!(unit.firing_animation_ticks_remaining, TICKS_PER_FRAME_UNIT);
        });
    }

    #[test]
    fn test_running_lowers_weapon() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, battle| {
            unit.set_hand_state(battle, HandState::Aiming);
            unit.set_movement_state(battle, MovementState::Running);
            assert_eq!(unit.current_hand_state, HandState::AtEase);
            unit.ticks_till_next_target_check = 10;
            unit.set_movement_state(battle, MovementState::None);
            assert_eq!(unit.ticks_till_next_target_check, 0);
        });
    }

    #[test]
    fn test_time_units_only_in_turn_based() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, _| {
            let before = unit.agent.modified_stats.time_units;
            assert!(unit.spend_time_units(BattleMode::RealTime, 1000));
            assert_eq!(unit.agent.modified_stats.time_units, before);
            assert!(!unit.spend_time_units(BattleMode::TurnBased, before + 1));
            assert!(unit.spend_time_units(BattleMode::TurnBased, 10));
            unit.refund_time_units(BattleMode::TurnBased, 10);
            assert_eq!(unit.agent.modified_stats.time_units, before);
        });
    }

    #[test]
    fn test_conscious_implies_not_dead() {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, OwnerId(0), (3, 3), Facing::North);
        battle.command(id, |unit, _| {
            unit.agent.modified_stats.health = 0;
            assert!(unit.is_dead());
            assert!(!unit.is_conscious());
            assert!(!unit.is_unconscious());
        });
    }
}
