//! Unit missions
//!
//! A mission is one queued order. Only the front mission of a unit's queue
//! is running; it is asked where to go next, which way to face and which
//! pose to take. Time-unit costs of turns, stance changes and throws are
//! paid when the mission is created and refunded if it is cancelled.

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::battle::constants::*;
use crate::battle::execution::BattleState;
use crate::battle::facing::Facing;
use crate::battle::states::BodyState;
use crate::battle::unit::BattleUnit;
use crate::core::types::{tile_of, BattleMode, ItemId, TilePos};

/// Mission tag without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionType {
    ReachGoal,
    GotoLocation,
    Turn,
    ChangeBodyState,
    ThrowItem,
    DropItem,
    Snooze,
    AcquireTU,
    Teleport,
    RestartNextMission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MissionKind {
    /// Finish the step in progress
    ReachGoal,
    GotoLocation {
        target: TilePos,
        path: VecDeque<TilePos>,
        /// Ask units of any faction to step aside
        demand_give_way: bool,
        /// Leave the battle if the path ends on an exit
        allow_retreat: bool,
        give_way_attempts: u32,
        cancelled: bool,
    },
    Turn {
        target_facing: Facing,
    },
    ChangeBodyState {
        target: BodyState,
    },
    ThrowItem {
        item: ItemId,
        target: Vec3,
        thrown: bool,
    },
    DropItem {
        /// Taken once the item has been dropped
        item: Option<ItemId>,
    },
    Snooze {
        ticks: u32,
    },
    AcquireTU {
        required: i32,
    },
    Teleport {
        target: TilePos,
    },
    RestartNextMission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub kind: MissionKind,
    pub cost_paid_up_front: i32,
}

/// What the front mission wants the unit to do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextStep {
    Move(Vec3),
    /// Path blocked; wait this many ticks and retry
    Wait(u32),
    /// Step unaffordable; wait for this many time units
    NeedTimeUnits(i32),
    Stay,
}

/// Time units to change pose
pub fn body_state_change_cost(from: BodyState, to: BodyState) -> i32 {
    if from == to {
        return 0;
    }
    match to {
        BodyState::Downed | BodyState::Dead | BodyState::Jumping | BodyState::Throwing => 0,
        BodyState::Prone => PRONE_CHANGE_COST,
        _ if from == BodyState::Prone => PRONE_CHANGE_COST,
        _ => BODY_CHANGE_COST,
    }
}

/// Time units to step between adjacent tiles
pub fn move_cost(from: TilePos, to: TilePos) -> i32 {
    let d = to - from;
    if d.x != 0 && d.y != 0 {
        DIAGONAL_MOVE_COST
    } else {
        STRAIGHT_MOVE_COST
    }
}

impl Mission {
    fn new(kind: MissionKind) -> Self {
        Self {
            kind,
            cost_paid_up_front: 0,
        }
    }

    pub fn reach_goal() -> Self {
        Self::new(MissionKind::ReachGoal)
    }

    pub fn goto_location(target: TilePos) -> Self {
        Self::new(MissionKind::GotoLocation {
            target,
            path: VecDeque::new(),
            demand_give_way: false,
            allow_retreat: false,
            give_way_attempts: 0,
            cancelled: false,
        })
    }

    /// Builder: ask blocking units of other factions to step aside too
    pub fn demanding_give_way(mut self) -> Self {
        if let MissionKind::GotoLocation { demand_give_way, .. } = &mut self.kind {
            *demand_give_way = true;
        }
        self
    }

    /// Builder: leave the battle when the path ends on an exit tile
    pub fn allowing_retreat(mut self) -> Self {
        if let MissionKind::GotoLocation { allow_retreat, .. } = &mut self.kind {
            *allow_retreat = true;
        }
        self
    }

    /// Turn to face a tile. `None` when the turn can't be paid for.
    pub fn turn(unit: &mut BattleUnit, mode: BattleMode, target: TilePos) -> Option<Self> {
        let facing = Facing::toward_tile(unit.tile(), target).unwrap_or(unit.facing);
        Self::turn_to_facing(unit, mode, facing)
    }

    pub fn turn_to_facing(unit: &mut BattleUnit, mode: BattleMode, facing: Facing) -> Option<Self> {
        let cost = unit.goal_facing.steps_to(facing) as i32 * TURN_COST;
        if !unit.spend_time_units(mode, cost) {
            debug!(unit = %unit.id, cost, "cannot afford turn");
            return None;
        }
        Some(Self {
            kind: MissionKind::Turn {
                target_facing: facing,
            },
            cost_paid_up_front: cost,
        })
    }

    /// Change pose. `None` when the pose is not allowed or can't be paid for.
    pub fn change_body_state(unit: &mut BattleUnit, mode: BattleMode, target: BodyState) -> Option<Self> {
        if !unit.agent.is_body_state_allowed(target) {
            warn!(unit = %unit.id, ?target, "body state not allowed for agent");
            return None;
        }
        let cost = body_state_change_cost(unit.target_body_state, target);
        if !unit.spend_time_units(mode, cost) {
            debug!(unit = %unit.id, cost, "cannot afford body state change");
            return None;
        }
        Some(Self {
            kind: MissionKind::ChangeBodyState { target },
            cost_paid_up_front: cost,
        })
    }

    /// Throw a carried item at a point
    pub fn throw_item(unit: &mut BattleUnit, mode: BattleMode, item: ItemId, target: Vec3) -> Option<Self> {
        if unit.agent.item(item).is_none() {
            warn!(unit = %unit.id, %item, "cannot throw an item the unit does not carry");
            return None;
        }
        if !unit.spend_time_units(mode, THROW_COST) {
            debug!(unit = %unit.id, "cannot afford throw");
            return None;
        }
        Some(Self {
            kind: MissionKind::ThrowItem {
                item,
                target,
                thrown: false,
            },
            cost_paid_up_front: THROW_COST,
        })
    }

    pub fn drop_item(item: ItemId) -> Self {
        Self::new(MissionKind::DropItem { item: Some(item) })
    }

    pub fn snooze(ticks: u32) -> Self {
        Self::new(MissionKind::Snooze { ticks })
    }

    pub fn acquire_time_units(required: i32) -> Self {
        Self::new(MissionKind::AcquireTU { required })
    }

    pub fn teleport(target: TilePos) -> Self {
        Self::new(MissionKind::Teleport { target })
    }

    pub fn restart_next_mission() -> Self {
        Self::new(MissionKind::RestartNextMission)
    }

    pub fn mission_type(&self) -> MissionType {
        match self.kind {
            MissionKind::ReachGoal => MissionType::ReachGoal,
            MissionKind::GotoLocation { .. } => MissionType::GotoLocation,
            MissionKind::Turn { .. } => MissionType::Turn,
            MissionKind::ChangeBodyState { .. } => MissionType::ChangeBodyState,
            MissionKind::ThrowItem { .. } => MissionType::ThrowItem,
            MissionKind::DropItem { .. } => MissionType::DropItem,
            MissionKind::Snooze { .. } => MissionType::Snooze,
            MissionKind::AcquireTU { .. } => MissionType::AcquireTU,
            MissionKind::Teleport { .. } => MissionType::Teleport,
            MissionKind::RestartNextMission => MissionType::RestartNextMission,
        }
    }

    /// Item still waiting to be thrown by this mission
    pub fn item_being_thrown(&self) -> Option<ItemId> {
        match self.kind {
            MissionKind::ThrowItem {
                item,
                thrown: false,
                ..
            } => Some(item),
            _ => None,
        }
    }

    pub fn planned_path(&self) -> Option<&VecDeque<TilePos>> {
        match &self.kind {
            MissionKind::GotoLocation { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn goto_target(&self) -> Option<TilePos> {
        match self.kind {
            MissionKind::GotoLocation { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn allows_retreat(&self) -> bool {
        matches!(
            self.kind,
            MissionKind::GotoLocation {
                allow_retreat: true,
                cancelled: false,
                ..
            }
        )
    }

    /// Abandon a movement order; it reports finished from now on
    pub fn cancel(&mut self) {
        if let MissionKind::GotoLocation { path, cancelled, .. } = &mut self.kind {
            path.clear();
            *cancelled = true;
        }
    }

    /// Forget a computed plan so the next start recomputes it
    pub fn reset_plan(&mut self) {
        if let MissionKind::GotoLocation {
            path,
            give_way_attempts,
            ..
        } = &mut self.kind
        {
            path.clear();
            *give_way_attempts = 0;
        }
    }

    pub fn start(&mut self, unit: &mut BattleUnit, battle: &mut BattleState) {
        match &mut self.kind {
            MissionKind::GotoLocation {
                target,
                path,
                cancelled: false,
                ..
            } => {
                if path.is_empty() {
                    let from = tile_of(unit.goal_position);
                    *path = battle
                        .map
                        .find_shortest_path(from, *target, PATH_COST_LIMIT, unit.is_large())
                        .into();
                    debug!(unit = %unit.id, steps = path.len(), "planned path");
                }
            }
            MissionKind::DropItem { item } => {
                if let Some(id) = item.take() {
                    unit.drop_item(battle, id);
                }
            }
            MissionKind::Teleport { target } => {
                unit.teleport_to(battle, *target);
            }
            _ => {}
        }
    }

    pub fn update(&mut self, unit: &mut BattleUnit, battle: &mut BattleState, ticks: u32) {
        match &mut self.kind {
            MissionKind::Snooze { ticks: remaining } => {
                *remaining = remaining.saturating_sub(ticks);
            }
            MissionKind::ThrowItem {
                item,
                target,
                thrown,
            } => {
                if !*thrown
                    && unit.current_body_state == BodyState::Throwing
                    && unit.target_body_state == BodyState::Throwing
                {
                    unit.throw_item(battle, *item, *target);
                    *thrown = true;
                }
            }
            _ => {}
        }
    }

    pub fn is_finished(&self, unit: &BattleUnit, mode: BattleMode) -> bool {
        match &self.kind {
            MissionKind::ReachGoal => unit.at_goal,
            MissionKind::GotoLocation {
                path, cancelled, ..
            } => *cancelled || (path.is_empty() && unit.at_goal),
            MissionKind::Turn { target_facing } => {
                unit.facing == *target_facing && unit.turning_animation_ticks_remaining == 0
            }
            MissionKind::ChangeBodyState { target } => {
                unit.current_body_state == *target && unit.target_body_state == *target
            }
            MissionKind::ThrowItem { thrown, .. } => {
                *thrown
                    && unit.current_body_state != BodyState::Throwing
                    && unit.target_body_state != BodyState::Throwing
            }
            MissionKind::DropItem { item } => item.is_none(),
            MissionKind::Snooze { ticks } => *ticks == 0,
            MissionKind::AcquireTU { required } => unit.can_afford(mode, *required),
            MissionKind::Teleport { target } => unit.tile() == *target,
            MissionKind::RestartNextMission => true,
        }
    }

    pub fn next_destination(&mut self, unit: &mut BattleUnit, battle: &mut BattleState) -> NextStep {
        let MissionKind::GotoLocation {
            target,
            path,
            demand_give_way,
            give_way_attempts,
            cancelled,
            ..
        } = &mut self.kind
        else {
            return NextStep::Stay;
        };
        if *cancelled {
            return NextStep::Stay;
        }
        let Some(&planned) = path.front() else {
            return NextStep::Stay;
        };

        let large = unit.is_large();
        let here = unit.tile();
        let mut next = planned;
        if !battle.map.can_enter_tile(here, next, large) {
            // The map changed under the plan
            *path = battle
                .map
                .find_shortest_path(here, *target, PATH_COST_LIMIT, large)
                .into();
            match path.front() {
                Some(&replanned) if battle.map.can_enter_tile(here, replanned, large) => {
                    next = replanned;
                }
                _ => {
                    debug!(unit = %unit.id, "no way forward, abandoning path");
                    path.clear();
                    return NextStep::Stay;
                }
            }
        }

        if let Some(blocker) = battle.conscious_unit_at(next, unit.id) {
            if *give_way_attempts >= MAX_GIVE_WAY_ATTEMPTS {
                debug!(unit = %unit.id, %blocker, "still blocked, abandoning path");
                path.clear();
                return NextStep::Stay;
            }
            *give_way_attempts += 1;
            let same_side = battle.owner_of(blocker) == Some(unit.owner);
            if same_side || *demand_give_way {
                let route: Vec<TilePos> = path.iter().copied().collect();
                battle.request_give_way(blocker, here, &route, next);
            }
            return NextStep::Wait(GIVE_WAY_WAIT_TICKS);
        }
        *give_way_attempts = 0;

        if let Some(direction) = Facing::toward_tile(here, next) {
            if direction != unit.facing {
                return NextStep::Stay;
            }
        }
        if unit.current_body_state != unit.target_body_state || !unit.body_allows_movement() {
            return NextStep::Stay;
        }

        let mode = battle.config.mode;
        let cost = move_cost(here, next);
        if !unit.spend_time_units(mode, cost) {
            return NextStep::NeedTimeUnits(cost);
        }
        path.pop_front();
        let gait = unit.movement_state_for_mode();
        unit.set_movement_state(battle, gait);
        NextStep::Move(battle.map.resting_position(next, large))
    }

    pub fn next_facing(&mut self, unit: &mut BattleUnit, battle: &mut BattleState) -> Option<Facing> {
        let mode = battle.config.mode;
        match &self.kind {
            MissionKind::GotoLocation {
                path,
                cancelled: false,
                ..
            } => {
                if !unit.at_goal {
                    return None;
                }
                let next = *path.front()?;
                let wanted = Facing::toward_tile(unit.tile(), next)?;
                if wanted == unit.facing || !unit.spend_time_units(mode, TURN_COST) {
                    return None;
                }
                Some(unit.facing.step_towards(wanted))
            }
            MissionKind::Turn { target_facing } => {
                (unit.facing != *target_facing).then(|| unit.facing.step_towards(*target_facing))
            }
            MissionKind::ThrowItem {
                target,
                thrown: false,
                ..
            } => {
                let wanted = Facing::toward(unit.position, *target)?;
                (wanted != unit.facing).then(|| unit.facing.step_towards(wanted))
            }
            _ => None,
        }
    }

    pub fn next_body_state(&mut self, unit: &BattleUnit) -> Option<BodyState> {
        let upright = if unit.agent.is_body_state_allowed(BodyState::Standing) {
            BodyState::Standing
        } else {
            BodyState::Flying
        };
        match &self.kind {
            MissionKind::ReachGoal => stand_up_to_move(unit, upright),
            MissionKind::GotoLocation {
                path,
                cancelled: false,
                ..
            } if !path.is_empty() => stand_up_to_move(unit, upright),
            MissionKind::ChangeBodyState { target } => {
                (unit.current_body_state != *target).then_some(*target)
            }
            MissionKind::ThrowItem { target, thrown, .. } => {
                if !*thrown {
                    let facing_ok = Facing::toward(unit.position, *target)
                        .map_or(true, |wanted| wanted == unit.facing);
                    (facing_ok && unit.current_body_state != BodyState::Throwing)
                        .then_some(BodyState::Throwing)
                } else {
                    (unit.current_body_state == BodyState::Throwing).then_some(upright)
                }
            }
            _ => None,
        }
    }
}

/// Pose a unit must take before it can walk
fn stand_up_to_move(unit: &BattleUnit, upright: BodyState) -> Option<BodyState> {
    match unit.current_body_state {
        BodyState::Kneeling => Some(upright),
        BodyState::Prone if !unit.body_allows_movement() => Some(upright),
        _ => None,
    }
}
