//! Mission queue operations
//!
//! The queue is owned by the unit. The front mission is taken out of the
//! queue while it runs so it can borrow the unit and the battle at the
//! same time; it is put back at the front afterwards.

use glam::Vec3;
use tracing::{debug, error};

use crate::battle::execution::BattleState;
use crate::battle::facing::Facing;
use crate::battle::mission::{Mission, MissionKind, MissionType, NextStep};
use crate::battle::states::BodyState;
use crate::battle::unit::BattleUnit;
use crate::core::types::{BattleMode, TilePos};

impl BattleUnit {
    /// Run `f` on the mission at `index` with the queue released
    pub(crate) fn with_mission_at<R>(
        &mut self,
        battle: &mut BattleState,
        index: usize,
        f: impl FnOnce(&mut Mission, &mut BattleUnit, &mut BattleState) -> R,
    ) -> Option<R> {
        let mut mission = self.missions.remove(index)?;
        let result = f(&mut mission, self, battle);
        let index = index.min(self.missions.len());
        self.missions.insert(index, mission);
        Some(result)
    }

    fn start_mission_at(&mut self, battle: &mut BattleState, index: usize) {
        let Some(mission) = self.missions.get(index) else {
            return;
        };
        debug!(unit = %self.id, mission = ?mission.mission_type(), "starting mission");
        if mission.mission_type() == MissionType::RestartNextMission {
            if let Some(next) = self.missions.get_mut(index + 1) {
                next.reset_plan();
            }
            return;
        }
        self.with_mission_at(battle, index, |mission, unit, battle| mission.start(unit, battle));
    }

    fn front_mission_type(&self) -> Option<MissionType> {
        self.missions.front().map(Mission::mission_type)
    }

    /// Queue a mission according to its kind
    ///
    /// ReachGoal goes to the front unless the head is anything but an
    /// AcquireTU or another ReachGoal is already queued. Short interrupts (Snooze, AcquireTU, RestartNextMission,
    /// DropItem) go to the front and start at once. Everything else joins
    /// the back and starts only if it is alone; Teleport always starts.
    pub fn add_mission(&mut self, battle: &mut BattleState, mission: Mission) -> bool {
        match mission.mission_type() {
            MissionType::ReachGoal => {
                let busy = self
                    .missions
                    .front()
                    .is_some_and(|m| m.mission_type() != MissionType::AcquireTU);
                let queued = self.missions.iter().any(|m| m.mission_type() == MissionType::ReachGoal);
                if busy || queued {
                    return false;
                }
                self.missions.push_front(mission);
                self.start_mission_at(battle, 0);
            }
            MissionType::Snooze
            | MissionType::AcquireTU
            | MissionType::RestartNextMission
            | MissionType::DropItem => {
                self.missions.push_front(mission);
                self.start_mission_at(battle, 0);
            }
            MissionType::Teleport => {
                self.missions.push_back(mission);
                let index = self.missions.len() - 1;
                self.start_mission_at(battle, index);
            }
            MissionType::Turn
            | MissionType::ChangeBodyState
            | MissionType::ThrowItem
            | MissionType::GotoLocation => {
                self.missions.push_back(mission);
                if self.missions.len() == 1 {
                    self.start_mission_at(battle, 0);
                }
            }
        }
        true
    }

    /// Queue a parameterless mission by tag
    pub fn add_mission_by_type(&mut self, battle: &mut BattleState, mission_type: MissionType) -> bool {
        match mission_type {
            MissionType::ReachGoal => self.add_mission(battle, Mission::reach_goal()),
            MissionType::RestartNextMission => self.add_mission(battle, Mission::restart_next_mission()),
            other => {
                error!(unit = %self.id, mission = ?other, "mission needs parameters, cannot add by type");
                false
            }
        }
    }

    /// Push to the back without starting
    pub fn append_mission(&mut self, mission: Mission) {
        self.missions.push_back(mission);
    }

    /// Replace the current orders with `mission`
    ///
    /// Accepts `Option<Mission>` so fallible constructors can be passed
    /// straight through; `None` is a no-op.
    pub fn set_mission(&mut self, battle: &mut BattleState, mission: impl Into<Option<Mission>>) -> bool {
        let Some(mission) = mission.into() else {
            return false;
        };
        let mode = battle.config.mode;
        let mission_type = mission.mission_type();

        if mission_type == MissionType::Turn {
            self.stop_attacking();
        }

        if !self.cancel_missions(battle) {
            self.refund_time_units(mode, mission.cost_paid_up_front);
            return false;
        }

        match mission_type {
            // Let-finish steps give way to a paid throw
            MissionType::ThrowItem if battle.config.allow_instant_throws && !self.missions.is_empty() => {
                self.clear_missions_with_refund(mode);
                let body = self.current_body_state;
                self.set_body_state(battle, body);
                let facing = self.facing;
                self.set_facing(battle, facing);
            }
            MissionType::Turn | MissionType::GotoLocation | MissionType::ReachGoal => {
                let front = self.front_mission_type();
                if front == Some(MissionType::ReachGoal) && mission_type == MissionType::GotoLocation {
                    // Path planning starts from the goal, so the step in
                    // progress can stay without an explicit mission
                    self.missions.clear();
                } else if front == Some(MissionType::Turn) {
                    let incoming = mission;
                    let next = self.next_facing_for(battle, &incoming);
                    if next.is_some_and(|next| next != self.goal_facing) {
                        // Drop the in-flight turn and stop where we are
                        self.missions.clear();
                        let facing = self.facing;
                        self.set_facing(battle, facing);
                    }
                    return self.add_mission(battle, incoming);
                }
            }
            _ => {}
        }

        self.add_mission(battle, mission)
    }

    /// First facing step `mission` would take, answered as if it were running
    fn next_facing_for(&mut self, battle: &mut BattleState, mission: &Mission) -> Option<Facing> {
        match &mission.kind {
            MissionKind::Turn { target_facing } => Some(self.facing.step_towards(*target_facing)),
            MissionKind::GotoLocation { .. } => {
                let mut planned = mission.clone();
                planned.start(self, battle);
                let next = *planned.planned_path()?.front()?;
                let wanted = Facing::toward_tile(self.tile(), next)?;
                Some(self.facing.step_towards(wanted))
            }
            MissionKind::ReachGoal => {
                let wanted = Facing::toward(self.position, self.goal_position)?;
                Some(self.facing.step_towards(wanted))
            }
            _ => None,
        }
    }

    fn clear_missions_with_refund(&mut self, mode: BattleMode) {
        while let Some(mission) = self.missions.pop_back() {
            self.refund_time_units(mode, mission.cost_paid_up_front);
        }
    }

    /// Drop queued orders, letting uninterruptible work finish
    ///
    /// Returns false if the unit retreated or is in the middle of a throw.
    /// A turn or stance change in progress is reduced to a mission that just
    /// completes the current step; a movement step in progress is left to
    /// the idle ReachGoal.
    pub fn cancel_missions(&mut self, battle: &mut BattleState) -> bool {
        if self.pop_finished_missions(battle) {
            return false;
        }
        let mode = battle.config.mode;
        let Some(front) = self.front_mission_type() else {
            return true;
        };

        let mut keep_front = false;
        match front {
            MissionType::ThrowItem => return false,
            MissionType::ChangeBodyState
            | MissionType::Turn
            | MissionType::GotoLocation
            | MissionType::ReachGoal => {
                let replacement = if self.turning_animation_ticks_remaining > 0 {
                    let target_facing = self.goal_facing;
                    Some(MissionKind::Turn { target_facing })
                } else if self.body_animation_ticks_remaining > 0 {
                    let target = self.target_body_state;
                    Some(MissionKind::ChangeBodyState { target })
                } else {
                    None
                };
                if let Some(kind) = replacement {
                    if let Some(mission) = self.missions.front_mut() {
                        let refund = if let MissionKind::Turn { .. } = kind {
                            // The step being taken stays paid for
                            (mission.cost_paid_up_front - 1).max(0)
                        } else {
                            mission.cost_paid_up_front
                        };
                        mission.kind = kind;
                        mission.cost_paid_up_front = 0;
                        self.refund_time_units(mode, refund);
                    }
                    keep_front = true;
                }
            }
            _ => {}
        }

        let keep = usize::from(keep_front);
        while self.missions.len() > keep {
            if let Some(mission) = self.missions.pop_back() {
                self.refund_time_units(mode, mission.cost_paid_up_front);
            }
        }

        if self.missions.is_empty() && !self.at_goal {
            self.add_mission(battle, Mission::reach_goal());
        }
        true
    }

    /// Pop finished missions off the front, starting each new front
    ///
    /// Returns true if the unit retreated, in which case the caller must
    /// stop updating it.
    pub fn pop_finished_missions(&mut self, battle: &mut BattleState) -> bool {
        let mode = battle.config.mode;
        while let Some(front) = self.missions.front() {
            if !front.is_finished(self, mode) {
                break;
            }
            let Some(finished) = self.missions.pop_front() else {
                break;
            };
            debug!(unit = %self.id, mission = ?finished.mission_type(), "mission finished");

            if finished.allows_retreat() && battle.map.is_exit(self.tile()) {
                self.retreat(battle);
            }
            if self.retreated {
                return true;
            }
            if self.missions.is_empty() {
                break;
            }
            self.start_mission_at(battle, 0);
        }
        false
    }

    pub fn next_destination(&mut self, battle: &mut BattleState) -> Option<Vec3> {
        let step = self.with_mission_at(battle, 0, |mission, unit, battle| {
            mission.next_destination(unit, battle)
        })?;
        match step {
            NextStep::Move(destination) => Some(destination),
            NextStep::Wait(ticks) => {
                self.add_mission(battle, Mission::snooze(ticks));
                None
            }
            NextStep::NeedTimeUnits(required) => {
                self.add_mission(battle, Mission::acquire_time_units(required));
                None
            }
            NextStep::Stay => None,
        }
    }

    pub fn next_facing(&mut self, battle: &mut BattleState) -> Option<Facing> {
        self.with_mission_at(battle, 0, |mission, unit, battle| mission.next_facing(unit, battle))
            .flatten()
    }

    pub fn next_body_state(&mut self, battle: &mut BattleState) -> Option<BodyState> {
        self.with_mission_at(battle, 0, |mission, unit, _| mission.next_body_state(unit))
            .flatten()
    }

    /// Path of the first queued movement order to `target`, planning it if needed
    pub fn planned_path_to(
        &mut self,
        battle: &mut BattleState,
        target: TilePos,
    ) -> Option<Vec<TilePos>> {
        let index = self
            .missions
            .iter()
            .position(|m| m.goto_target() == Some(target))?;
        self.with_mission_at(battle, index, |mission, unit, battle| {
            if mission.planned_path().is_some_and(|p| p.is_empty()) {
                mission.start(unit, battle);
            }
            mission
                .planned_path()
                .map(|p| p.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Cancel every queued movement order to `target`
    pub fn cancel_goto(&mut self, target: TilePos) {
        for mission in self.missions.iter_mut() {
            if mission.goto_target() == Some(target) {
                mission.cancel();
            }
        }
    }
}
