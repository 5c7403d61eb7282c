//! Battle session and tick loop
//!
//! The session owns the roster, the map and media services, the seeded RNG
//! and the per-faction visibility index. Each tick updates every unit in id
//! order. A unit being updated is taken out of the roster so it can borrow
//! the rest of the battle mutably, and is put back when it is done.

use std::collections::BTreeMap;

use glam::Vec3;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::battle::agent::Agent;
use crate::battle::damage::DamageType;
use crate::battle::equipment::Equipment;
use crate::battle::facing::Facing;
use crate::battle::forces::Forces;
use crate::battle::services::{AnimationPack, SoundBackend, TileMap, TracingSoundBackend};
use crate::battle::states::BodyPart;
use crate::battle::unit::BattleUnit;
use crate::battle::vision::VisibilityIndex;
use crate::core::config::BattleConfig;
use crate::core::error::{BattleError, Result};
use crate::core::types::{ItemId, OwnerId, Tick, TilePos, UnitId};

/// Battle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BattlePhase {
    #[default]
    Deployment, // Placing units
    Active,   // Battle in progress
    Finished, // Battle over
}

/// Log entry for battle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEvent {
    pub tick: Tick,
    pub event_type: BattleEventType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEventType {
    BattleStarted,
    BattleEnded,
    UnitSpawned { unit: UnitId },
    UnitDamaged { unit: UnitId, damage: i32, part: BodyPart },
    ShieldAbsorbed { unit: UnitId, damage: i32 },
    FatalWound { unit: UnitId, part: BodyPart },
    UnitKnockedOut { unit: UnitId },
    UnitRoseUp { unit: UnitId },
    UnitDied { unit: UnitId },
    UnitRetreated { unit: UnitId },
    UnitDestroyed { unit: UnitId },
    UnitSpotted { owner: OwnerId, unit: UnitId },
    UnitLost { owner: OwnerId, unit: UnitId },
    WeaponFired { unit: UnitId, item: ItemId, target: Vec3 },
    ItemDropped { unit: UnitId, item: ItemId },
    ItemThrown { unit: UnitId, item: ItemId, target: Vec3 },
    DoodadPlaced { name: String, position: Vec3 },
}

/// Item lying on the battlefield
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundItem {
    pub item: Equipment,
    pub position: Vec3,
}

/// Complete battle state
pub struct BattleState {
    // Services
    pub map: Box<dyn TileMap>,
    pub animations: Box<dyn AnimationPack>,
    pub sounds: Box<dyn SoundBackend>,

    pub config: BattleConfig,
    pub tick: Tick,
    pub phase: BattlePhase,

    // Roster
    pub units: BTreeMap<UnitId, BattleUnit>,
    pub forces: BTreeMap<OwnerId, Forces>,

    // Fog of war, per faction
    pub visibility: VisibilityIndex,

    pub rng: ChaCha8Rng,
    pub ground_items: Vec<GroundItem>,
    /// Played when a solid hit lands on a unit
    pub hit_sounds: Vec<String>,

    // Log
    pub battle_log: Vec<BattleEvent>,

    /// Units whose vision must be refreshed once the current update ends
    pending_vision: Vec<UnitId>,
    next_unit_id: u32,
}

impl BattleState {
    pub fn new(map: Box<dyn TileMap>, animations: Box<dyn AnimationPack>, config: BattleConfig) -> Self {
        let visibility = VisibilityIndex::new(map.size(), map.los_block_count());
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            map,
            animations,
            sounds: Box::new(TracingSoundBackend),
            config,
            tick: 0,
            phase: BattlePhase::Deployment,
            units: BTreeMap::new(),
            forces: BTreeMap::new(),
            visibility,
            rng,
            ground_items: Vec::new(),
            hit_sounds: Vec::new(),
            battle_log: Vec::new(),
            pending_vision: Vec::new(),
            next_unit_id: 0,
        }
    }

    pub fn with_sound_backend(mut self, sounds: Box<dyn SoundBackend>) -> Self {
        self.sounds = sounds;
        self
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, BattlePhase::Finished)
    }

    /// Start the battle: every unit takes its first look around
    pub fn start_battle(&mut self) {
        self.phase = BattlePhase::Active;
        self.visibility = VisibilityIndex::new(self.map.size(), self.map.los_block_count());
        let ids: Vec<UnitId> = self.units.keys().copied().collect();
        for id in ids {
            self.with_unit(id, |unit, battle| unit.update_vision(battle));
        }
        self.flush_pending_vision();
        self.log_event(BattleEventType::BattleStarted, "Battle has begun".into());
    }

    /// End the battle and discard fog of war
    pub fn end_battle(&mut self) {
        self.phase = BattlePhase::Finished;
        self.visibility.clear();
        self.log_event(BattleEventType::BattleEnded, "Battle ended".into());
    }

    /// Restore every unit's time units for a new turn
    pub fn begin_turn(&mut self) {
        for unit in self.units.values_mut() {
            unit.agent.modified_stats.time_units = unit.agent.current_stats.time_units;
        }
    }

    /// Place a new unit standing on `tile`
    pub fn spawn_unit(&mut self, owner: OwnerId, agent: Agent, tile: TilePos, facing: Facing) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;

        let position = self.map.resting_position(tile, agent.is_large());
        let mut unit = BattleUnit::new(id, owner, agent, position, facing);
        match self.forces.entry(owner).or_default().enlist(id) {
            Some((squad, slot)) => {
                unit.squad_number = Some(squad);
                unit.squad_position = slot;
            }
            None => debug!(unit = %id, %owner, "all squads full, unit left unassigned"),
        }

        self.map.place_unit(id, Some(tile));
        self.units.insert(id, unit);
        self.log_event(BattleEventType::UnitSpawned { unit: id }, format!("{} deployed", id));

        if self.phase == BattlePhase::Active {
            self.with_unit(id, |unit, battle| unit.update_vision(battle));
            // Rivals take a fresh look at the newcomer
            for (other, u) in &self.units {
                if u.owner != owner && !self.pending_vision.contains(other) {
                    self.pending_vision.push(*other);
                }
            }
            self.flush_pending_vision();
        }
        id
    }

    /// Advance every unit by `ticks`
    pub fn update(&mut self, ticks: u32) {
        if self.is_finished() {
            return;
        }
        self.tick += ticks as Tick;

        let ids: Vec<UnitId> = self.units.keys().copied().collect();
        for id in ids {
            self.with_unit(id, |unit, battle| unit.update(battle, ticks));
            self.flush_pending_vision();
        }
    }

    /// Run `f` with the unit out of the roster
    pub(crate) fn with_unit<R>(
        &mut self,
        id: UnitId,
        f: impl FnOnce(&mut BattleUnit, &mut BattleState) -> R,
    ) -> Option<R> {
        let Some(mut unit) = self.units.remove(&id) else {
            error!(unit = %id, "no unit matching id");
            return None;
        };
        let result = f(&mut unit, self);
        self.units.insert(id, unit);
        Some(result)
    }

    /// Issue an order or query to one unit
    ///
    /// Vision refreshes caused by the call are resolved before returning.
    pub fn command<R>(
        &mut self,
        id: UnitId,
        f: impl FnOnce(&mut BattleUnit, &mut BattleState) -> R,
    ) -> Option<R> {
        let result = self.with_unit(id, f);
        self.flush_pending_vision();
        result
    }

    pub fn unit(&self, id: UnitId) -> Option<&BattleUnit> {
        self.units.get(&id)
    }

    pub fn try_unit(&self, id: UnitId) -> Result<&BattleUnit> {
        self.units.get(&id).ok_or(BattleError::UnitNotFound(id))
    }

    pub fn owner_of(&self, id: UnitId) -> Option<OwnerId> {
        self.units.get(&id).map(|u| u.owner)
    }

    /// A conscious unit other than `except` occupying the tile
    pub fn conscious_unit_at(&self, tile: TilePos, except: UnitId) -> Option<UnitId> {
        self.map.units_at(tile).into_iter().find(|id| {
            *id != except
                && self
                    .units
                    .get(id)
                    .is_some_and(|u| u.is_conscious() && !u.is_gone())
        })
    }

    /// Point `unit` at `target`, keeping the reverse index in step
    pub fn set_focus(&mut self, unit: UnitId, target: UnitId) -> bool {
        if !self.units.contains_key(&target) {
            return false;
        }
        let Some(previous) = self.units.get(&unit).map(|u| u.focus_unit) else {
            return false;
        };
        if let Some(previous) = previous {
            match self.units.get_mut(&previous) {
                Some(old) if old.focused_by.contains(&unit) => old.focused_by.retain(|u| *u != unit),
                _ => error!(unit = %unit, focus = %previous, "inconsistent focus"),
            }
        }
        if let Some(u) = self.units.get_mut(&unit) {
            u.focus_unit = Some(target);
        }
        if let Some(t) = self.units.get_mut(&target) {
            t.focused_by.push(unit);
        }
        true
    }

    /// Resolve a projectile hit on a unit
    ///
    /// Returns true if a shield absorbed the hit. Dead and departed units
    /// are ignored.
    pub fn hit_unit(
        &mut self,
        target: UnitId,
        power: i32,
        damage_type: &DamageType,
        impact: Vec3,
        direction: Vec3,
    ) -> bool {
        let absorbed = self.with_unit(target, |unit, battle| {
            if unit.is_dead() || unit.is_gone() {
                return false;
            }
            let part = unit.determine_body_part_hit(damage_type, impact, direction);
            unit.apply_damage(battle, power, damage_type, part)
        });
        self.flush_pending_vision();
        absorbed.unwrap_or(false)
    }

    /// Ask a unit to step out of the way of another
    pub fn request_give_way(&mut self, unit: UnitId, requestor: TilePos, planned_path: &[TilePos], at: TilePos) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.request_give_way(requestor, planned_path, at);
        }
    }

    /// Queue rivals that currently see `unit` for a vision refresh
    pub(crate) fn refresh_watchers(&mut self, unit: UnitId, owner: OwnerId) {
        for (id, other) in &self.units {
            if other.owner != owner
                && other.visible_units.contains(&unit)
                && !self.pending_vision.contains(id)
            {
                self.pending_vision.push(*id);
            }
        }
    }

    fn flush_pending_vision(&mut self) {
        while let Some(id) = self.pending_vision.pop() {
            if self.units.contains_key(&id) {
                self.with_unit(id, |unit, battle| unit.update_vision(battle));
            }
        }
    }

    /// Take a departing unit out of its squad and close the gap
    pub(crate) fn remove_from_squad(&mut self, unit: &mut BattleUnit) {
        let Some(squad) = unit.squad_number.take() else {
            return;
        };
        let Some(forces) = self.forces.get_mut(&unit.owner) else {
            return;
        };
        for (id, position) in forces.remove(squad, unit.id) {
            if let Some(member) = self.units.get_mut(&id) {
                member.squad_position = position;
            }
        }
        unit.squad_position = 0;
    }

    pub fn place_doodad(&mut self, name: &str, position: Vec3) {
        self.log_event(
            BattleEventType::DoodadPlaced {
                name: name.to_string(),
                position,
            },
            format!("{} at {:.1},{:.1},{:.1}", name, position.x, position.y, position.z),
        );
    }

    /// Play one sample picked at random from `samples`
    pub fn play_random_sample(&mut self, samples: &[String], position: Vec3, gain: f32) {
        if let Some(sample) = samples.choose(&mut self.rng) {
            self.sounds.play_sample(sample, position, gain);
        }
    }

    /// Log a battle event
    pub fn log_event(&mut self, event_type: BattleEventType, description: String) {
        info!(tick = self.tick, "{}", description);
        self.battle_log.push(BattleEvent {
            tick: self.tick,
            event_type,
            description,
        });
    }

    pub fn events_of<'a>(&'a self, predicate: impl Fn(&BattleEventType) -> bool + 'a) -> impl Iterator<Item = &'a BattleEvent> + 'a {
        self.battle_log.iter().filter(move |e| predicate(&e.event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::testing::*;

    #[test]
    fn test_battle_state_creation() {
        let battle = open_battle(8);
        assert_eq!(battle.phase, BattlePhase::Active);
        assert_eq!(battle.tick, 0);
        assert!(battle.units.is_empty());
    }

    #[test]
    fn test_battle_tick_increments() {
        let mut battle = open_battle(8);
        battle.update(5);
        battle.update(3);
        assert_eq!(battle.tick, 8);
    }

    #[test]
    fn test_finished_battle_does_not_tick() {
        let mut battle = open_battle(8);
        battle.end_battle();
        battle.update(5);
        assert_eq!(battle.tick, 0);
        assert!(battle.is_finished());
    }

    #[test]
    fn test_spawn_enlists_in_squad() {
        let mut battle = open_battle(8);
        let a = spawn(&mut battle, OwnerId(0), (1, 1), Facing::North);
        let b = spawn(&mut battle, OwnerId(0), (2, 1), Facing::North);
        assert_eq!(battle.unit(a).unwrap().squad_number, Some(0));
        assert_eq!(battle.unit(b).unwrap().squad_position, 1);
        assert_eq!(battle.map.units_at(TilePos::new(2, 1, 0)), vec![b]);
    }

    #[test]
    fn test_try_unit_missing() {
        let battle = open_battle(8);
        assert!(matches!(battle.try_unit(UnitId(42)), Err(BattleError::UnitNotFound(_))));
    }

    #[test]
    fn test_command_missing_unit_is_none() {
        let mut battle = open_battle(8);
        assert!(battle.command(UnitId(42), |_, _| ()).is_none());
    }

    #[test]
    fn test_focus_reverse_index() {
        let mut battle = open_battle(8);
        let a = spawn(&mut battle, OwnerId(0), (1, 1), Facing::North);
        let b = spawn(&mut battle, OwnerId(1), (5, 1), Facing::North);
        let c = spawn(&mut battle, OwnerId(1), (6, 1), Facing::North);

        assert!(battle.set_focus(a, b));
        assert_eq!(battle.unit(b).unwrap().focused_by, vec![a]);
        assert!(battle.set_focus(a, c));
        assert!(battle.unit(b).unwrap().focused_by.is_empty());
        assert_eq!(battle.unit(c).unwrap().focused_by, vec![a]);
        assert_eq!(battle.unit(a).unwrap().focus_unit, Some(c));
    }

    #[test]
    fn test_same_seed_same_rolls() {
        use rand::Rng;
        let mut one = open_battle(4);
        let mut two = open_battle(4);
        let a: Vec<u32> = (0..8).map(|_| one.rng.gen_range(0..1000)).collect();
        let b: Vec<u32> = (0..8).map(|_| two.rng.gen_range(0..1000)).collect();
        assert_eq!(a, b);
    }
}
