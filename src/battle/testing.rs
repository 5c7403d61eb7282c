//! Shared fixtures for unit tests

use std::cell::RefCell;
use std::rc::Rc;

use glam::{IVec3, Vec3};

use crate::battle::agent::{Agent, AgentStats, AgentType};
use crate::battle::animation::TableAnimationPack;
use crate::battle::equipment::{Equipment, EquipmentSlot, WeaponSpec};
use crate::battle::execution::BattleState;
use crate::battle::facing::Facing;
use crate::battle::grid_map::GridMap;
use crate::battle::services::SoundBackend;
use crate::core::config::BattleConfig;
use crate::core::types::{BattleMode, ItemId, OwnerId, UnitId};

pub const RIFLE: ItemId = ItemId(100);
pub const GRENADE: ItemId = ItemId(200);

pub fn soldier_stats() -> AgentStats {
    AgentStats {
        health: 40,
        time_units: 60,
        speed: 50,
    }
}

pub fn soldier() -> Agent {
    Agent::new("soldier", AgentType::human(), soldier_stats())
}

pub fn rifle() -> Equipment {
    Equipment::weapon(
        RIFLE,
        "rifle",
        WeaponSpec {
            fire_delay: 100,
            range: 20.0,
            power: 20,
            clip_size: 10,
        },
        EquipmentSlot::RightHand,
    )
}

pub fn battle_with(size: i32, pack: TableAnimationPack, config: BattleConfig) -> BattleState {
    let map = GridMap::new(IVec3::new(size, size, 1));
    let mut battle = BattleState::new(Box::new(map), Box::new(pack), config);
    battle.start_battle();
    battle
}

pub fn battle_with_pack(size: i32, pack: TableAnimationPack) -> BattleState {
    battle_with(size, pack, BattleConfig::default())
}

/// Started real-time battle on an open square map
pub fn open_battle(size: i32) -> BattleState {
    battle_with_pack(size, TableAnimationPack::new(2, 2, 1))
}

pub fn open_turn_based_battle(size: i32) -> BattleState {
    let config = BattleConfig {
        mode: BattleMode::TurnBased,
        ..BattleConfig::default()
    };
    battle_with(size, TableAnimationPack::new(2, 2, 1), config)
}

pub fn spawn(battle: &mut BattleState, owner: OwnerId, at: (i32, i32), facing: Facing) -> UnitId {
    battle.spawn_unit(owner, soldier(), IVec3::new(at.0, at.1, 0), facing)
}

pub fn spawn_armed(battle: &mut BattleState, owner: OwnerId, at: (i32, i32), facing: Facing) -> UnitId {
    battle.spawn_unit(owner, soldier().with_equipment(rifle()), IVec3::new(at.0, at.1, 0), facing)
}

pub fn spawn_with_grenade(battle: &mut BattleState, owner: OwnerId, at: (i32, i32), facing: Facing) -> UnitId {
    let agent = soldier().with_equipment(Equipment::grenade(GRENADE, "grenade", 30, EquipmentSlot::Belt));
    battle.spawn_unit(owner, agent, IVec3::new(at.0, at.1, 0), facing)
}

/// Sound backend that remembers what it was asked to play
#[derive(Debug, Clone, Default)]
pub struct RecordingSounds(Rc<RefCell<Vec<String>>>);

impl RecordingSounds {
    pub fn samples(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl SoundBackend for RecordingSounds {
    fn play_sample(&mut self, sample: &str, _position: Vec3, _gain: f32) {
        self.0.borrow_mut().push(sample.to_string());
    }
}
