//! Battle units - soldiers and creatures on the tactical map
//!
//! A unit is driven by ticks. Each update advances its equipment and
//! missions, bleeds its wounds, decides what to do when idle, then moves,
//! turns and fires until its animation budgets are spent.
//!
//! The map, animation tables and audio device are services behind traits;
//! the unit never owns them.

pub mod agent;
pub mod animation;
pub mod constants;
pub mod damage;
pub mod equipment;
pub mod execution;
pub mod facing;
pub mod firing;
pub mod forces;
pub mod give_way;
pub mod grid_map;
pub mod group_move;
pub mod injury;
pub mod mission;
pub mod mission_queue;
pub mod motion;
pub mod pathfinding;
pub mod services;
pub mod states;
pub mod unit;
pub mod update;
pub mod vision;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use agent::{Agent, AgentSounds, AgentStats, AgentType, BodyType, Gender};
pub use animation::TableAnimationPack;
pub use constants::*;
pub use damage::{DamageEffect, DamageModifierId, DamageType};
pub use equipment::{Equipment, EquipmentSlot, ItemKind, WeaponSpec};
pub use execution::{BattleEvent, BattleEventType, BattlePhase, BattleState, GroundItem};
pub use facing::Facing;
pub use forces::{Forces, Squad};
pub use give_way::GiveWayRequest;
pub use grid_map::{GridMap, GridTile};
pub use group_move::GroupMovePlan;
pub use mission::{Mission, MissionKind, MissionType, NextStep};
pub use pathfinding::{find_path, path_cost};
pub use services::{
    AnimationPack, BodyPose, Collision, FiringPose, HandPose, LosBlock, MapPart,
    SilentSoundBackend, SoundBackend, TileMap, TracingSoundBackend,
};
pub use states::{
    BodyPart, BodyState, HandState, KneelingMode, MovementMode, MovementState, TargetingMode,
    WeaponStatus,
};
pub use unit::BattleUnit;
pub use vision::VisibilityIndex;
