//! Battle system constants - all tunable values in one place
//!
//! Times are in ticks, distances in tiles unless a name says otherwise.

use glam::Vec3;

// Time
pub const TICKS_PER_SECOND: u32 = 144;
pub const TICKS_PER_FRAME_UNIT: u32 = 8; // one animation frame, also one facing step
pub const TICKS_PER_UNIT_EFFECT: u32 = TICKS_PER_SECOND * 4; // fatal wound bleed period

// Movement
pub const TICKS_PER_UNIT_TRAVELLED: u32 = 32;
pub const VELOCITY_SCALE: Vec3 = Vec3::new(24.0, 24.0, 20.0); // movement units per tile
pub const FLYING_ACCELERATION_DIVISOR: u32 = 2;
pub const FALLING_ACCELERATION: f32 = 0.16;
pub const TICK_SCALE: f32 = 36.0;
pub const UNITS_TRAVELLED_PER_SOUND: u32 = 12;
pub const UNITS_TRAVELLED_PER_SOUND_RUNNING_DIVISOR: u32 = 2;
pub const PATH_COST_LIMIT: f32 = 1000.0;

// Give way
pub const MAX_GIVE_WAY_ATTEMPTS: u32 = 3;
pub const GIVE_WAY_WAIT_TICKS: u32 = TICKS_PER_SECOND / 2;
pub const GIVE_WAY_SNOOZE_TICKS: u32 = 60;

// Vision
pub const LOS_RANGE: i32 = 20;
pub const VISION_ARC_HALF_WIDTH: i32 = 13;
pub const LOS_BLOCK_SIZE: i32 = 8;
pub const LOS_CHECK_INTERVAL_TRACKING: u32 = TICKS_PER_SECOND / 4;
pub const HEIGHT_UNITS_PER_TILE: f32 = 40.0;

// Combat
pub const STUN_TICKS_PER_POINT: i32 = TICKS_PER_SECOND as i32;
pub const FATAL_WOUND_DAMAGE_STEP: i32 = 10;
pub const SMOKE_DAMAGE_POWER: i32 = 2;
pub const AIMING_LINGER_TICKS: u32 = TICKS_PER_SECOND / 3;
pub const LANDING_STUN_POWER: i32 = 9001;
pub const HEALING_PER_WOUND: i32 = 4;
pub const TILE_GROUND_TARGET_HEIGHT: f32 = 10.0 / HEIGHT_UNITS_PER_TILE;
pub const SHIELD_DOODAD: &str = "shield_flash";

// Time units
pub const TURN_COST: i32 = 1;
pub const THROW_COST: i32 = 12;
pub const STRAIGHT_MOVE_COST: i32 = 4;
pub const DIAGONAL_MOVE_COST: i32 = 6;
pub const BODY_CHANGE_COST: i32 = 2;
pub const PRONE_CHANGE_COST: i32 = 4;

// Convergence
pub const MAX_CONVERGENCE_PASSES: u32 = 256;
