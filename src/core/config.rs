//! Battle configuration
//!
//! Rule toggles for a single battle plus the seed that makes every roll in
//! it reproducible. Loaded from TOML or built from defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::battle::constants::{LOS_CHECK_INTERVAL_TRACKING, MAX_CONVERGENCE_PASSES};
use crate::core::error::{BattleError, Result};
use crate::core::types::BattleMode;

/// Configuration for one battle session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Turn-based or real-time rules
    ///
    /// Turn-based battles charge time units for every order and forbid
    /// firing both hands at once.
    pub mode: BattleMode,

    /// Seed for the battle RNG (damage, wounds, sample selection)
    pub seed: u64,

    /// Let an affordable throw order preempt a turn or stance change in progress
    pub allow_instant_throws: bool,

    /// Roll non-explosive damage in 0-200% instead of 50-150%
    pub ufo_damage_model: bool,

    /// Play the lift hum when a unit travels straight up or down
    pub gravlift_sounds: bool,

    /// Ticks between validity checks of a tracked target unit
    ///
    /// Lower values react faster to targets leaving range or dying.
    pub target_check_interval: u32,

    /// Upper bound on convergence passes in one unit update
    ///
    /// Every pass consumes budget, so the bound is only reached when an
    /// animation table reports inconsistent frame counts.
    pub max_convergence_passes: u32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            mode: BattleMode::RealTime,
            seed: 0,
            allow_instant_throws: false,
            ufo_damage_model: false,
            gravlift_sounds: true,
            target_check_interval: LOS_CHECK_INTERVAL_TRACKING,
            max_convergence_passes: MAX_CONVERGENCE_PASSES,
        }
    }
}

impl BattleConfig {
    /// Create config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate().map_err(BattleError::InvalidConfig)?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Validate configuration values are sensible
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.target_check_interval == 0 {
            return Err("target_check_interval must be at least one tick".into());
        }

        if self.max_convergence_passes < 2 {
            return Err(format!(
                "max_convergence_passes ({}) must allow at least two passes",
                self.max_convergence_passes
            ));
        }

        Ok(())
    }
}
