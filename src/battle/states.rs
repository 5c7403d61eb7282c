//! Pose, movement and combat status enums for battle units

use serde::{Deserialize, Serialize};

/// Whole-body pose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BodyState {
    #[default]
    Standing,
    Flying,
    Kneeling,
    Prone,
    Jumping,
    Throwing,
    Downed,
    Dead,
}

impl BodyState {
    pub const COUNT: usize = 8;

    pub const ALL: [BodyState; Self::COUNT] = [
        BodyState::Standing,
        BodyState::Flying,
        BodyState::Kneeling,
        BodyState::Prone,
        BodyState::Jumping,
        BodyState::Throwing,
        BodyState::Downed,
        BodyState::Dead,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Poses a unit can walk in
    pub fn allows_movement(self) -> bool {
        matches!(self, BodyState::Standing | BodyState::Flying | BodyState::Prone)
    }
}

/// Arm pose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HandState {
    #[default]
    AtEase,
    Aiming,
    Firing,
}

/// Gait of a moving unit. `None` means standing still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementState {
    #[default]
    None,
    Normal,
    Running,
    Strafing,
}

/// Which hands are engaged in an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeaponStatus {
    #[default]
    NotFiring,
    FiringLeftHand,
    FiringRightHand,
    FiringBothHands,
}

/// What the current attack is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetingMode {
    #[default]
    NoTarget,
    Unit,
    TileCenter,
    TileGround,
}

/// Hit location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BodyPart {
    #[default]
    Body,
    Legs,
    Helmet,
    LeftArm,
    RightArm,
}

impl BodyPart {
    pub const ALL: [BodyPart; 5] = [
        BodyPart::Body,
        BodyPart::Legs,
        BodyPart::Helmet,
        BodyPart::LeftArm,
        BodyPart::RightArm,
    ];
}

/// Standing order: kneel whenever idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KneelingMode {
    #[default]
    None,
    Kneeling,
}

/// Standing order: preferred gait and pose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementMode {
    Prone,
    #[default]
    Walking,
    Running,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_state_index_matches_table() {
        for (i, state) in BodyState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn test_kneeling_blocks_movement() {
        assert!(!BodyState::Kneeling.allows_movement());
        assert!(!BodyState::Downed.allows_movement());
        assert!(BodyState::Prone.allows_movement());
    }
}
