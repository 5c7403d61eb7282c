//! Frame-count table implementing the animation service

use ahash::AHashMap;

use crate::battle::services::{AnimationPack, BodyPose, FiringPose, HandPose};
use crate::battle::states::{BodyState, HandState, MovementState};

/// Default frame counts with per-transition overrides
///
/// An override of 0 marks a transition as having no animation, which makes
/// the unit fall back to simpler poses or snap.
#[derive(Debug, Clone, Default)]
pub struct TableAnimationPack {
    pub body_frames: u32,
    pub hand_frames: u32,
    pub firing_frames: u32,
    body_overrides: AHashMap<(BodyState, BodyState, HandState, MovementState), u32>,
    hand_overrides: AHashMap<(HandState, HandState), u32>,
    body_state_overrides: AHashMap<BodyState, u32>,
}

impl TableAnimationPack {
    pub fn new(body_frames: u32, hand_frames: u32, firing_frames: u32) -> Self {
        Self {
            body_frames,
            hand_frames,
            firing_frames,
            ..Self::default()
        }
    }

    /// Every transition is instant
    pub fn instant() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn with_body_transition(
        mut self,
        from: BodyState,
        to: BodyState,
        hand: HandState,
        movement: MovementState,
        frames: u32,
    ) -> Self {
        self.body_overrides.insert((from, to, hand, movement), frames);
        self
    }

    /// Frame count for every transition ending in `to`
    pub fn with_body_target(mut self, to: BodyState, frames: u32) -> Self {
        self.body_state_overrides.insert(to, frames);
        self
    }

    pub fn with_hand_transition(mut self, from: HandState, to: HandState, frames: u32) -> Self {
        self.hand_overrides.insert((from, to), frames);
        self
    }
}

impl AnimationPack for TableAnimationPack {
    fn body_frames(&self, pose: &BodyPose<'_>) -> u32 {
        if let Some(frames) = self
            .body_overrides
            .get(&(pose.from, pose.to, pose.hand, pose.movement))
        {
            return *frames;
        }
        if let Some(frames) = self.body_state_overrides.get(&pose.to) {
            return *frames;
        }
        if pose.from == pose.to {
            0
        } else {
            self.body_frames
        }
    }

    fn hand_frames(&self, pose: &HandPose<'_>) -> u32 {
        if let Some(frames) = self.hand_overrides.get(&(pose.from, pose.to)) {
            return *frames;
        }
        if pose.from == pose.to {
            0
        } else {
            self.hand_frames
        }
    }

    fn firing_frames(&self, _pose: &FiringPose<'_>) -> u32 {
        self.firing_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::facing::Facing;

    fn body_pose(from: BodyState, to: BodyState, hand: HandState) -> BodyPose<'static> {
        BodyPose {
            item: None,
            from,
            to,
            hand,
            movement: MovementState::None,
            facing: Facing::North,
        }
    }

    #[test]
    fn test_defaults_and_identity() {
        let pack = TableAnimationPack::new(3, 2, 4);
        let kneel = body_pose(BodyState::Standing, BodyState::Kneeling, HandState::AtEase);
        assert_eq!(pack.body_frames(&kneel), 3);
        let same = body_pose(BodyState::Standing, BodyState::Standing, HandState::AtEase);
        assert_eq!(pack.body_frames(&same), 0);
    }

    #[test]
    fn test_override_beats_default() {
        let pack = TableAnimationPack::new(3, 2, 4)
            .with_body_transition(
                BodyState::Standing,
                BodyState::Prone,
                HandState::Aiming,
                MovementState::None,
                0,
            )
            .with_body_target(BodyState::Downed, 6);
        let aiming = body_pose(BodyState::Standing, BodyState::Prone, HandState::Aiming);
        assert_eq!(pack.body_frames(&aiming), 0);
        let at_ease = body_pose(BodyState::Standing, BodyState::Prone, HandState::AtEase);
        assert_eq!(pack.body_frames(&at_ease), 3);
        let downed = body_pose(BodyState::Kneeling, BodyState::Downed, HandState::AtEase);
        assert_eq!(pack.body_frames(&downed), 6);
    }
}
