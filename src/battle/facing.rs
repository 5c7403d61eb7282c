//! Eight-way compass facing
//!
//! Indices run clockwise from north. North is -y, east is +x.

use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::types::{tile_of, TilePos};

/// Direction a unit faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Facing {
    pub const ALL: [Facing; 8] = [
        Facing::North,
        Facing::NorthEast,
        Facing::East,
        Facing::SouthEast,
        Facing::South,
        Facing::SouthWest,
        Facing::West,
        Facing::NorthWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Facing {
        Self::ALL[index % 8]
    }

    /// Unit tile offset for one step in this direction
    pub fn offset(self) -> IVec2 {
        match self {
            Facing::North => IVec2::new(0, -1),
            Facing::NorthEast => IVec2::new(1, -1),
            Facing::East => IVec2::new(1, 0),
            Facing::SouthEast => IVec2::new(1, 1),
            Facing::South => IVec2::new(0, 1),
            Facing::SouthWest => IVec2::new(-1, 1),
            Facing::West => IVec2::new(-1, 0),
            Facing::NorthWest => IVec2::new(-1, -1),
        }
    }

    /// Direction of an arbitrary offset, by sign only. `None` for zero.
    pub fn from_offset(offset: IVec2) -> Option<Facing> {
        let sign = offset.signum();
        Self::ALL.into_iter().find(|f| f.offset() == sign)
    }

    /// Facing from one tile toward another, ignoring height
    pub fn toward_tile(from: TilePos, to: TilePos) -> Option<Facing> {
        Self::from_offset((to - from).truncate())
    }

    /// Facing from one position toward another, by containing tile
    pub fn toward(from: Vec3, to: Vec3) -> Option<Facing> {
        Self::toward_tile(tile_of(from), tile_of(to))
    }

    pub fn clockwise(self) -> Facing {
        Self::from_index(self.index() + 1)
    }

    pub fn counter_clockwise(self) -> Facing {
        Self::from_index(self.index() + 7)
    }

    pub fn opposite(self) -> Facing {
        Self::from_index(self.index() + 4)
    }

    pub fn is_diagonal(self) -> bool {
        let o = self.offset();
        o.x != 0 && o.y != 0
    }

    /// Number of single steps on the shorter way round
    pub fn steps_to(self, target: Facing) -> u32 {
        let clockwise = (target.index() + 8 - self.index()) % 8;
        clockwise.min(8 - clockwise) as u32
    }

    /// One step toward `target` the shorter way; ties go clockwise
    pub fn step_towards(self, target: Facing) -> Facing {
        if self == target {
            return self;
        }
        let clockwise = (target.index() + 8 - self.index()) % 8;
        if clockwise <= 4 {
            self.clockwise()
        } else {
            self.counter_clockwise()
        }
    }

    /// Horizontal direction vector (not normalized on diagonals)
    pub fn to_vec3(self) -> Vec3 {
        let o = self.offset();
        Vec3::new(o.x as f32, o.y as f32, 0.0)
    }
}

/// Sidestep directions tried by a unit asked to give way, in order
///
/// Straight ahead first, then alternating clockwise and counter-clockwise
/// with growing angle, and straight back last.
pub fn give_way_fan(facing: Facing) -> [Facing; 8] {
    let mut fan = [facing; 8];
    let mut clockwise = facing;
    let mut counter = facing;
    for step in 0..3 {
        clockwise = clockwise.clockwise();
        counter = counter.counter_clockwise();
        fan[1 + step * 2] = clockwise;
        fan[2 + step * 2] = counter;
    }
    fan[7] = facing.opposite();
    fan
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn test_offsets_round_trip_through_index() {
        for (i, facing) in Facing::ALL.iter().enumerate() {
            assert_eq!(facing.index(), i);
            assert_eq!(Facing::from_offset(facing.offset()), Some(*facing));
        }
        assert_eq!(Facing::from_offset(IVec2::ZERO), None);
    }

    #[test]
    fn test_from_offset_uses_sign() {
        assert_eq!(Facing::from_offset(IVec2::new(5, -2)), Some(Facing::NorthEast));
        assert_eq!(Facing::from_offset(IVec2::new(0, 9)), Some(Facing::South));
    }

    #[test]
    fn test_toward_tile_ignores_height() {
        let from = IVec3::new(3, 3, 0);
        assert_eq!(Facing::toward_tile(from, IVec3::new(3, 3, 2)), None);
        assert_eq!(Facing::toward_tile(from, IVec3::new(2, 3, 1)), Some(Facing::West));
    }

    #[test]
    fn test_step_towards_takes_short_way() {
        assert_eq!(Facing::North.step_towards(Facing::West), Facing::NorthWest);
        assert_eq!(Facing::North.step_towards(Facing::East), Facing::NorthEast);
        // Opposite: clockwise wins the tie
        assert_eq!(Facing::North.step_towards(Facing::South), Facing::NorthEast);
        assert_eq!(Facing::East.step_towards(Facing::East), Facing::East);
    }

    #[test]
    fn test_steps_to() {
        assert_eq!(Facing::North.steps_to(Facing::South), 4);
        assert_eq!(Facing::North.steps_to(Facing::NorthWest), 1);
        assert_eq!(Facing::SouthWest.steps_to(Facing::SouthWest), 0);
    }

    #[test]
    fn test_give_way_fan_every_facing() {
        for facing in Facing::ALL {
            let fan = give_way_fan(facing);
            let i = facing.index();
            let expected = [
                i,
                i + 1,
                i + 7,
                i + 2,
                i + 6,
                i + 3,
                i + 5,
                i + 4,
            ]
            .map(Facing::from_index);
            assert_eq!(fan, expected, "fan for {:?}", facing);

            // Each direction exactly once
            let mut seen = [false; 8];
            for f in fan {
                assert!(!seen[f.index()]);
                seen[f.index()] = true;
            }
        }
    }
}
