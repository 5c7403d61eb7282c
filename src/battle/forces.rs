//! Per-faction squads

use serde::{Deserialize, Serialize};

use crate::core::types::UnitId;

pub const SQUAD_SIZE: usize = 6;
pub const MAX_SQUADS: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    /// Members in squad position order
    pub units: Vec<UnitId>,
}

impl Squad {
    pub fn is_full(&self) -> bool {
        self.units.len() >= SQUAD_SIZE
    }
}

/// All squads of one faction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forces {
    pub squads: Vec<Squad>,
}

impl Default for Forces {
    fn default() -> Self {
        Self {
            squads: vec![Squad::default(); MAX_SQUADS],
        }
    }
}

impl Forces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a unit into the first squad with room
    ///
    /// Returns (squad, position), or `None` when every squad is full.
    pub fn enlist(&mut self, unit: UnitId) -> Option<(usize, usize)> {
        let (number, squad) = self.squads.iter_mut().enumerate().find(|(_, s)| !s.is_full())?;
        squad.units.push(unit);
        Some((number, squad.units.len() - 1))
    }

    /// Remove a unit and close the gap
    ///
    /// Returns the members whose positions shifted, with their new positions.
    pub fn remove(&mut self, squad: usize, unit: UnitId) -> Vec<(UnitId, usize)> {
        let Some(squad) = self.squads.get_mut(squad) else {
            return Vec::new();
        };
        let Some(index) = squad.units.iter().position(|u| *u == unit) else {
            return Vec::new();
        };
        squad.units.remove(index);
        squad.units[index..]
            .iter()
            .enumerate()
            .map(|(offset, id)| (*id, index + offset))
            .collect()
    }

    pub fn squad_of(&self, unit: UnitId) -> Option<(usize, usize)> {
        self.squads.iter().enumerate().find_map(|(number, squad)| {
            squad
                .units
                .iter()
                .position(|u| *u == unit)
                .map(|position| (number, position))
        })
    }
}
