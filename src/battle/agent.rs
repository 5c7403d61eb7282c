//! The person behind a battle unit: stats, body type, gear and voice

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::battle::damage::DamageModifierId;
use crate::battle::equipment::{Equipment, EquipmentSlot, ItemKind};
use crate::battle::states::{BodyPart, BodyState, MovementState};
use crate::core::types::ItemId;

/// Vital statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub health: i32,
    pub time_units: i32,
    pub speed: i32,
}

impl AgentStats {
    /// Movement units covered per tick at walking pace
    pub fn actual_speed(&self) -> u32 {
        ((self.speed + 4) / 8).max(1) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Body proportions per pose, in height units (40 per tile)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyType {
    /// Occupies a 2x2x2 block of tiles
    pub large: bool,
    pub height: [i32; BodyState::COUNT],
    pub muzzle_z: [i32; BodyState::COUNT],
}

impl BodyType {
    pub fn humanoid() -> Self {
        // Standing, Flying, Kneeling, Prone, Jumping, Throwing, Downed, Dead
        Self {
            large: false,
            height: [34, 34, 26, 8, 34, 34, 6, 6],
            muzzle_z: [28, 28, 20, 6, 28, 28, 4, 4],
        }
    }

    pub fn height(&self, state: BodyState) -> i32 {
        self.height[state.index()]
    }

    pub fn muzzle_z(&self, state: BodyState) -> i32 {
        self.muzzle_z[state.index()]
    }
}

/// Samples keyed by the speaker's gender
pub type GenderedSamples = BTreeMap<Gender, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSounds {
    pub die: GenderedSamples,
    pub fatal_wound: GenderedSamples,
    pub damage: GenderedSamples,
    /// Overrides the terrain's footsteps when present
    pub walk: Vec<String>,
    pub gravlift: Option<String>,
}

/// Species template shared by many agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentType {
    pub name: String,
    pub body: BodyType,
    pub allowed_body_states: Vec<BodyState>,
    pub allowed_movement_states: Vec<MovementState>,
    /// Natural armor per part, used when nothing is worn there
    pub armor: BTreeMap<BodyPart, i32>,
    pub damage_modifier: DamageModifierId,
    pub sounds: AgentSounds,
}

impl AgentType {
    pub fn human() -> Self {
        Self {
            name: "human".into(),
            body: BodyType::humanoid(),
            allowed_body_states: vec![
                BodyState::Standing,
                BodyState::Kneeling,
                BodyState::Prone,
                BodyState::Throwing,
                BodyState::Downed,
                BodyState::Dead,
            ],
            allowed_movement_states: vec![
                MovementState::None,
                MovementState::Normal,
                MovementState::Running,
                MovementState::Strafing,
            ],
            armor: BTreeMap::new(),
            damage_modifier: DamageModifierId::new("human"),
            sounds: AgentSounds::default(),
        }
    }

    pub fn armor_value(&self, part: BodyPart) -> i32 {
        self.armor.get(&part).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub agent_type: AgentType,
    pub gender: Gender,
    /// Maximum values
    pub current_stats: AgentStats,
    /// Values after wounds, stun and spending
    pub modified_stats: AgentStats,
    pub equipment: Vec<Equipment>,
}

impl Agent {
    pub fn new(name: impl Into<String>, agent_type: AgentType, stats: AgentStats) -> Self {
        Self {
            name: name.into(),
            agent_type,
            gender: Gender::default(),
            current_stats: stats,
            modified_stats: stats,
            equipment: Vec::new(),
        }
    }

    pub fn with_equipment(mut self, item: Equipment) -> Self {
        self.equipment.push(item);
        self
    }

    pub fn is_body_state_allowed(&self, state: BodyState) -> bool {
        self.agent_type.allowed_body_states.contains(&state)
    }

    pub fn is_movement_state_allowed(&self, state: MovementState) -> bool {
        self.agent_type.allowed_movement_states.contains(&state)
    }

    pub fn is_large(&self) -> bool {
        self.agent_type.body.large
    }

    pub fn item(&self, id: ItemId) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.id == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Equipment> {
        self.equipment.iter_mut().find(|e| e.id == id)
    }

    pub fn item_in_slot(&self, slot: EquipmentSlot) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.slot == slot)
    }

    pub fn item_in_slot_mut(&mut self, slot: EquipmentSlot) -> Option<&mut Equipment> {
        self.equipment.iter_mut().find(|e| e.slot == slot)
    }

    pub fn first_shield_mut(&mut self) -> Option<&mut Equipment> {
        self.equipment
            .iter_mut()
            .find(|e| matches!(e.kind, ItemKind::Shield { .. }))
    }

    pub fn armor(&self, part: BodyPart) -> Option<&Equipment> {
        self.item_in_slot(EquipmentSlot::Armor(part))
    }

    pub fn armor_mut(&mut self, part: BodyPart) -> Option<&mut Equipment> {
        self.item_in_slot_mut(EquipmentSlot::Armor(part))
    }

    pub fn remove_equipment(&mut self, id: ItemId) -> Option<Equipment> {
        let index = self.equipment.iter().position(|e| e.id == id)?;
        Some(self.equipment.remove(index))
    }

    pub fn has_medikit_in_hands(&self) -> bool {
        self.equipment
            .iter()
            .any(|e| e.slot.is_hand() && matches!(e.kind, ItemKind::MediKit))
    }

    /// Item the unit visibly holds
    ///
    /// `preferred` wins while it is still in a hand. Otherwise weapons beat
    /// other items and the right hand beats the left.
    pub fn dominant_item_in_hands(&self, preferred: Option<ItemId>) -> Option<ItemId> {
        if let Some(item) = preferred.and_then(|id| self.item(id)) {
            if item.slot.is_hand() {
                return Some(item.id);
            }
        }
        let right = self.item_in_slot(EquipmentSlot::RightHand);
        let left = self.item_in_slot(EquipmentSlot::LeftHand);
        [right, left]
            .into_iter()
            .flatten()
            .find(|e| e.is_weapon())
            .or(right)
            .or(left)
            .map(|e| e.id)
    }
}
