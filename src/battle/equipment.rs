//! Carried equipment: weapons, armor, shields and utility items

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::battle::damage::DamageModifierId;
use crate::battle::states::BodyPart;
use crate::core::types::ItemId;

/// Where an item is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentSlot {
    RightHand,
    LeftHand,
    Armor(BodyPart),
    Belt,
    Backpack,
}

impl EquipmentSlot {
    pub fn is_hand(self) -> bool {
        matches!(self, EquipmentSlot::RightHand | EquipmentSlot::LeftHand)
    }
}

/// Firing characteristics of a weapon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSpec {
    /// Ticks between shots
    pub fire_delay: u32,
    /// Maximum range in tiles
    pub range: f32,
    pub power: i32,
    pub clip_size: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemKind {
    Weapon(WeaponSpec),
    Armor { damage_modifier: DamageModifierId },
    Shield { damage_modifier: DamageModifierId },
    MediKit,
    Grenade { power: i32 },
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: ItemId,
    pub type_name: String,
    pub kind: ItemKind,
    pub slot: EquipmentSlot,
    /// Rounds in a weapon, charge in a shield, durability of armor
    pub ammo: i32,
    pub spare_clips: u32,
    #[serde(default)]
    weapon_delay: u32,
    #[serde(default)]
    firing: bool,
    #[serde(default)]
    ready_to_fire: bool,
}

impl Equipment {
    fn new(id: ItemId, type_name: impl Into<String>, kind: ItemKind, slot: EquipmentSlot, ammo: i32) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            kind,
            slot,
            ammo,
            spare_clips: 0,
            weapon_delay: 0,
            firing: false,
            ready_to_fire: false,
        }
    }

    pub fn weapon(id: ItemId, type_name: impl Into<String>, spec: WeaponSpec, slot: EquipmentSlot) -> Self {
        let clip = spec.clip_size;
        Self::new(id, type_name, ItemKind::Weapon(spec), slot, clip)
    }

    pub fn armor(id: ItemId, type_name: impl Into<String>, part: BodyPart, durability: i32, damage_modifier: DamageModifierId) -> Self {
        Self::new(id, type_name, ItemKind::Armor { damage_modifier }, EquipmentSlot::Armor(part), durability)
    }

    pub fn shield(id: ItemId, type_name: impl Into<String>, charge: i32, damage_modifier: DamageModifierId) -> Self {
        Self::new(id, type_name, ItemKind::Shield { damage_modifier }, EquipmentSlot::Belt, charge)
    }

    pub fn medikit(id: ItemId, slot: EquipmentSlot) -> Self {
        Self::new(id, "medikit", ItemKind::MediKit, slot, 0)
    }

    pub fn grenade(id: ItemId, type_name: impl Into<String>, power: i32, slot: EquipmentSlot) -> Self {
        Self::new(id, type_name, ItemKind::Grenade { power }, slot, 1)
    }

    pub fn general(id: ItemId, type_name: impl Into<String>, slot: EquipmentSlot) -> Self {
        Self::new(id, type_name, ItemKind::General, slot, 0)
    }

    pub fn with_spare_clips(mut self, clips: u32) -> Self {
        self.spare_clips = clips;
        self
    }

    pub fn weapon_spec(&self) -> Option<&WeaponSpec> {
        match &self.kind {
            ItemKind::Weapon(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn is_weapon(&self) -> bool {
        self.weapon_spec().is_some()
    }

    pub fn damage_modifier(&self) -> Option<&DamageModifierId> {
        match &self.kind {
            ItemKind::Armor { damage_modifier } | ItemKind::Shield { damage_modifier } => {
                Some(damage_modifier)
            }
            _ => None,
        }
    }

    pub fn needs_reload(&self) -> bool {
        self.is_weapon() && self.ammo <= 0
    }

    /// Swap in a spare clip. Returns false when none are left.
    pub fn load_ammo(&mut self) -> bool {
        let Some(clip) = self.weapon_spec().map(|s| s.clip_size) else {
            return false;
        };
        if self.spare_clips == 0 {
            return false;
        }
        self.spare_clips -= 1;
        self.ammo = clip;
        true
    }

    pub fn can_fire(&self) -> bool {
        self.is_weapon() && self.ammo > 0
    }

    pub fn in_range(&self, from: Vec3, to: Vec3) -> bool {
        self.weapon_spec().is_some_and(|s| from.distance(to) <= s.range)
    }

    pub fn is_firing(&self) -> bool {
        self.firing
    }

    pub fn is_ready_to_fire(&self) -> bool {
        self.firing && self.ready_to_fire
    }

    /// Begin the fire cycle; the first shot is ready after one delay
    pub fn start_firing(&mut self) {
        let Some(delay) = self.weapon_spec().map(|s| s.fire_delay) else {
            return;
        };
        self.firing = true;
        self.ready_to_fire = false;
        self.weapon_delay = delay;
    }

    pub fn stop_firing(&mut self) {
        self.firing = false;
        self.ready_to_fire = false;
        self.weapon_delay = 0;
    }

    pub fn update(&mut self, ticks: u32) {
        if self.firing && !self.ready_to_fire {
            self.weapon_delay = self.weapon_delay.saturating_sub(ticks);
            if self.weapon_delay == 0 {
                self.ready_to_fire = true;
            }
        }
    }

    /// Spend a round and restart the delay. Returns the shot's power.
    pub fn fire(&mut self) -> Option<i32> {
        if !self.is_ready_to_fire() || self.ammo <= 0 {
            return None;
        }
        let spec = self.weapon_spec()?;
        let (power, delay) = (spec.power, spec.fire_delay);
        self.ammo -= 1;
        self.ready_to_fire = false;
        self.weapon_delay = delay;
        Some(power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rifle() -> Equipment {
        Equipment::weapon(
            ItemId(1),
            "rifle",
            WeaponSpec {
                fire_delay: 10,
                range: 12.0,
                power: 20,
                clip_size: 2,
            },
            EquipmentSlot::RightHand,
        )
    }

    #[test]
    fn test_fire_cycle() {
        let mut gun = rifle();
        assert!(gun.fire().is_none());
        gun.start_firing();
        gun.update(9);
        assert!(!gun.is_ready_to_fire());
        gun.update(1);
        assert!(gun.is_ready_to_fire());
        assert_eq!(gun.fire(), Some(20));
        assert_eq!(gun.ammo, 1);
        assert!(!gun.is_ready_to_fire());
    }

    #[test]
    fn test_reload_uses_spare_clip() {
        let mut gun = rifle().with_spare_clips(1);
        gun.ammo = 0;
        assert!(gun.needs_reload());
        assert!(gun.load_ammo());
        assert_eq!(gun.ammo, 2);
        gun.ammo = 0;
        assert!(!gun.load_ammo());
        assert!(!gun.can_fire());
    }

    #[test]
    fn test_range() {
        let gun = rifle();
        assert!(gun.in_range(Vec3::ZERO, Vec3::new(12.0, 0.0, 0.0)));
        assert!(!gun.in_range(Vec3::ZERO, Vec3::new(12.5, 0.0, 0.0)));
    }
}
