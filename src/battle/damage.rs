//! Damage types, modifier tables and damage rolls

use ahash::AHashMap;
use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::battle::facing::Facing;
use crate::battle::states::BodyPart;

/// Key into a damage type's modifier table
///
/// Armor, shields and bare agent bodies each name the modifier that scales
/// incoming damage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DamageModifierId(pub String);

impl DamageModifierId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// How a damage type interacts with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DamageEffect {
    #[default]
    Normal,
    Smoke,
    Fire,
    Stun,
    Gas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageType {
    pub name: String,
    pub effect: DamageEffect,
    pub explosive: bool,
    pub ignore_shield: bool,
    /// Percent of damage applied per modifier; absent modifiers apply 100%
    #[serde(default)]
    pub modifiers: AHashMap<DamageModifierId, i32>,
}

impl DamageType {
    pub fn new(name: impl Into<String>, effect: DamageEffect) -> Self {
        Self {
            name: name.into(),
            effect,
            explosive: false,
            ignore_shield: false,
            modifiers: AHashMap::new(),
        }
    }

    pub fn kinetic() -> Self {
        Self::new("kinetic", DamageEffect::Normal)
    }

    pub fn high_explosive() -> Self {
        Self {
            explosive: true,
            ..Self::new("high_explosive", DamageEffect::Normal)
        }
    }

    pub fn incendiary() -> Self {
        Self::new("incendiary", DamageEffect::Fire)
    }

    pub fn smoke() -> Self {
        Self::new("smoke", DamageEffect::Smoke)
    }

    pub fn stun() -> Self {
        Self::new("stun", DamageEffect::Stun)
    }

    pub fn toxic_gas() -> Self {
        Self::new("toxic_gas", DamageEffect::Gas)
    }

    pub fn with_modifier(mut self, modifier: DamageModifierId, percent: i32) -> Self {
        self.modifiers.insert(modifier, percent);
        self
    }

    /// Scale damage by the modifier's percentage
    pub fn deal_damage(&self, damage: i32, modifier: &DamageModifierId) -> i32 {
        let percent = self.modifiers.get(modifier).copied().unwrap_or(100);
        damage * percent / 100
    }

    pub fn ignores_armor_value(&self) -> bool {
        matches!(self.effect, DamageEffect::Smoke | DamageEffect::Gas)
    }

    /// Smoke, fire, stun and gas leave armor intact
    pub fn deals_armor_damage(&self) -> bool {
        self.effect == DamageEffect::Normal
    }

    pub fn deals_fatal_wounds(&self) -> bool {
        self.effect == DamageEffect::Normal
    }

    pub fn deals_stun_damage(&self) -> bool {
        matches!(self.effect, DamageEffect::Stun | DamageEffect::Smoke)
    }

    /// Inhaled damage always lands on the head
    pub fn always_impacts_head(&self) -> bool {
        matches!(self.effect, DamageEffect::Smoke | DamageEffect::Gas)
    }

    /// Solid hits that make an impact sound
    pub fn does_impact_damage(&self) -> bool {
        self.effect == DamageEffect::Normal && !self.explosive
    }
}

/// Roll 50% to 150% of `power`
pub fn roll_damage_50_150(rng: &mut impl Rng, power: i32) -> i32 {
    if power <= 0 {
        return 0;
    }
    rng.gen_range(power * 50..=power * 150) / 100
}

/// Roll 0% to 200% of `power`
pub fn roll_damage_0_200(rng: &mut impl Rng, power: i32) -> i32 {
    if power <= 0 {
        return 0;
    }
    rng.gen_range(0..=power * 200) / 100
}

/// Hit location from impact height and direction
///
/// `altitude` is the impact height as a fraction of body height. Hits high
/// on the body strike the head, low ones the legs. Otherwise the angle
/// between the facing and the reversed projectile direction picks an arm
/// (side hits) or the torso (front and back).
pub fn body_part_hit(
    facing: Facing,
    altitude: f32,
    direction: Vec3,
    always_head: bool,
) -> BodyPart {
    if always_head || altitude > 0.75 {
        return BodyPart::Helmet;
    }
    if altitude < 0.25 {
        return BodyPart::Legs;
    }

    let incoming = -Vec3::new(direction.x, direction.y, 0.0);
    let facing_vec = facing.to_vec3();
    if incoming.length_squared() == 0.0 {
        return BodyPart::Body;
    }
    let angle = incoming.y.atan2(incoming.x) - facing_vec.y.atan2(facing_vec.x);
    let mut degrees = angle.to_degrees();
    while degrees > 180.0 {
        degrees -= 360.0;
    }
    while degrees <= -180.0 {
        degrees += 360.0;
    }

    if (45.0..=135.0).contains(&degrees) {
        BodyPart::RightArm
    } else if (-135.0..=-45.0).contains(&degrees) {
        BodyPart::LeftArm
    } else {
        BodyPart::Body
    }
}
