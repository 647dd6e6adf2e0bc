//! Serde data file structs for game content definitions.
//!
//! These structs define the on-disk format for buildings, research, units
//! and balance constants. They are deserialized from RON, JSON, or TOML
//! data files and then resolved into catalog types by the loader.
//! Cross-references (requirements, rapid fire) are written as names.

use serde::Deserialize;

// ===========================================================================
// Shared
// ===========================================================================

/// A metal / crystal / deuterium amount. Missing fields are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CostData {
    pub metal: u32,
    pub crystal: u32,
    pub deuterium: u32,
}

/// `("name", level)`: a building or research topic at a minimum level.
pub type RequirementData = (String, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceData {
    Metal,
    Crystal,
    Deuterium,
    Energy,
}

// ===========================================================================
// Buildings
// ===========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingRoleData {
    #[default]
    Production,
    MetalStorage,
    CrystalStorage,
    DeuteriumTank,
    RoboticsFactory,
    NaniteFactory,
    Shipyard,
    ResearchLab,
    Other,
}

/// Hourly output `base * L * growth^L`; negative base is consumption.
#[derive(Debug, Clone, Deserialize)]
pub struct YieldData {
    pub resource: ResourceData,
    pub base: f64,
    #[serde(default = "default_yield_growth")]
    pub growth: f64,
}

fn default_yield_growth() -> f64 {
    1.1
}

fn default_cost_growth() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildingData {
    pub name: String,
    #[serde(default)]
    pub role: BuildingRoleData,
    pub cost: CostData,
    #[serde(default = "default_cost_growth")]
    pub cost_growth: f64,
    #[serde(default)]
    pub yields: Vec<YieldData>,
    #[serde(default)]
    pub requires: Vec<RequirementData>,
}

// ===========================================================================
// Research
// ===========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchRoleData {
    CombustionDrive,
    ImpulseDrive,
    HyperspaceDrive,
    Computer,
    Espionage,
    Weapons,
    Shielding,
    Armour,
    #[default]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchData {
    pub name: String,
    #[serde(default)]
    pub role: ResearchRoleData,
    pub cost: CostData,
    #[serde(default = "default_cost_growth")]
    pub cost_growth: f64,
    #[serde(default)]
    pub requires: Vec<RequirementData>,
}

// ===========================================================================
// Units
// ===========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitRoleData {
    #[default]
    Ship,
    Colonizer,
    Recycler,
    Probe,
    Defense,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveData {
    #[default]
    Combustion,
    Impulse,
    Hyperspace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitData {
    pub name: String,
    #[serde(default)]
    pub role: UnitRoleData,
    pub cost: CostData,
    pub weapon: f64,
    pub shield: f64,
    /// Zero for defenses.
    #[serde(default)]
    pub speed: u32,
    #[serde(default)]
    pub drive: DriveData,
    #[serde(default)]
    pub cargo: u64,
    #[serde(default)]
    pub fuel: u32,
    /// `("target unit", n)` pairs.
    #[serde(default)]
    pub rapid_fire: Vec<(String, u32)>,
    #[serde(default)]
    pub requires: Vec<RequirementData>,
}

// ===========================================================================
// Balance
// ===========================================================================

/// Overrides of the default balance. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BalanceData {
    pub universe_speed: Option<u32>,
    pub base_income: Option<CostData>,
    pub storage_base: Option<f64>,
    pub storage_growth: Option<f64>,
    pub base_fleet_slots: Option<u32>,
    pub queue_limit: Option<usize>,
    pub max_planets: Option<u32>,
    pub planet_fields: Option<u32>,
    pub allow_head_cancel: Option<bool>,
    pub travel: Option<stellar_core::catalog::TravelRules>,
    pub combat: Option<CombatData>,
    pub espionage: Option<stellar_core::catalog::EspionageRules>,
    pub expedition: Option<ExpeditionData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CombatData {
    pub max_rounds: Option<u32>,
    pub explosion_threshold: Option<f64>,
    pub shield_bounce: Option<f64>,
    pub tech_bonus: Option<f64>,
    pub debris_ratio: Option<f64>,
    pub defense_debris_ratio: Option<f64>,
    pub min_debris: Option<f64>,
    pub loot_fraction: Option<f64>,
    pub defense_repair_chance: Option<f64>,
    pub max_units_per_side: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpeditionData {
    pub weight_nothing: Option<u32>,
    pub weight_resources: Option<u32>,
    pub weight_ships: Option<u32>,
    pub weight_pirates: Option<u32>,
    pub resource_find: Option<CostData>,
    pub ship_find_ratio: Option<f64>,
    pub pirate_strength: Option<f64>,
}

// ===========================================================================
// Tests
// ===========================================================================
