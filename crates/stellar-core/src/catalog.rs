//! Static game-object definitions and balance constants.
//!
//! The catalog is built once at startup (see the `stellar-data` crate for
//! loading it from files) and shared read-only by every worker. Ids are
//! assigned by whoever builds the catalog; registration only checks that
//! they are unique and that requirements point at known entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, checked_pow, pow};
use crate::id::{BuildingTypeId, ResearchId, UnitTypeId};
use crate::resources::{ResourceKind, Resources};

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// A minimum building or research level needed before something can be
/// built, researched or produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    Building { building: BuildingTypeId, level: u32 },
    Research { research: ResearchId, level: u32 },
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Propulsion family of a ship; selects which drive research speeds it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveKind {
    Combustion,
    Impulse,
    Hyperspace,
}

/// What a unit can be used for beyond fighting and carrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitRole {
    Ship,
    Colonizer,
    Recycler,
    Probe,
    Defense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: UnitTypeId,
    pub name: String,
    pub role: UnitRole,
    pub cost: Resources,
    pub weapon: Fixed64,
    pub shield: Fixed64,
    /// Base speed; zero for defenses.
    pub speed: u32,
    pub drive: DriveKind,
    pub cargo: u64,
    /// Deuterium usage per flight at reference distance.
    pub fuel: u32,
    /// Shots-again table: against `target`, fire again with probability
    /// `(n - 1) / n`.
    pub rapid_fire: Vec<(UnitTypeId, u32)>,
    pub requirements: Vec<Requirement>,
}

impl UnitSpec {
    /// Structural integrity before armour technology.
    pub fn hull(&self) -> Fixed64 {
        self.cost.structural() / Fixed64::from_num(10)
    }

    pub fn is_ship(&self) -> bool {
        self.role != UnitRole::Defense
    }

    pub fn rapid_fire_against(&self, target: UnitTypeId) -> u32 {
        self.rapid_fire
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// Hourly output of a building at level L: `base * L * growth^L`.
/// A negative base is consumption (energy for mines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yield {
    pub resource: ResourceKind,
    pub base: Fixed64,
    pub growth: Fixed64,
}

impl Yield {
    pub fn at_level(&self, level: u32) -> Fixed64 {
        if level == 0 {
            return Fixed64::ZERO;
        }
        self.base
            .saturating_mul(Fixed64::from_num(level))
            .saturating_mul(pow(self.growth, level))
    }
}

/// Buildings with an effect beyond their yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingRole {
    Production,
    Storage(ResourceKind),
    RoboticsFactory,
    NaniteFactory,
    Shipyard,
    ResearchLab,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub id: BuildingTypeId,
    pub name: String,
    pub role: BuildingRole,
    /// Cost of level 1.
    pub cost: Resources,
    pub cost_growth: Fixed64,
    pub yields: Vec<Yield>,
    pub requirements: Vec<Requirement>,
}

impl BuildingSpec {
    /// Cost of reaching `level` from `level - 1`; `None` once it no
    /// longer fits a resource quantity.
    pub fn cost_at(&self, level: u32) -> Option<Resources> {
        grown_cost(&self.cost, self.cost_growth, level)
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// Research topics the engine reads levels of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchRole {
    Drive(DriveKind),
    Computer,
    Espionage,
    Weapons,
    Shielding,
    Armour,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSpec {
    pub id: ResearchId,
    pub name: String,
    pub role: ResearchRole,
    pub cost: Resources,
    pub cost_growth: Fixed64,
    pub requirements: Vec<Requirement>,
}

impl ResearchSpec {
    pub fn cost_at(&self, level: u32) -> Option<Resources> {
        grown_cost(&self.cost, self.cost_growth, level)
    }
}

fn grown_cost(base: &Resources, growth: Fixed64, level: u32) -> Option<Resources> {
    let factor = checked_pow(growth, level.saturating_sub(1))?;
    Some(base.checked_scaled(factor)?.floored())
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Distance and flight-time constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelRules {
    pub galaxy_step: u64,
    pub system_base: u64,
    pub system_step: u64,
    pub position_base: u64,
    pub position_step: u64,
    pub same_position: u64,
    /// Global multiplier on fleet speed.
    pub fleet_speed: u32,
    /// Percent speed bonus per level, by drive.
    pub combustion_bonus: u32,
    pub impulse_bonus: u32,
    pub hyperspace_bonus: u32,
    pub galaxies: u16,
    pub systems: u16,
    pub planet_positions: u8,
    /// Deep-space slot only reachable by expeditions.
    pub expedition_position: u8,
}

impl Default for TravelRules {
    fn default() -> Self {
        Self {
            galaxy_step: 20_000,
            system_base: 2_700,
            system_step: 95,
            position_base: 1_000,
            position_step: 5,
            same_position: 5,
            fleet_speed: 1,
            combustion_bonus: 10,
            impulse_bonus: 20,
            hyperspace_bonus: 30,
            galaxies: 9,
            systems: 499,
            planet_positions: 15,
            expedition_position: 16,
        }
    }
}

/// Battle constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatRules {
    pub max_rounds: u32,
    /// Below this fraction of full hull a hit unit may explode.
    pub explosion_threshold: Fixed64,
    /// Shots weaker than this fraction of the target's shield are absorbed.
    pub shield_bounce: Fixed64,
    /// Weapons / shielding / armour bonus per research level.
    pub tech_bonus: Fixed64,
    /// Share of destroyed ships' metal and crystal left as debris.
    pub debris_ratio: Fixed64,
    /// Share of destroyed defenses' metal and crystal left as debris.
    pub defense_debris_ratio: Fixed64,
    /// Debris totals at or below this are discarded.
    pub min_debris: Fixed64,
    /// Share of the defender's stock a winning attacker may carry off.
    pub loot_fraction: Fixed64,
    /// Chance that each destroyed defense unit is rebuilt after battle.
    pub defense_repair_chance: Fixed64,
    /// Largest unit count one side may bring; every unit is simulated
    /// individually.
    pub max_units_per_side: u64,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            max_rounds: 6,
            explosion_threshold: Fixed64::from_num(0.7),
            shield_bounce: Fixed64::from_num(0.01),
            tech_bonus: Fixed64::from_num(0.1),
            debris_ratio: Fixed64::from_num(0.3),
            defense_debris_ratio: Fixed64::ZERO,
            min_debris: Fixed64::ZERO,
            loot_fraction: Fixed64::from_num(0.5),
            defense_repair_chance: Fixed64::from_num(0.7),
            max_units_per_side: 2_000_000,
        }
    }
}

/// Information-level thresholds for espionage reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EspionageRules {
    pub resources: i64,
    pub fleet: i64,
    pub defense: i64,
    pub buildings: i64,
    pub research: i64,
}

impl Default for EspionageRules {
    fn default() -> Self {
        Self {
            resources: 1,
            fleet: 2,
            defense: 3,
            buildings: 5,
            research: 7,
        }
    }
}

/// Outcome weights and magnitudes for expeditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpeditionRules {
    pub weight_nothing: u32,
    pub weight_resources: u32,
    pub weight_ships: u32,
    pub weight_pirates: u32,
    /// Upper bound of a resource find, before the cargo cap.
    pub resource_find: Resources,
    /// Upper bound of found ships, as a fraction of each sent type.
    pub ship_find_ratio: Fixed64,
    /// Pirate fleet size as a fraction of each sent type.
    pub pirate_strength: Fixed64,
}

impl Default for ExpeditionRules {
    fn default() -> Self {
        Self {
            weight_nothing: 40,
            weight_resources: 30,
            weight_ships: 15,
            weight_pirates: 15,
            resource_find: Resources::new(40_000, 20_000, 10_000),
            ship_find_ratio: Fixed64::from_num(0.2),
            pirate_strength: Fixed64::from_num(0.5),
        }
    }
}

/// Every tunable number of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Multiplier on production and build speed.
    pub universe_speed: u32,
    /// Hourly income every planet receives regardless of buildings.
    pub base_income: Resources,
    /// Storage capacity with no storage building.
    pub storage_base: Fixed64,
    pub storage_growth: Fixed64,
    pub base_fleet_slots: u32,
    pub queue_limit: usize,
    pub max_planets: u32,
    pub planet_fields: u32,
    /// Whether the running head of a queue may be cancelled when it is the
    /// only item.
    pub allow_head_cancel: bool,
    pub travel: TravelRules,
    pub combat: CombatRules,
    pub espionage: EspionageRules,
    pub expedition: ExpeditionRules,
}

impl Default for Balance {
    fn default() -> Self {
        Self {
            universe_speed: 1,
            base_income: Resources::new(30, 15, 0),
            storage_base: Fixed64::from_num(10_000),
            storage_growth: Fixed64::from_num(1.5),
            base_fleet_slots: 1,
            queue_limit: 5,
            max_planets: 9,
            planet_fields: 163,
            allow_head_cancel: true,
            travel: TravelRules::default(),
            combat: CombatRules::default(),
            espionage: EspionageRules::default(),
            expedition: ExpeditionRules::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unit type not found: {0:?}")]
    UnknownUnit(UnitTypeId),
    #[error("building type not found: {0:?}")]
    UnknownBuilding(BuildingTypeId),
    #[error("research not found: {0:?}")]
    UnknownResearch(ResearchId),
    #[error("duplicate unit id: {0:?}")]
    DuplicateUnit(UnitTypeId),
    #[error("duplicate building id: {0:?}")]
    DuplicateBuilding(BuildingTypeId),
    #[error("duplicate research id: {0:?}")]
    DuplicateResearch(ResearchId),
    #[error("requirement {0:?} references an unknown entry")]
    DanglingRequirement(Requirement),
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Read-only registry of units, buildings, research and balance constants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    units: BTreeMap<UnitTypeId, UnitSpec>,
    buildings: BTreeMap<BuildingTypeId, BuildingSpec>,
    research: BTreeMap<ResearchId, ResearchSpec>,
    pub balance: Balance,
}

impl Catalog {
    pub fn new(balance: Balance) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    // -- Registration --

    pub fn register_building(&mut self, spec: BuildingSpec) -> Result<BuildingTypeId, CatalogError> {
        let id = spec.id;
        if self.buildings.contains_key(&id) {
            return Err(CatalogError::DuplicateBuilding(id));
        }
        self.check_requirements(&spec.requirements)?;
        self.buildings.insert(id, spec);
        Ok(id)
    }

    pub fn register_research(&mut self, spec: ResearchSpec) -> Result<ResearchId, CatalogError> {
        let id = spec.id;
        if self.research.contains_key(&id) {
            return Err(CatalogError::DuplicateResearch(id));
        }
        self.check_requirements(&spec.requirements)?;
        self.research.insert(id, spec);
        Ok(id)
    }

    /// Register a unit. Rapid-fire targets may reference units registered
    /// later, so only requirements are checked here.
    pub fn register_unit(&mut self, spec: UnitSpec) -> Result<UnitTypeId, CatalogError> {
        let id = spec.id;
        if self.units.contains_key(&id) {
            return Err(CatalogError::DuplicateUnit(id));
        }
        self.check_requirements(&spec.requirements)?;
        self.units.insert(id, spec);
        Ok(id)
    }

    fn check_requirements(&self, reqs: &[Requirement]) -> Result<(), CatalogError> {
        for req in reqs {
            let known = match req {
                Requirement::Building { building, .. } => self.buildings.contains_key(building),
                Requirement::Research { research, .. } => self.research.contains_key(research),
            };
            if !known {
                return Err(CatalogError::DanglingRequirement(*req));
            }
        }
        Ok(())
    }

    // -- Lookup --

    pub fn unit(&self, id: UnitTypeId) -> Result<&UnitSpec, CatalogError> {
        self.units.get(&id).ok_or(CatalogError::UnknownUnit(id))
    }

    pub fn building(&self, id: BuildingTypeId) -> Result<&BuildingSpec, CatalogError> {
        self.buildings.get(&id).ok_or(CatalogError::UnknownBuilding(id))
    }

    pub fn research(&self, id: ResearchId) -> Result<&ResearchSpec, CatalogError> {
        self.research.get(&id).ok_or(CatalogError::UnknownResearch(id))
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitSpec> {
        self.units.values()
    }

    pub fn buildings(&self) -> impl Iterator<Item = &BuildingSpec> {
        self.buildings.values()
    }

    pub fn research_topics(&self) -> impl Iterator<Item = &ResearchSpec> {
        self.research.values()
    }

    /// First building with the given role, if any.
    pub fn building_with_role(&self, role: BuildingRole) -> Option<&BuildingSpec> {
        self.buildings.values().find(|b| b.role == role)
    }

    /// First research topic with the given role, if any.
    pub fn research_with_role(&self, role: ResearchRole) -> Option<&ResearchSpec> {
        self.research.values().find(|r| r.role == role)
    }

    /// Level of the building with `role` in `levels`, 0 if absent.
    pub fn building_level(&self, levels: &BTreeMap<BuildingTypeId, u32>, role: BuildingRole) -> u32 {
        self.building_with_role(role)
            .and_then(|b| levels.get(&b.id).copied())
            .unwrap_or(0)
    }

    /// Level of the research with `role` in `levels`, 0 if absent.
    pub fn research_level(&self, levels: &BTreeMap<ResearchId, u32>, role: ResearchRole) -> u32 {
        self.research_with_role(role)
            .and_then(|r| levels.get(&r.id).copied())
            .unwrap_or(0)
    }

    /// Check requirements against current levels. Returns the first unmet
    /// requirement.
    pub fn requirements_met(
        &self,
        reqs: &[Requirement],
        buildings: &BTreeMap<BuildingTypeId, u32>,
        research: &BTreeMap<ResearchId, u32>,
    ) -> Result<(), Requirement> {
        for req in reqs {
            let have = match req {
                Requirement::Building { building, level } => {
                    buildings.get(building).copied().unwrap_or(0) >= *level
                }
                Requirement::Research { research: r, level } => {
                    research.get(r).copied().unwrap_or(0) >= *level
                }
            };
            if !have {
                return Err(*req);
            }
        }
        Ok(())
    }
}
