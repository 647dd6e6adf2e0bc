//! Resolution pipeline: reads data files, resolves names, builds a catalog.
//!
//! Ids are assigned in file order: the first building is
//! `BuildingTypeId(0)`, the first research topic `ResearchId(0)`, the first
//! unit `UnitTypeId(0)`. Buildings and research share one namespace so a
//! requirement names its target unambiguously.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stellar_core::catalog::{
    Balance, BuildingRole, BuildingSpec, Catalog, DriveKind, Requirement, ResearchRole, ResearchSpec,
    UnitRole, UnitSpec, Yield,
};
use stellar_core::fixed::{Fixed64, f64_to_fixed64};
use stellar_core::id::{BuildingTypeId, ResearchId, UnitTypeId};
use stellar_core::resources::{ResourceKind, Resources};

use crate::loader::{
    DataLoadError, assign_name, deserialize_file, deserialize_list, find_data_file, require_data_file,
    resolve_name,
};
use crate::schema::*;

// ===========================================================================
// Raw game data
// ===========================================================================

/// Parsed but unresolved data files.
#[derive(Debug, Clone)]
pub struct GameData {
    pub buildings: Vec<BuildingData>,
    pub research: Vec<ResearchData>,
    pub units: Vec<UnitData>,
    pub balance: BalanceData,
    pub sources: Sources,
}

/// Where each list came from, for error messages.
#[derive(Debug, Clone)]
pub struct Sources {
    pub buildings: PathBuf,
    pub research: PathBuf,
    pub units: PathBuf,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            buildings: PathBuf::from("buildings"),
            research: PathBuf::from("research"),
            units: PathBuf::from("units"),
        }
    }
}

/// Read `buildings`, `research` and `units` (required) and `balance`
/// (optional) from `dir`.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let sources = Sources {
        buildings: require_data_file(dir, "buildings")?,
        research: require_data_file(dir, "research")?,
        units: require_data_file(dir, "units")?,
    };
    let buildings = deserialize_list(&sources.buildings, "buildings")?;
    let research = deserialize_list(&sources.research, "research")?;
    let units = deserialize_list(&sources.units, "units")?;
    let balance = match find_data_file(dir, "balance")? {
        Some(path) => deserialize_file(&path)?,
        None => BalanceData::default(),
    };
    Ok(GameData {
        buildings,
        research,
        units,
        balance,
        sources,
    })
}

/// Load and resolve a catalog directory in one step.
pub fn load_catalog(dir: &Path) -> Result<Catalog, DataLoadError> {
    let data = load_game_data(dir)?;
    let catalog = build_catalog(&data)?;
    tracing::info!(
        dir = %dir.display(),
        buildings = data.buildings.len(),
        research = data.research.len(),
        units = data.units.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

// ===========================================================================
// Resolution
// ===========================================================================

#[derive(Debug, Clone, Copy)]
enum Target {
    Building(BuildingTypeId),
    Research(ResearchId),
}

/// A building or research spec waiting for its requirements to register.
enum Pending {
    Building(BuildingSpec),
    Research(ResearchSpec),
}

impl Pending {
    fn name(&self) -> &str {
        match self {
            Pending::Building(b) => &b.name,
            Pending::Research(r) => &r.name,
        }
    }

    fn requirements(&self) -> &[Requirement] {
        match self {
            Pending::Building(b) => &b.requirements,
            Pending::Research(r) => &r.requirements,
        }
    }
}

fn cost(c: &CostData) -> Resources {
    Resources::new(c.metal, c.crystal, c.deuterium)
}

fn number(name: &str, field: &'static str, v: f64) -> Result<Fixed64, DataLoadError> {
    if !v.is_finite() || v.abs() > f64::from(i32::MAX) {
        return Err(DataLoadError::InvalidValue {
            name: name.to_string(),
            field,
            detail: format!("{v} is not representable"),
        });
    }
    Ok(f64_to_fixed64(v))
}

fn growth(name: &str, v: f64) -> Result<Fixed64, DataLoadError> {
    if v <= 0.0 {
        return Err(DataLoadError::InvalidValue {
            name: name.to_string(),
            field: "cost_growth",
            detail: format!("{v} must be positive"),
        });
    }
    number(name, "cost_growth", v)
}

fn resource(r: ResourceData) -> ResourceKind {
    match r {
        ResourceData::Metal => ResourceKind::Metal,
        ResourceData::Crystal => ResourceKind::Crystal,
        ResourceData::Deuterium => ResourceKind::Deuterium,
        ResourceData::Energy => ResourceKind::Energy,
    }
}

fn building_role(r: BuildingRoleData) -> BuildingRole {
    match r {
        BuildingRoleData::Production => BuildingRole::Production,
        BuildingRoleData::MetalStorage => BuildingRole::Storage(ResourceKind::Metal),
        BuildingRoleData::CrystalStorage => BuildingRole::Storage(ResourceKind::Crystal),
        BuildingRoleData::DeuteriumTank => BuildingRole::Storage(ResourceKind::Deuterium),
        BuildingRoleData::RoboticsFactory => BuildingRole::RoboticsFactory,
        BuildingRoleData::NaniteFactory => BuildingRole::NaniteFactory,
        BuildingRoleData::Shipyard => BuildingRole::Shipyard,
        BuildingRoleData::ResearchLab => BuildingRole::ResearchLab,
        BuildingRoleData::Other => BuildingRole::Other,
    }
}

fn research_role(r: ResearchRoleData) -> ResearchRole {
    match r {
        ResearchRoleData::CombustionDrive => ResearchRole::Drive(DriveKind::Combustion),
        ResearchRoleData::ImpulseDrive => ResearchRole::Drive(DriveKind::Impulse),
        ResearchRoleData::HyperspaceDrive => ResearchRole::Drive(DriveKind::Hyperspace),
        ResearchRoleData::Computer => ResearchRole::Computer,
        ResearchRoleData::Espionage => ResearchRole::Espionage,
        ResearchRoleData::Weapons => ResearchRole::Weapons,
        ResearchRoleData::Shielding => ResearchRole::Shielding,
        ResearchRoleData::Armour => ResearchRole::Armour,
        ResearchRoleData::Other => ResearchRole::Other,
    }
}

fn unit_role(r: UnitRoleData) -> UnitRole {
    match r {
        UnitRoleData::Ship => UnitRole::Ship,
        UnitRoleData::Colonizer => UnitRole::Colonizer,
        UnitRoleData::Recycler => UnitRole::Recycler,
        UnitRoleData::Probe => UnitRole::Probe,
        UnitRoleData::Defense => UnitRole::Defense,
    }
}

fn drive(d: DriveData) -> DriveKind {
    match d {
        DriveData::Combustion => DriveKind::Combustion,
        DriveData::Impulse => DriveKind::Impulse,
        DriveData::Hyperspace => DriveKind::Hyperspace,
    }
}

fn requirements(
    reqs: &[RequirementData],
    targets: &HashMap<String, Target>,
    file: &Path,
) -> Result<Vec<Requirement>, DataLoadError> {
    reqs.iter()
        .map(|(name, level)| {
            Ok(match resolve_name(targets, name, file, "building or research")? {
                Target::Building(building) => Requirement::Building {
                    building: *building,
                    level: *level,
                },
                Target::Research(research) => Requirement::Research {
                    research: *research,
                    level: *level,
                },
            })
        })
        .collect()
}

/// Resolve every name in `data` and register the result in a catalog.
pub fn build_catalog(data: &GameData) -> Result<Catalog, DataLoadError> {
    let src = &data.sources;

    // Pass 1: assign ids.
    let mut targets: HashMap<String, Target> = HashMap::new();
    for (i, b) in data.buildings.iter().enumerate() {
        assign_name(&mut targets, &b.name, Target::Building(BuildingTypeId(i as u32)), &src.buildings)?;
    }
    for (i, r) in data.research.iter().enumerate() {
        assign_name(&mut targets, &r.name, Target::Research(ResearchId(i as u32)), &src.research)?;
    }
    let mut unit_ids: HashMap<String, UnitTypeId> = HashMap::new();
    for (i, u) in data.units.iter().enumerate() {
        assign_name(&mut unit_ids, &u.name, UnitTypeId(i as u32), &src.units)?;
    }

    // Pass 2: resolve buildings and research.
    let mut pending = Vec::with_capacity(data.buildings.len() + data.research.len());
    for (i, b) in data.buildings.iter().enumerate() {
        let yields = b
            .yields
            .iter()
            .map(|y| {
                Ok(Yield {
                    resource: resource(y.resource),
                    base: number(&b.name, "yields.base", y.base)?,
                    growth: number(&b.name, "yields.growth", y.growth)?,
                })
            })
            .collect::<Result<Vec<_>, DataLoadError>>()?;
        pending.push(Pending::Building(BuildingSpec {
            id: BuildingTypeId(i as u32),
            name: b.name.clone(),
            role: building_role(b.role),
            cost: cost(&b.cost),
            cost_growth: growth(&b.name, b.cost_growth)?,
            yields,
            requirements: requirements(&b.requires, &targets, &src.buildings)?,
        }));
    }
    for (i, r) in data.research.iter().enumerate() {
        pending.push(Pending::Research(ResearchSpec {
            id: ResearchId(i as u32),
            name: r.name.clone(),
            role: research_role(r.role),
            cost: cost(&r.cost),
            cost_growth: growth(&r.name, r.cost_growth)?,
            requirements: requirements(&r.requires, &targets, &src.research)?,
        }));
    }

    // Pass 3: register in dependency order.
    let mut catalog = Catalog::new(balance(&data.balance)?);
    while !pending.is_empty() {
        let before = pending.len();
        let mut blocked = Vec::new();
        for entry in pending {
            let ready = entry.requirements().iter().all(|req| match req {
                Requirement::Building { building, .. } => catalog.building(*building).is_ok(),
                Requirement::Research { research, .. } => catalog.research(*research).is_ok(),
            });
            if !ready {
                blocked.push(entry);
                continue;
            }
            match entry {
                Pending::Building(spec) => {
                    catalog.register_building(spec)?;
                }
                Pending::Research(spec) => {
                    catalog.register_research(spec)?;
                }
            }
        }
        if blocked.len() == before {
            let name = blocked.first().map(|p| p.name().to_string()).unwrap_or_default();
            return Err(DataLoadError::RequirementCycle { name });
        }
        pending = blocked;
    }

    // Pass 4: units.
    for (i, u) in data.units.iter().enumerate() {
        let rapid_fire = u
            .rapid_fire
            .iter()
            .map(|(target, n)| Ok((*resolve_name(&unit_ids, target, &src.units, "unit")?, *n)))
            .collect::<Result<Vec<_>, DataLoadError>>()?;
        catalog.register_unit(UnitSpec {
            id: UnitTypeId(i as u32),
            name: u.name.clone(),
            role: unit_role(u.role),
            cost: cost(&u.cost),
            weapon: number(&u.name, "weapon", u.weapon)?,
            shield: number(&u.name, "shield", u.shield)?,
            speed: u.speed,
            drive: drive(u.drive),
            cargo: u.cargo,
            fuel: u.fuel,
            rapid_fire,
            requirements: requirements(&u.requires, &targets, &src.units)?,
        })?;
    }
    Ok(catalog)
}

/// Apply the overrides in `data` to the default balance.
pub fn balance(data: &BalanceData) -> Result<Balance, DataLoadError> {
    let mut b = Balance::default();
    let f = |field: &'static str, v: f64| number("balance", field, v);

    if let Some(v) = data.universe_speed {
        b.universe_speed = v;
    }
    if let Some(c) = &data.base_income {
        b.base_income = cost(c);
    }
    if let Some(v) = data.storage_base {
        b.storage_base = f("storage_base", v)?;
    }
    if let Some(v) = data.storage_growth {
        b.storage_growth = f("storage_growth", v)?;
    }
    if let Some(v) = data.base_fleet_slots {
        b.base_fleet_slots = v;
    }
    if let Some(v) = data.queue_limit {
        b.queue_limit = v;
    }
    if let Some(v) = data.max_planets {
        b.max_planets = v;
    }
    if let Some(v) = data.planet_fields {
        b.planet_fields = v;
    }
    if let Some(v) = data.allow_head_cancel {
        b.allow_head_cancel = v;
    }
    if let Some(t) = &data.travel {
        b.travel = t.clone();
    }
    if let Some(e) = &data.espionage {
        b.espionage = e.clone();
    }
    if let Some(c) = &data.combat {
        let r = &mut b.combat;
        if let Some(v) = c.max_rounds {
            r.max_rounds = v;
        }
        if let Some(v) = c.max_units_per_side {
            r.max_units_per_side = v;
        }
        for (value, slot, field) in [
            (c.explosion_threshold, &mut r.explosion_threshold, "combat.explosion_threshold"),
            (c.shield_bounce, &mut r.shield_bounce, "combat.shield_bounce"),
            (c.tech_bonus, &mut r.tech_bonus, "combat.tech_bonus"),
            (c.debris_ratio, &mut r.debris_ratio, "combat.debris_ratio"),
            (c.defense_debris_ratio, &mut r.defense_debris_ratio, "combat.defense_debris_ratio"),
            (c.min_debris, &mut r.min_debris, "combat.min_debris"),
            (c.loot_fraction, &mut r.loot_fraction, "combat.loot_fraction"),
            (c.defense_repair_chance, &mut r.defense_repair_chance, "combat.defense_repair_chance"),
        ] {
            if let Some(v) = value {
                *slot = f(field, v)?;
            }
        }
    }
    if let Some(e) = &data.expedition {
        let r = &mut b.expedition;
        for (value, slot) in [
            (e.weight_nothing, &mut r.weight_nothing),
            (e.weight_resources, &mut r.weight_resources),
            (e.weight_ships, &mut r.weight_ships),
            (e.weight_pirates, &mut r.weight_pirates),
        ] {
            if let Some(v) = value {
                *slot = v;
            }
        }
        if let Some(c) = &e.resource_find {
            r.resource_find = cost(c);
        }
        if let Some(v) = e.ship_find_ratio {
            r.ship_find_ratio = f("expedition.ship_find_ratio", v)?;
        }
        if let Some(v) = e.pirate_strength {
            r.pirate_strength = f("expedition.pirate_strength", v)?;
        }
    }
    Ok(b)
}

// ===========================================================================
// Tests
// ===========================================================================
