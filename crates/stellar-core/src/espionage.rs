//! Espionage reports.
//!
//! How much a report reveals depends on the information level
//! `probes + sign(d) * d^2`, where `d` is the spy's espionage research
//! minus the target's. Each section appears once the level reaches its
//! threshold in [`EspionageRules`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::catalog::{Catalog, EspionageRules, UnitRole};
use crate::coords::Coordinate;
use crate::id::{BuildingTypeId, PlanetId, PlayerId, ResearchId, UnitTypeId};
use crate::message::units_value;
use crate::planet::{Planet, Player};
use crate::resources::Resources;
use crate::units::UnitCollection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EspionageReport {
    pub target: Coordinate,
    pub target_planet: PlanetId,
    pub target_owner: PlayerId,
    pub info_level: i64,
    pub resources: Option<Resources>,
    pub fleet: Option<UnitCollection>,
    pub defense: Option<UnitCollection>,
    pub buildings: Option<BTreeMap<BuildingTypeId, u32>>,
    pub research: Option<BTreeMap<ResearchId, u32>>,
}

/// `probes + sign(d) * d^2` with `d = own - target`.
pub fn info_level(probes: u64, own_espionage: u32, target_espionage: u32) -> i64 {
    let d = i64::from(own_espionage) - i64::from(target_espionage);
    i64::try_from(probes).unwrap_or(i64::MAX).saturating_add(d.signum() * d * d)
}

/// Snapshot what an information level of `level` reveals about `planet`.
pub fn spy(
    catalog: &Catalog,
    rules: &EspionageRules,
    level: i64,
    planet: &Planet,
    owner: &Player,
) -> EspionageReport {
    let is_defense = |u: UnitTypeId| {
        catalog
            .unit(u)
            .map(|s| s.role == UnitRole::Defense)
            .unwrap_or(false)
    };
    EspionageReport {
        target: planet.coordinate,
        target_planet: planet.id,
        target_owner: owner.id,
        info_level: level,
        resources: (level >= rules.resources).then(|| planet.resources.floored()),
        fleet: (level >= rules.fleet).then(|| planet.units.filtered(|u| !is_defense(u))),
        defense: (level >= rules.defense).then(|| planet.units.filtered(is_defense)),
        buildings: (level >= rules.buildings).then(|| planet.buildings.clone()),
        research: (level >= rules.research).then(|| owner.research.clone()),
    }
}

impl EspionageReport {
    /// Structured message parameters. Hidden sections are omitted.
    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("target".into(), json!(self.target.to_string()));
        params.insert("info_level".into(), json!(self.info_level));
        if let Some(r) = &self.resources {
            let (m, c, d) = r.whole();
            params.insert("metal".into(), json!(m));
            params.insert("crystal".into(), json!(c));
            params.insert("deuterium".into(), json!(d));
        }
        if let Some(f) = &self.fleet {
            params.insert("fleet".into(), units_value(f));
        }
        if let Some(d) = &self.defense {
            params.insert("defense".into(), units_value(d));
        }
        if let Some(b) = &self.buildings {
            let v = b.iter().map(|(id, l)| (id.0.to_string(), json!(l))).collect();
            params.insert("buildings".into(), Value::Object(v));
        }
        if let Some(r) = &self.research {
            let v = r.iter().map(|(id, l)| (id.0.to_string(), json!(l))).collect();
            params.insert("research".into(), Value::Object(v));
        }
        params
    }
}
