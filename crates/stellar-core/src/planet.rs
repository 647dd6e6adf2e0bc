//! Persistent game rows: players, planets and debris fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::coords::Coordinate;
use crate::id::{BuildingTypeId, PlanetId, PlayerId, ResearchId};
use crate::resources::Resources;
use crate::units::UnitCollection;

/// A player and the research levels that apply across all their planets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub research: BTreeMap<ResearchId, u32>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            research: BTreeMap::new(),
        }
    }

    pub fn research_level(&self, research: ResearchId) -> u32 {
        self.research.get(&research).copied().unwrap_or(0)
    }
}

/// A planet or moon. Owned by exactly one player.
///
/// `resources` is only meaningful together with `last_update`: the stock
/// is what the planet held at that instant, and everything produced since
/// is credited by the next accrual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub owner: PlayerId,
    pub name: String,
    pub coordinate: Coordinate,
    pub resources: Resources,
    pub buildings: BTreeMap<BuildingTypeId, u32>,
    /// Ships and defenses stationed here.
    pub units: UnitCollection,
    pub fields_max: u32,
    pub last_update: Timestamp,
    pub created_at: Timestamp,
}

impl Planet {
    pub fn new(
        id: PlanetId,
        owner: PlayerId,
        name: impl Into<String>,
        coordinate: Coordinate,
        fields_max: u32,
        at: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            name: name.into(),
            coordinate,
            resources: Resources::ZERO,
            buildings: BTreeMap::new(),
            units: UnitCollection::new(),
            fields_max,
            last_update: at,
            created_at: at,
        }
    }

    pub fn building_level(&self, building: BuildingTypeId) -> u32 {
        self.buildings.get(&building).copied().unwrap_or(0)
    }

    /// Fields taken by constructed building levels.
    pub fn fields_used(&self) -> u32 {
        self.buildings.values().sum()
    }
}

/// Metal and crystal left floating at an orbital slot after a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebrisField {
    /// Always a planet-slot coordinate (`is_moon == false`).
    pub slot: Coordinate,
    pub resources: Resources,
}

impl DebrisField {
    pub fn new(slot: Coordinate) -> Self {
        Self {
            slot: slot.slot(),
            resources: Resources::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_used_counts_levels() {
        let mut p = Planet::new(
            PlanetId(1),
            PlayerId(1),
            "Home",
            Coordinate::planet(1, 1, 1),
            163,
            Timestamp::UNIX_EPOCH,
        );
        p.buildings.insert(BuildingTypeId(0), 4);
        p.buildings.insert(BuildingTypeId(1), 2);
        assert_eq!(p.fields_used(), 6);
        assert_eq!(p.building_level(BuildingTypeId(0)), 4);
        assert_eq!(p.building_level(BuildingTypeId(9)), 0);
    }

    #[test]
    fn debris_field_keys_on_slot() {
        let d = DebrisField::new(Coordinate::moon(3, 2, 1));
        assert_eq!(d.slot, Coordinate::planet(3, 2, 1));
        assert!(d.is_empty());
    }
}
