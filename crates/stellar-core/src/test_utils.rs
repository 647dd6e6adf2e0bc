//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::sync::Arc;

use chrono::DateTime;

use crate::catalog::{
    Balance, BuildingRole, BuildingSpec, Catalog, DriveKind, Requirement, ResearchRole, ResearchSpec,
    UnitRole, UnitSpec, Yield,
};
use crate::clock::{ManualClock, Timestamp};
use crate::coords::Coordinate;
use crate::engine::Engine;
use crate::fixed::{Fixed64, Seconds};
use crate::id::*;
use crate::message::RecordingDispatcher;
use crate::mission::FleetMission;
use crate::planet::{Planet, Player};
use crate::resources::{ResourceKind, Resources};
use crate::store::{ChangeSet, InMemoryStore, Store, Write};

// ===========================================================================
// Time and numbers
// ===========================================================================

/// The unix epoch plus `secs`.
pub fn t(secs: i64) -> Timestamp {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Catalog ids
// ===========================================================================

pub const METAL_MINE: BuildingTypeId = BuildingTypeId(0);
pub const CRYSTAL_MINE: BuildingTypeId = BuildingTypeId(1);
pub const DEUTERIUM_SYNTHESIZER: BuildingTypeId = BuildingTypeId(2);
pub const SOLAR_PLANT: BuildingTypeId = BuildingTypeId(3);
pub const METAL_STORAGE: BuildingTypeId = BuildingTypeId(4);
pub const CRYSTAL_STORAGE: BuildingTypeId = BuildingTypeId(5);
pub const DEUTERIUM_TANK: BuildingTypeId = BuildingTypeId(6);
pub const ROBOTICS_FACTORY: BuildingTypeId = BuildingTypeId(7);
pub const SHIPYARD: BuildingTypeId = BuildingTypeId(8);
pub const RESEARCH_LAB: BuildingTypeId = BuildingTypeId(9);

pub const ENERGY_TECH: ResearchId = ResearchId(0);
pub const COMBUSTION_DRIVE: ResearchId = ResearchId(1);
pub const IMPULSE_DRIVE: ResearchId = ResearchId(2);
pub const COMPUTER_TECH: ResearchId = ResearchId(3);
pub const ESPIONAGE_TECH: ResearchId = ResearchId(4);
pub const WEAPONS_TECH: ResearchId = ResearchId(5);
pub const SHIELDING_TECH: ResearchId = ResearchId(6);
pub const ARMOUR_TECH: ResearchId = ResearchId(7);

pub const SMALL_CARGO: UnitTypeId = UnitTypeId(0);
pub const LARGE_CARGO: UnitTypeId = UnitTypeId(1);
pub const LIGHT_FIGHTER: UnitTypeId = UnitTypeId(2);
pub const COLONY_SHIP: UnitTypeId = UnitTypeId(3);
pub const RECYCLER: UnitTypeId = UnitTypeId(4);
pub const PROBE: UnitTypeId = UnitTypeId(5);
pub const ROCKET_LAUNCHER: UnitTypeId = UnitTypeId(6);

// ===========================================================================
// Catalog construction
// ===========================================================================

fn building_req(building: BuildingTypeId, level: u32) -> Requirement {
    Requirement::Building { building, level }
}

fn research_req(research: ResearchId, level: u32) -> Requirement {
    Requirement::Research { research, level }
}

fn yields(pairs: &[(ResourceKind, f64)]) -> Vec<Yield> {
    pairs
        .iter()
        .map(|&(resource, base)| Yield {
            resource,
            base: fixed(base),
            growth: fixed(1.1),
        })
        .collect()
}

fn building(
    id: BuildingTypeId,
    name: &str,
    role: BuildingRole,
    cost: (u32, u32, u32),
    growth: f64,
    output: &[(ResourceKind, f64)],
    requirements: Vec<Requirement>,
) -> BuildingSpec {
    BuildingSpec {
        id,
        name: name.into(),
        role,
        cost: Resources::new(cost.0, cost.1, cost.2),
        cost_growth: fixed(growth),
        yields: yields(output),
        requirements,
    }
}

fn research(
    id: ResearchId,
    name: &str,
    role: ResearchRole,
    cost: (u32, u32, u32),
    requirements: Vec<Requirement>,
) -> ResearchSpec {
    ResearchSpec {
        id,
        name: name.into(),
        role,
        cost: Resources::new(cost.0, cost.1, cost.2),
        cost_growth: fixed(2.0),
        requirements,
    }
}

#[allow(clippy::too_many_arguments)]
fn unit(
    id: UnitTypeId,
    name: &str,
    role: UnitRole,
    cost: (u32, u32, u32),
    weapon: f64,
    shield: f64,
    speed: u32,
    drive: DriveKind,
    cargo: u64,
    fuel: u32,
    rapid_fire: Vec<(UnitTypeId, u32)>,
    requirements: Vec<Requirement>,
) -> UnitSpec {
    UnitSpec {
        id,
        name: name.into(),
        role,
        cost: Resources::new(cost.0, cost.1, cost.2),
        weapon: fixed(weapon),
        shield: fixed(shield),
        speed,
        drive,
        cargo,
        fuel,
        rapid_fire,
        requirements,
    }
}

/// A small classic catalog: mines, storage, facilities, the research the
/// engine reads, five ships, a probe and one defense.
pub fn catalog_with(balance: Balance) -> Catalog {
    use BuildingRole as B;
    use ResourceKind::*;

    let mut c = Catalog::new(balance);
    let buildings = [
        building(METAL_MINE, "Metal Mine", B::Production, (60, 15, 0), 1.5, &[(Metal, 30.0), (Energy, -10.0)], vec![]),
        building(CRYSTAL_MINE, "Crystal Mine", B::Production, (48, 24, 0), 1.6, &[(Crystal, 20.0), (Energy, -10.0)], vec![]),
        building(
            DEUTERIUM_SYNTHESIZER,
            "Deuterium Synthesizer",
            B::Production,
            (225, 75, 0),
            1.5,
            &[(Deuterium, 10.0), (Energy, -20.0)],
            vec![],
        ),
        building(SOLAR_PLANT, "Solar Plant", B::Production, (75, 30, 0), 1.5, &[(Energy, 20.0)], vec![]),
        building(METAL_STORAGE, "Metal Storage", B::Storage(Metal), (1_000, 0, 0), 2.0, &[], vec![]),
        building(CRYSTAL_STORAGE, "Crystal Storage", B::Storage(Crystal), (1_000, 500, 0), 2.0, &[], vec![]),
        building(DEUTERIUM_TANK, "Deuterium Tank", B::Storage(Deuterium), (1_000, 1_000, 0), 2.0, &[], vec![]),
        building(ROBOTICS_FACTORY, "Robotics Factory", B::RoboticsFactory, (400, 120, 200), 2.0, &[], vec![]),
        building(
            SHIPYARD,
            "Shipyard",
            B::Shipyard,
            (400, 200, 100),
            2.0,
            &[],
            vec![building_req(ROBOTICS_FACTORY, 2)],
        ),
        building(RESEARCH_LAB, "Research Lab", B::ResearchLab, (200, 400, 200), 2.0, &[], vec![]),
    ];
    for b in buildings {
        c.register_building(b).expect("building registers");
    }

    let lab = |level| building_req(RESEARCH_LAB, level);
    let topics = [
        research(ENERGY_TECH, "Energy Technology", ResearchRole::Other, (0, 800, 400), vec![lab(1)]),
        research(
            COMBUSTION_DRIVE,
            "Combustion Drive",
            ResearchRole::Drive(DriveKind::Combustion),
            (400, 0, 600),
            vec![lab(1)],
        ),
        research(
            IMPULSE_DRIVE,
            "Impulse Drive",
            ResearchRole::Drive(DriveKind::Impulse),
            (2_000, 4_000, 600),
            vec![lab(2)],
        ),
        research(COMPUTER_TECH, "Computer Technology", ResearchRole::Computer, (0, 400, 600), vec![lab(1)]),
        research(ESPIONAGE_TECH, "Espionage Technology", ResearchRole::Espionage, (200, 1_000, 200), vec![lab(3)]),
        research(WEAPONS_TECH, "Weapons Technology", ResearchRole::Weapons, (800, 200, 0), vec![lab(4)]),
        research(SHIELDING_TECH, "Shielding Technology", ResearchRole::Shielding, (200, 600, 0), vec![lab(6)]),
        research(ARMOUR_TECH, "Armour Technology", ResearchRole::Armour, (1_000, 0, 0), vec![lab(2)]),
    ];
    for r in topics {
        c.register_research(r).expect("research registers");
    }

    let yard = |level| building_req(SHIPYARD, level);
    let units = [
        unit(
            SMALL_CARGO,
            "Small Cargo",
            UnitRole::Ship,
            (2_000, 2_000, 0),
            5.0,
            10.0,
            5_000,
            DriveKind::Combustion,
            5_000,
            10,
            vec![(PROBE, 5)],
            vec![yard(2), research_req(COMBUSTION_DRIVE, 2)],
        ),
        unit(
            LARGE_CARGO,
            "Large Cargo",
            UnitRole::Ship,
            (6_000, 6_000, 0),
            5.0,
            25.0,
            7_500,
            DriveKind::Combustion,
            25_000,
            50,
            vec![(PROBE, 5)],
            vec![yard(4), research_req(COMBUSTION_DRIVE, 6)],
        ),
        unit(
            LIGHT_FIGHTER,
            "Light Fighter",
            UnitRole::Ship,
            (3_000, 1_000, 0),
            50.0,
            10.0,
            12_500,
            DriveKind::Combustion,
            50,
            20,
            vec![(PROBE, 5)],
            vec![yard(1), research_req(COMBUSTION_DRIVE, 1)],
        ),
        unit(
            COLONY_SHIP,
            "Colony Ship",
            UnitRole::Colonizer,
            (10_000, 20_000, 10_000),
            50.0,
            100.0,
            2_500,
            DriveKind::Impulse,
            7_500,
            1_000,
            vec![(PROBE, 5)],
            vec![yard(4), research_req(IMPULSE_DRIVE, 3)],
        ),
        unit(
            RECYCLER,
            "Recycler",
            UnitRole::Recycler,
            (10_000, 6_000, 2_000),
            1.0,
            10.0,
            2_000,
            DriveKind::Combustion,
            20_000,
            300,
            vec![(PROBE, 5)],
            vec![yard(4), research_req(COMBUSTION_DRIVE, 6)],
        ),
        unit(
            PROBE,
            "Espionage Probe",
            UnitRole::Probe,
            (0, 1_000, 0),
            0.0,
            0.01,
            100_000_000,
            DriveKind::Combustion,
            5,
            1,
            vec![],
            vec![yard(3), research_req(COMBUSTION_DRIVE, 3), research_req(ESPIONAGE_TECH, 2)],
        ),
        unit(
            ROCKET_LAUNCHER,
            "Rocket Launcher",
            UnitRole::Defense,
            (2_000, 0, 0),
            80.0,
            20.0,
            0,
            DriveKind::Combustion,
            0,
            0,
            vec![],
            vec![yard(1)],
        ),
    ];
    for u in units {
        c.register_unit(u).expect("unit registers");
    }
    c
}

/// The classic catalog with default balance.
pub fn standard_catalog() -> Catalog {
    catalog_with(Balance::default())
}

/// The classic catalog without base income, so stock only changes through
/// the operations under test.
pub fn still_catalog() -> Catalog {
    catalog_with(Balance {
        base_income: Resources::ZERO,
        ..Balance::default()
    })
}

// ===========================================================================
// World: an engine over an in-memory store
// ===========================================================================

/// An engine wired to an in-memory store, a manual clock at [`t(0)`] and a
/// recording mailbox.
pub struct World {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub mailbox: Arc<RecordingDispatcher>,
    pub catalog: Arc<Catalog>,
    pub engine: Engine,
}

impl World {
    pub fn new(catalog: Catalog) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t(0)));
        let mailbox = Arc::new(RecordingDispatcher::new());
        let catalog = Arc::new(catalog);
        let engine = Engine::new(store.clone(), clock.clone(), mailbox.clone(), catalog.clone());
        Self {
            store,
            clock,
            mailbox,
            catalog,
            engine,
        }
    }

    /// Another worker sharing this world's store, clock and mailbox.
    pub fn engine_for(&self) -> Engine {
        Engine::new(
            self.store.clone(),
            self.clock.clone(),
            self.mailbox.clone(),
            self.catalog.clone(),
        )
    }

    pub fn player(&self, name: &str) -> PlayerId {
        self.engine.create_player(name).expect("player created")
    }

    pub fn planet(&self, owner: PlayerId, coordinate: Coordinate) -> PlanetId {
        self.engine
            .create_planet(owner, &format!("Planet {coordinate}"), coordinate)
            .expect("planet created")
    }

    /// Rewrite a planet row directly, bypassing catch-up.
    pub fn edit_planet(&self, id: PlanetId, f: impl FnOnce(&mut Planet)) {
        let mut row = self.read_planet(id);
        f(&mut row);
        let mut cs = ChangeSet::new();
        cs.write(Write::PutPlanet(row));
        self.store.commit(cs).expect("store available");
    }

    pub fn edit_player(&self, id: PlayerId, f: impl FnOnce(&mut Player)) {
        let mut row = self.read_player(id);
        f(&mut row);
        let mut cs = ChangeSet::new();
        cs.write(Write::PutPlayer(row));
        self.store.commit(cs).expect("store available");
    }

    pub fn read_planet(&self, id: PlanetId) -> Planet {
        self.store.planet(id).expect("store available").expect("planet exists").row
    }

    pub fn read_player(&self, id: PlayerId) -> Player {
        self.store.player(id).expect("store available").expect("player exists").row
    }

    pub fn read_mission(&self, id: MissionId) -> FleetMission {
        self.store.mission(id).expect("store available").expect("mission exists").row
    }

    pub fn advance(&self, secs: Seconds) {
        self.clock.advance(secs);
    }
}
