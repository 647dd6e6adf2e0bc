//! Attacks resolved through catch-up: determinism, unit conservation,
//! debris and harvesting.

use serde_json::Value;
use stellar_core::clock::after;
use stellar_core::coords::Coordinate;
use stellar_core::fleet::DispatchRequest;
use stellar_core::id::*;
use stellar_core::mission::{FleetMission, MissionType};
use stellar_core::resources::Resources;
use stellar_core::store::Store;
use stellar_core::test_utils::*;
use stellar_core::units::UnitCollection;

// ===========================================================================
// Helpers
// ===========================================================================

struct Battle {
    world: World,
    attacker: PlayerId,
    defender: PlayerId,
    home: PlanetId,
    target: PlanetId,
    mission: FleetMission,
}

/// Five light fighters attack five light fighters, and the clock is moved
/// to the arrival.
fn five_on_five() -> Battle {
    let world = World::new(still_catalog());
    let attacker = world.player("raider");
    let defender = world.player("settler");
    let home = world.planet(attacker, Coordinate::planet(2, 10, 4));
    let target = world.planet(defender, Coordinate::planet(2, 12, 8));
    // A second fleet slot for the recyclers.
    world.edit_player(attacker, |p| {
        p.research.insert(COMPUTER_TECH, 1);
    });
    world.edit_planet(home, |p| {
        p.resources = Resources::new(0, 0, 10_000);
        p.units = UnitCollection::from_pairs([(LIGHT_FIGHTER, 5), (RECYCLER, 2)]);
    });
    world.edit_planet(target, |p| {
        p.resources = Resources::new(20_000, 10_000, 5_000);
        p.units = UnitCollection::from_pairs([(LIGHT_FIGHTER, 5)]);
    });
    let mission = world
        .engine
        .dispatch(
            attacker,
            &DispatchRequest {
                origin: home,
                destination: Coordinate::planet(2, 12, 8),
                mission: MissionType::Attack,
                units: UnitCollection::from_pairs([(LIGHT_FIGHTER, 5)]),
                cargo: Resources::ZERO,
                speed_percent: 100,
            },
        )
        .unwrap();
    world.clock.set(mission.time_arrival);
    Battle {
        world,
        attacker,
        defender,
        home,
        target,
        mission,
    }
}

fn lost(report: &stellar_core::message::OutcomeMessage, side: &str, unit: UnitTypeId) -> u64 {
    report
        .param(side)
        .and_then(|v| v.get(unit.0.to_string()))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn same_battle_replays_identically() {
    let first = five_on_five();
    let second = five_on_five();
    first.world.engine.catch_up_player(first.defender).unwrap();
    second.world.engine.catch_up_player(second.defender).unwrap();

    assert_eq!(first.mission.id, second.mission.id);
    assert_eq!(first.world.store.tables().unwrap(), second.world.store.tables().unwrap());
    assert_eq!(first.world.mailbox.messages(), second.world.mailbox.messages());
}

#[test]
fn every_unit_survives_or_is_reported_lost() {
    let b = five_on_five();
    b.world.engine.catch_up_player(b.attacker).unwrap();

    let reports = b.world.mailbox.with_key("combat.report");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].recipient, b.attacker);
    assert_eq!(reports[1].recipient, b.defender);
    assert_eq!(reports[0].params, reports[1].params);

    let report = &reports[0];
    let defender_left = b.world.read_planet(b.target).units.get(LIGHT_FIGHTER);
    assert_eq!(defender_left + lost(report, "defender_losses", LIGHT_FIGHTER), 5);

    let returning: u64 = b
        .world
        .engine
        .active_missions(b.attacker)
        .unwrap()
        .iter()
        .map(|m| m.units.get(LIGHT_FIGHTER))
        .sum();
    assert_eq!(returning + lost(report, "attacker_losses", LIGHT_FIGHTER), 5);

    // Loot leaves the defender's stock and rides home with the survivors.
    let loot = report.param("loot").unwrap();
    let stock = b.world.read_planet(b.target).resources;
    let looted = loot["metal"].as_u64().unwrap();
    assert_eq!(stock.metal, fixed(20_000.0) - fixed(looted as f64));
}

#[test]
fn wreckage_can_be_harvested() {
    let b = five_on_five();
    b.world.engine.catch_up_player(b.attacker).unwrap();
    let slot = Coordinate::planet(2, 12, 8);
    let Some(field) = b.world.store.debris(slot).unwrap() else {
        // Nothing was destroyed, so there is nothing to collect.
        let report = &b.world.mailbox.with_key("combat.report")[0];
        assert_eq!(report.param("debris").unwrap()["metal"].as_u64(), Some(0));
        return;
    };
    let (metal, crystal, _) = field.row.resources.whole();
    assert!(metal + crystal > 0);

    let harvest = b
        .world
        .engine
        .dispatch(
            b.attacker,
            &DispatchRequest {
                origin: b.home,
                destination: slot,
                mission: MissionType::Harvest,
                units: UnitCollection::from_pairs([(RECYCLER, 2)]),
                cargo: Resources::ZERO,
                speed_percent: 50,
            },
        )
        .unwrap();

    b.world.clock.set(after(harvest.time_arrival, 1));
    b.world.engine.catch_up_player(b.attacker).unwrap();
    let reports = b.world.mailbox.with_key("harvest.report");
    assert_eq!(reports.len(), 1);
    // 40 000 recycler space covers any wreckage of ten light fighters.
    assert_eq!(reports[0].param("metal").and_then(Value::as_u64), Some(metal));
    assert!(b.world.store.debris(slot).unwrap().is_none());
}
