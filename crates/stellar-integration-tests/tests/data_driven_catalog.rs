//! The shipped classic data set driving a full engine, plus snapshot
//! save and restore in the middle of a running game.

use std::path::PathBuf;
use std::sync::Arc;

use stellar_core::catalog::Catalog;
use stellar_core::clock::{ManualClock, after};
use stellar_core::coords::Coordinate;
use stellar_core::engine::Engine;
use stellar_core::error::{EngineError, ValidationError};
use stellar_core::fleet::DispatchRequest;
use stellar_core::id::*;
use stellar_core::message::RecordingDispatcher;
use stellar_core::mission::MissionType;
use stellar_core::queue::{QueueKind, QueueScope};
use stellar_core::resources::Resources;
use stellar_core::serialize;
use stellar_core::test_utils::*;
use stellar_core::units::UnitCollection;

fn classic() -> Catalog {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../stellar-data/data/classic");
    stellar_data::load_catalog(&dir).unwrap()
}

#[test]
fn research_unlocks_after_the_lab_is_built() {
    let w = World::new(classic());
    let me = w.player("scholar");
    let home = w.planet(me, Coordinate::planet(1, 1, 1));
    w.edit_planet(home, |p| p.resources = Resources::new(5_000, 5_000, 5_000));

    let err = w.engine.enqueue_research(me, home, COMPUTER_TECH).unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::RequirementsNotMet(_))));

    let lab = w.engine.enqueue_building(me, home, RESEARCH_LAB).unwrap();
    w.clock.set(lab.completion);
    let topic = w.engine.enqueue_research(me, home, COMPUTER_TECH).unwrap();
    assert_eq!(topic.start, lab.completion);
    assert_eq!(w.engine.queue(me, QueueScope::Research(me)).unwrap().len(), 1);

    w.clock.set(topic.completion);
    let report = w.engine.catch_up_player(me).unwrap();
    assert_eq!(report.queue_items, 1);
    assert_eq!(w.read_player(me).research_level(COMPUTER_TECH), 1);
    assert_eq!(w.read_planet(home).building_level(RESEARCH_LAB), 1);
}

#[test]
fn shipyard_batch_lands_whole() {
    let w = World::new(classic());
    let me = w.player("admiral");
    let home = w.planet(me, Coordinate::planet(1, 1, 1));
    w.edit_planet(home, |p| {
        p.resources = Resources::new(100_000, 100_000, 0);
        p.buildings.insert(SHIPYARD, 1);
    });
    w.edit_player(me, |p| {
        p.research.insert(COMBUSTION_DRIVE, 1);
    });

    let batch = w.engine.enqueue_units(me, home, LIGHT_FIGHTER, 4).unwrap();
    assert_eq!(batch.cost, Resources::new(12_000, 4_000, 0));

    w.clock.set(after(batch.completion, -1));
    w.engine.catch_up_player(me).unwrap();
    assert_eq!(w.read_planet(home).units.get(LIGHT_FIGHTER), 0);

    w.clock.set(batch.completion);
    w.engine.catch_up_player(me).unwrap();
    assert_eq!(w.read_planet(home).units.get(LIGHT_FIGHTER), 4);
    assert!(
        w.engine
            .queue(me, QueueScope::Planet(home, QueueKind::Shipyard))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn restored_snapshot_continues_like_the_original() {
    let w = World::new(classic());
    let me = w.player("archivist");
    let home = w.planet(me, Coordinate::planet(4, 20, 6));
    let outpost = w.planet(me, Coordinate::planet(4, 21, 6));
    w.edit_planet(home, |p| {
        p.resources = Resources::new(20_000, 20_000, 20_000);
        p.units.add(LARGE_CARGO, 3);
    });
    w.engine.enqueue_building(me, home, METAL_MINE).unwrap();
    let m = w
        .engine
        .dispatch(
            me,
            &DispatchRequest {
                origin: home,
                destination: Coordinate::planet(4, 21, 6),
                mission: MissionType::Transport,
                units: UnitCollection::from_pairs([(LARGE_CARGO, 3)]),
                cargo: Resources::new(5_000, 5_000, 0),
                speed_percent: 70,
            },
        )
        .unwrap();
    w.clock.advance(60);

    let bytes = serialize::save(&w.store, w.engine.now()).unwrap();
    assert_eq!(serialize::read_header(&bytes).unwrap().taken_at, t(60));

    let store = Arc::new(serialize::restore(&bytes).unwrap());
    let clock = Arc::new(ManualClock::new(w.engine.now()));
    let copy = Engine::new(store.clone(), clock.clone(), Arc::new(RecordingDispatcher::new()), w.catalog.clone());

    let later = after(m.time_arrival, 3_600);
    w.clock.set(later);
    clock.set(later);
    w.engine.catch_up_player(me).unwrap();
    copy.catch_up_player(me).unwrap();

    assert_eq!(w.store.tables().unwrap(), store.tables().unwrap());
    assert!(w.read_planet(outpost).resources.metal >= fixed(5_000.0));
}
