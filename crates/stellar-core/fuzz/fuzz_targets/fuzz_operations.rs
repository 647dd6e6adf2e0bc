#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stellar_core::coords::Coordinate;
use stellar_core::fleet::DispatchRequest;
use stellar_core::id::*;
use stellar_core::mission::MissionType;
use stellar_core::queue::{QueueKind, QueueScope, check_schedule};
use stellar_core::resources::Resources;
use stellar_core::test_utils::*;
use stellar_core::units::UnitCollection;

/// One player request or a jump of the clock.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Build { building: u8 },
    Train { count: u8 },
    Cancel { index: u8 },
    Send { to_other: bool, ships: u8, metal: u16, speed: u8 },
    Recall { index: u8 },
    Wait { secs: u16 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

fuzz_target!(|input: FuzzInput| {
    let w = World::new(standard_catalog());
    let me = w.player("fuzz");
    let home = w.planet(me, Coordinate::planet(1, 1, 1));
    let other = w.planet(me, Coordinate::planet(1, 2, 1));
    w.edit_planet(home, |p| {
        p.resources = Resources::new(50_000, 50_000, 50_000);
        p.units.add(SMALL_CARGO, 20);
        p.buildings.insert(SHIPYARD, 2);
    });
    w.edit_player(me, |p| {
        p.research.insert(COMPUTER_TECH, 4);
        p.research.insert(COMBUSTION_DRIVE, 2);
    });

    let mut queued: Vec<QueueItemId> = Vec::new();
    let mut sent: Vec<MissionId> = Vec::new();

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(100);

    // Validation errors are expected; only panics and invariant breaks
    // are failures.
    for op in &input.ops[..max_ops] {
        match op {
            FuzzOp::Build { building } => {
                let target = BuildingTypeId(u32::from(*building) % 10);
                if let Ok(item) = w.engine.enqueue_building(me, home, target) {
                    queued.push(item.id);
                }
            }
            FuzzOp::Train { count } => {
                if let Ok(item) = w.engine.enqueue_units(me, home, SMALL_CARGO, u64::from(*count)) {
                    queued.push(item.id);
                }
            }
            FuzzOp::Cancel { index } => {
                if !queued.is_empty() {
                    let id = queued[usize::from(*index) % queued.len()];
                    let _ = w.engine.cancel(me, id);
                }
            }
            FuzzOp::Send { to_other, ships, metal, speed } => {
                let destination = if *to_other {
                    Coordinate::planet(1, 2, 1)
                } else {
                    Coordinate::planet(1, 1, 1)
                };
                let request = DispatchRequest {
                    origin: home,
                    destination,
                    mission: MissionType::Transport,
                    units: UnitCollection::from_pairs([(SMALL_CARGO, u64::from(*ships % 8))]),
                    cargo: Resources::new(u32::from(*metal), 0, 0),
                    speed_percent: u32::from(*speed),
                };
                if let Ok(m) = w.engine.dispatch(me, &request) {
                    sent.push(m.id);
                }
            }
            FuzzOp::Recall { index } => {
                if !sent.is_empty() {
                    let id = sent[usize::from(*index) % sent.len()];
                    let _ = w.engine.recall(me, id);
                }
            }
            FuzzOp::Wait { secs } => w.clock.advance(i64::from(*secs)),
        }
    }

    w.engine.catch_up_player(me).expect("catch-up never fails on valid state");
    for planet in [home, other] {
        assert!(!w.read_planet(planet).resources.has_negative());
        for kind in [QueueKind::Construction, QueueKind::Shipyard] {
            let queue = w
                .engine
                .queue(me, QueueScope::Planet(planet, kind))
                .expect("queue readable");
            assert!(check_schedule(&queue).is_ok());
        }
    }
});
