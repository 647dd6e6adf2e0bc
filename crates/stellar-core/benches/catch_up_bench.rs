//! Criterion benchmarks for the catch-up pass.
//!
//! Two benchmark groups:
//! - `due_missions`: one player with many transports arriving and returning
//!   in a single pass.
//! - `idle_accrual`: many planets with nothing due, accrual only.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use stellar_core::coords::Coordinate;
use stellar_core::fleet::DispatchRequest;
use stellar_core::id::*;
use stellar_core::mission::MissionType;
use stellar_core::resources::Resources;
use stellar_core::test_utils::*;
use stellar_core::units::UnitCollection;

// ===========================================================================
// World builders
// ===========================================================================

/// A player with two planets and `missions` transports in flight between
/// them. The clock is left past every return.
fn world_with_transports(missions: u64) -> (World, PlayerId) {
    let w = World::new(still_catalog());
    let me = w.player("trader");
    let a = w.planet(me, Coordinate::planet(1, 1, 1));
    w.planet(me, Coordinate::planet(1, 1, 2));
    w.edit_player(me, |p| {
        p.research.insert(COMPUTER_TECH, 1_000);
    });
    w.edit_planet(a, |p| {
        p.resources = Resources::new(1_000_000, 1_000_000, 1_000_000);
        p.units.add(SMALL_CARGO, missions);
    });
    for _ in 0..missions {
        w.engine
            .dispatch(
                me,
                &DispatchRequest {
                    origin: a,
                    destination: Coordinate::planet(1, 1, 2),
                    mission: MissionType::Transport,
                    units: UnitCollection::from_pairs([(SMALL_CARGO, 1)]),
                    cargo: Resources::new(10, 10, 0),
                    speed_percent: 100,
                },
            )
            .expect("dispatch accepted");
        w.advance(1);
    }
    w.advance(86_400);
    (w, me)
}

fn world_with_planets(planets: u8) -> (World, PlayerId) {
    let w = World::new(standard_catalog());
    let me = w.player("empire");
    for position in 1..=planets.min(15) {
        for system in 1..=4 {
            w.planet(me, Coordinate::planet(1, system, position));
        }
    }
    w.advance(3_600);
    (w, me)
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_due_missions(c: &mut Criterion) {
    let mut group = c.benchmark_group("due_missions");
    group.sample_size(10);
    for n in [10u64, 100] {
        group.bench_function(format!("{n}_transports"), |b| {
            b.iter_batched(
                || world_with_transports(n),
                |(w, me)| {
                    let report = w.engine.catch_up_player(me).expect("catch-up succeeds");
                    assert_eq!(u64::from(report.missions), 2 * n);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_idle_accrual(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_accrual");
    group.bench_function("60_planets", |b| {
        b.iter_batched(
            || world_with_planets(15),
            |(w, me)| w.engine.catch_up_player(me).expect("catch-up succeeds"),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_due_missions, bench_idle_accrual);
criterion_main!(benches);
