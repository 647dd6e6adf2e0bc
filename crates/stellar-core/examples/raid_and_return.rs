//! Raid example: two players, one attack, everything resolved lazily.
//!
//! Nothing happens while the clock moves. The battle, the debris and the
//! return trip are only computed when the defender next opens the game.
//!
//! Run with: `cargo run -p stellar-core --example raid_and_return`

use stellar_core::clock::after;
use stellar_core::coords::Coordinate;
use stellar_core::fleet::DispatchRequest;
use stellar_core::mission::MissionType;
use stellar_core::resources::Resources;
use stellar_core::store::Store;
use stellar_core::test_utils::*;
use stellar_core::units::UnitCollection;

fn main() {
    // --- Step 1: Seed the universe ---

    let w = World::new(standard_catalog());
    let raider = w.player("raider");
    let farmer = w.player("farmer");
    let base = w.planet(raider, Coordinate::planet(1, 40, 7));
    let farm = w.planet(farmer, Coordinate::planet(1, 42, 7));
    w.edit_planet(base, |p| {
        p.resources = Resources::new(0, 0, 50_000);
        p.units = UnitCollection::from_pairs([(LIGHT_FIGHTER, 30), (SMALL_CARGO, 10)]);
    });
    w.edit_planet(farm, |p| {
        p.resources = Resources::new(40_000, 25_000, 8_000);
        p.units = UnitCollection::from_pairs([(ROCKET_LAUNCHER, 8)]);
    });

    // --- Step 2: Launch ---

    let attack = w
        .engine
        .dispatch(
            raider,
            &DispatchRequest {
                origin: base,
                destination: Coordinate::planet(1, 42, 7),
                mission: MissionType::Attack,
                units: UnitCollection::from_pairs([(LIGHT_FIGHTER, 30), (SMALL_CARGO, 10)]),
                cargo: Resources::ZERO,
                speed_percent: 100,
            },
        )
        .expect("attack dispatched");
    println!(
        "attack {:?} departs {} and arrives {} ({} s, {} deuterium)",
        attack.id,
        attack.time_departure,
        attack.time_arrival,
        attack.duration(),
        attack.fuel_cost
    );

    // --- Step 3: Nobody looks for a day ---

    w.clock.set(after(attack.time_arrival, 86_400));
    let report = w.engine.catch_up_player(farmer).expect("catch-up succeeds");
    println!("\nfarmer's catch-up: {report:?}");

    for message in w.mailbox.messages() {
        println!("  {:?} <- {} {:?}", message.recipient, message.template_key, message.params);
    }

    // --- Step 4: Where things ended up ---

    let farm_row = w.read_planet(farm);
    println!("\nfarm stock now {:?}", farm_row.resources.whole());
    println!("farm defenses now {}", farm_row.units.get(ROCKET_LAUNCHER));
    if let Some(field) = w.store.debris(Coordinate::planet(1, 42, 7)).expect("store readable") {
        println!("debris in orbit {:?}", field.row.resources.whole());
    }

    w.engine.catch_up_player(raider).expect("catch-up succeeds");
    let base_row = w.read_planet(base);
    println!(
        "raider home: {} fighters, {} cargo ships, stock {:?}",
        base_row.units.get(LIGHT_FIGHTER),
        base_row.units.get(SMALL_CARGO),
        base_row.resources.whole()
    );
}
