//! Loads the shipped classic data set and checks it lines up with the
//! hand-built test catalog in `stellar_core::test_utils`.

use std::path::PathBuf;

use stellar_core::catalog::{BuildingRole, DriveKind, ResearchRole};
use stellar_core::resources::Resources;
use stellar_core::test_utils::*;
use stellar_data::load_catalog;

fn classic_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("classic")
}

#[test]
fn classic_data_set_loads() {
    let catalog = load_catalog(&classic_dir()).unwrap();
    assert_eq!(catalog.buildings().count(), 11);
    assert_eq!(catalog.research_topics().count(), 9);
    assert_eq!(catalog.units().count(), 7);
}

#[test]
fn classic_ids_match_test_catalog() {
    let loaded = load_catalog(&classic_dir()).unwrap();
    let built = standard_catalog();

    for spec in built.buildings() {
        let other = loaded.building(spec.id).unwrap();
        assert_eq!(other.role, spec.role, "{}", spec.name);
        assert_eq!(other.cost, spec.cost, "{}", spec.name);
        assert_eq!(other.cost_at(5), spec.cost_at(5), "{}", spec.name);
    }
    for spec in built.units() {
        let other = loaded.unit(spec.id).unwrap();
        assert_eq!(other.role, spec.role, "{}", spec.name);
        assert_eq!(other.hull(), spec.hull(), "{}", spec.name);
        assert_eq!(other.speed, spec.speed, "{}", spec.name);
        assert_eq!(other.cargo, spec.cargo, "{}", spec.name);
    }
    assert_eq!(loaded.research(COMPUTER_TECH).unwrap().role, ResearchRole::Computer);
    assert_eq!(
        loaded.research(IMPULSE_DRIVE).unwrap().role,
        ResearchRole::Drive(DriveKind::Impulse)
    );
}

#[test]
fn classic_balance_overrides_apply() {
    let catalog = load_catalog(&classic_dir()).unwrap();
    let b = &catalog.balance;
    assert_eq!(b.base_income, Resources::new(30, 15, 0));
    assert_eq!(b.expedition.weight_pirates, 5);
    assert_eq!(b.combat.debris_ratio, fixed(0.3));
    // Not overridden.
    assert_eq!(b.planet_fields, 163);
    assert!(catalog.building_with_role(BuildingRole::NaniteFactory).is_some());
}
