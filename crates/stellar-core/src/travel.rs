//! Distances, flight times and fuel.
//!
//! All arithmetic is integer so every worker computes identical arrival
//! instants: square roots use `u64::isqrt` on values pre-scaled by 10^12.

use crate::catalog::{Catalog, CatalogError, DriveKind, ResearchRole, TravelRules};
use crate::coords::Coordinate;
use crate::error::{DestinationIssue, ValidationError};
use crate::fixed::Seconds;
use crate::id::UnitTypeId;
use crate::planet::Player;
use crate::units::UnitCollection;

/// Reference distance of the fuel formula.
const FUEL_DISTANCE: u128 = 35_000;

/// Distance between two coordinates. The moon flag is ignored, so a planet
/// and its moon are at the same-position distance.
pub fn distance(rules: &TravelRules, from: &Coordinate, to: &Coordinate) -> u64 {
    let dg = from.galaxy.abs_diff(to.galaxy);
    let ds = from.system.abs_diff(to.system);
    let dp = from.position.abs_diff(to.position);
    if dg != 0 {
        rules.galaxy_step * u64::from(dg)
    } else if ds != 0 {
        rules.system_base + rules.system_step * u64::from(ds)
    } else if dp != 0 {
        rules.position_base + rules.position_step * u64::from(dp)
    } else {
        rules.same_position
    }
}

/// Speed must be a multiple of ten between 10 and 100 percent.
pub fn validate_speed(percent: u32) -> Result<(), ValidationError> {
    if (10..=100).contains(&percent) && percent % 10 == 0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidSpeed(percent))
    }
}

/// Check that a coordinate exists in this universe. Position
/// `expedition_position` is only valid when `allow_deep_space` is set.
pub fn validate_coordinate(
    rules: &TravelRules,
    coord: &Coordinate,
    allow_deep_space: bool,
) -> Result<(), ValidationError> {
    let deep = coord.position == rules.expedition_position;
    let in_range = (1..=rules.galaxies).contains(&coord.galaxy)
        && (1..=rules.systems).contains(&coord.system)
        && ((1..=rules.planet_positions).contains(&coord.position) || (deep && allow_deep_space))
        && !(deep && coord.is_moon);
    if in_range {
        Ok(())
    } else {
        Err(ValidationError::InvalidDestination {
            destination: *coord,
            issue: DestinationIssue::OutOfRange,
        })
    }
}

/// Flight time for `distance` at the given slowest-ship speed.
///
/// `(10 + 35000 / (percent / 10) * sqrt(distance * 10 / speed)) / fleet_speed`,
/// rounded to the nearest second, at least one second.
pub fn duration(rules: &TravelRules, distance: u64, slowest_speed: u64, speed_percent: u32) -> Seconds {
    let speed = u128::from(slowest_speed.max(1));
    let percent = u128::from(speed_percent.clamp(10, 100));
    let fleet_speed = u128::from(rules.fleet_speed.max(1));

    // sqrt(distance * 10 / speed) scaled by 10^6.
    let ratio = u128::from(distance) * 10 * 1_000_000_000_000 / speed;
    let root = u64::try_from(ratio).unwrap_or(u64::MAX).isqrt();

    // 35000 / (percent / 10) == 350000 / percent; everything scaled by 10^6.
    let scaled = 10_000_000 + 350_000 * u128::from(root) / percent;
    let denom = 1_000_000 * fleet_speed;
    let secs = (scaled + denom / 2) / denom;
    i64::try_from(secs).unwrap_or(i64::MAX).max(1)
}

/// Deuterium burned by `units` over `distance`:
/// `1 + sum(count * fuel * distance / 35000 * (percent / 100 + 1)^2)`,
/// rounded up.
pub fn fuel(
    catalog: &Catalog,
    units: &UnitCollection,
    distance: u64,
    speed_percent: u32,
) -> Result<u64, CatalogError> {
    let pct = u128::from(speed_percent) + 100;
    let mut numerator: u128 = 0;
    for (unit, count) in units.iter() {
        let spec = catalog.unit(unit)?;
        numerator = numerator.saturating_add(
            u128::from(count) * u128::from(spec.fuel) * u128::from(distance) * pct * pct,
        );
    }
    let denom = FUEL_DISTANCE * 10_000;
    let burned = numerator.div_ceil(denom);
    Ok(1 + u64::try_from(burned).unwrap_or(u64::MAX - 1))
}

/// Effective speed of one ship type for `player`, including drive research.
pub fn unit_speed(catalog: &Catalog, unit: UnitTypeId, player: &Player) -> Result<u64, CatalogError> {
    let spec = catalog.unit(unit)?;
    let rules = &catalog.balance.travel;
    let (research, bonus) = match spec.drive {
        DriveKind::Combustion => (ResearchRole::Drive(DriveKind::Combustion), rules.combustion_bonus),
        DriveKind::Impulse => (ResearchRole::Drive(DriveKind::Impulse), rules.impulse_bonus),
        DriveKind::Hyperspace => (ResearchRole::Drive(DriveKind::Hyperspace), rules.hyperspace_bonus),
    };
    let level = u64::from(catalog.research_level(&player.research, research));
    let base = u64::from(spec.speed);
    Ok(base + base * u64::from(bonus) * level / 100)
}

/// Speed of the slowest ship in `units`. Zero for an empty manifest.
pub fn slowest_speed(catalog: &Catalog, units: &UnitCollection, player: &Player) -> Result<u64, CatalogError> {
    let mut slowest: Option<u64> = None;
    for (unit, _) in units.iter() {
        let s = unit_speed(catalog, unit, player)?;
        slowest = Some(slowest.map_or(s, |cur| cur.min(s)));
    }
    Ok(slowest.unwrap_or(0))
}

/// Total cargo capacity of `units`.
pub fn cargo_capacity(catalog: &Catalog, units: &UnitCollection) -> Result<u64, CatalogError> {
    let mut total = 0u64;
    for (unit, count) in units.iter() {
        total = total.saturating_add(catalog.unit(unit)?.cargo.saturating_mul(count));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TravelRules {
        TravelRules::default()
    }

    #[test]
    fn distance_tiers() {
        let r = rules();
        let a = Coordinate::planet(1, 100, 4);
        assert_eq!(distance(&r, &a, &Coordinate::planet(3, 1, 1)), 40_000);
        assert_eq!(distance(&r, &a, &Coordinate::planet(1, 110, 4)), 2_700 + 950);
        assert_eq!(distance(&r, &a, &Coordinate::planet(1, 100, 8)), 1_020);
        assert_eq!(distance(&r, &a, &Coordinate::moon(1, 100, 4)), 5);
    }

    #[test]
    fn distance_is_symmetric() {
        let r = rules();
        let a = Coordinate::planet(2, 7, 3);
        let b = Coordinate::planet(1, 300, 12);
        assert_eq!(distance(&r, &a, &b), distance(&r, &b, &a));
    }

    #[test]
    fn duration_matches_formula() {
        let r = rules();
        // 10 + 3500 * sqrt(1020 * 10 / 5000) = 10 + 3500 * 1.42828... = 5008.99
        assert_eq!(duration(&r, 1_020, 5_000, 100), 5_009);
        // Half speed doubles the variable term.
        assert_eq!(duration(&r, 1_020, 5_000, 50), 10_008);
    }

    #[test]
    fn duration_divides_by_fleet_speed() {
        let mut r = rules();
        r.fleet_speed = 2;
        assert_eq!(duration(&r, 1_020, 5_000, 100), 2_504);
    }

    #[test]
    fn speed_validation() {
        assert!(validate_speed(100).is_ok());
        assert!(validate_speed(10).is_ok());
        assert_eq!(validate_speed(0), Err(ValidationError::InvalidSpeed(0)));
        assert_eq!(validate_speed(55), Err(ValidationError::InvalidSpeed(55)));
        assert_eq!(validate_speed(110), Err(ValidationError::InvalidSpeed(110)));
    }

    #[test]
    fn coordinate_validation() {
        let r = rules();
        assert!(validate_coordinate(&r, &Coordinate::planet(1, 1, 15), false).is_ok());
        assert!(validate_coordinate(&r, &Coordinate::planet(1, 1, 16), false).is_err());
        assert!(validate_coordinate(&r, &Coordinate::planet(1, 1, 16), true).is_ok());
        assert!(validate_coordinate(&r, &Coordinate::planet(0, 1, 1), false).is_err());
        assert!(validate_coordinate(&r, &Coordinate::planet(10, 1, 1), false).is_err());
    }
}
