//! Expeditions into the deep-space slot.
//!
//! The outcome is rolled from [`SimRng::for_expedition`], so it is fixed by
//! the mission id. Pirate encounters are fought with the regular
//! [`CombatResolver`], the expedition fleet attacking.

use crate::catalog::Catalog;
use crate::combat::{CombatError, CombatOutcome, CombatResolver, Combatant, plunder};
use crate::fixed::{Fixed64, floor_u64};
use crate::id::MissionId;
use crate::resources::Resources;
use crate::rng::SimRng;
use crate::travel::cargo_capacity;
use crate::units::UnitCollection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpeditionOutcome {
    Nothing,
    Resources(Resources),
    Ships(UnitCollection),
    Pirates(Box<CombatOutcome>),
}

impl ExpeditionOutcome {
    pub fn key(&self) -> &'static str {
        match self {
            ExpeditionOutcome::Nothing => "expedition.nothing",
            ExpeditionOutcome::Resources(_) => "expedition.resources",
            ExpeditionOutcome::Ships(_) => "expedition.ships",
            ExpeditionOutcome::Pirates(_) => "expedition.pirates",
        }
    }
}

/// Roll the outcome for an expedition fleet.
///
/// `fleet` is the combatant sent (with its owner's research), `carried`
/// the cargo it already holds.
pub fn explore(
    catalog: &Catalog,
    mission: MissionId,
    fleet: &Combatant,
    carried: &Resources,
) -> Result<ExpeditionOutcome, CombatError> {
    let rules = &catalog.balance.expedition;
    let mut rng = SimRng::for_expedition(mission);
    let weights = [
        rules.weight_nothing,
        rules.weight_resources,
        rules.weight_ships,
        rules.weight_pirates,
    ];

    let outcome = match rng.weighted(&weights) {
        Some(1) => {
            let found = rules.resource_find.scaled(rng.fraction()).floored();
            let capacity = cargo_capacity(catalog, &fleet.units)?;
            let free = capacity.saturating_sub(floor_u64(carried.total()));
            let taken = plunder(&found, Fixed64::ONE, free);
            if taken.is_empty() {
                ExpeditionOutcome::Nothing
            } else {
                ExpeditionOutcome::Resources(taken)
            }
        }
        Some(2) => {
            let share = rules.ship_find_ratio.saturating_mul(rng.fraction());
            let found = UnitCollection::from_pairs(fleet.units.iter().map(|(unit, n)| {
                (unit, floor_u64(Fixed64::saturating_from_num(n).saturating_mul(share)))
            }));
            if found.is_empty() {
                ExpeditionOutcome::Nothing
            } else {
                ExpeditionOutcome::Ships(found)
            }
        }
        Some(3) => {
            let pirates = Combatant {
                units: UnitCollection::from_pairs(fleet.units.iter().map(|(unit, n)| {
                    let scaled = floor_u64(
                        Fixed64::saturating_from_num(n).saturating_mul(rules.pirate_strength),
                    );
                    (unit, scaled.max(1))
                })),
                ..Combatant::default()
            };
            let battle = CombatResolver::new(catalog).resolve(
                mission,
                fleet,
                &pirates,
                &Resources::ZERO,
                carried,
            )?;
            ExpeditionOutcome::Pirates(Box::new(battle))
        }
        _ => ExpeditionOutcome::Nothing,
    };
    tracing::debug!(mission = ?mission, outcome = outcome.key(), "expedition explored");
    Ok(outcome)
}
