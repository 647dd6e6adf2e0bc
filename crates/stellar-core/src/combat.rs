//! Deterministic multi-round battle simulation.
//!
//! Every unit fights individually. Each round draws from its own
//! [`SimRng::for_round`] stream keyed by the mission id, so the same
//! manifests and seed always yield the same survivors, debris and loot.
//!
//! Per round:
//! 1. Every attacker unit fires at a uniformly chosen defender, then keeps
//!    firing while its rapid-fire roll against the last target succeeds.
//! 2. Defenders fire back the same way. Units hit to zero this round still
//!    fire; removal happens at the end of the round.
//! 3. Destroyed units are removed. The battle ends early once either side
//!    has nothing left.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogError, CombatRules, UnitRole};
use crate::fixed::{Fixed64, floor_u64};
use crate::id::{MissionId, UnitTypeId};
use crate::resources::Resources;
use crate::rng::SimRng;
use crate::travel::cargo_capacity;
use crate::units::UnitCollection;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// One side of a battle: its units and combat research levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Combatant {
    pub units: UnitCollection,
    pub weapons: u32,
    pub shielding: u32,
    pub armour: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Attacker,
    Defender,
    Draw,
}

/// Hit log of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub attacker_shots: u64,
    pub attacker_damage: Fixed64,
    pub defender_shots: u64,
    pub defender_damage: Fixed64,
    pub attacker_remaining: u64,
    pub defender_remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatOutcome {
    pub rounds: Vec<RoundSummary>,
    pub attacker_survivors: UnitCollection,
    pub defender_survivors: UnitCollection,
    pub attacker_losses: UnitCollection,
    /// Defender losses after defense repair.
    pub defender_losses: UnitCollection,
    /// Defense units rebuilt after the battle.
    pub repaired: UnitCollection,
    pub debris: Resources,
    pub loot: Resources,
    pub winner: Winner,
}

impl CombatOutcome {
    pub fn rounds_fought(&self) -> u32 {
        self.rounds.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombatError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{units} units on one side exceed the battle limit of {limit}")]
    TooManyUnits { units: u64, limit: u64 },
}

// ---------------------------------------------------------------------------
// Battle state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Fighter {
    unit: UnitTypeId,
    weapon: Fixed64,
    shield_max: Fixed64,
    shield: Fixed64,
    hull_max: Fixed64,
    hull: Fixed64,
}

impl Fighter {
    fn alive(&self) -> bool {
        self.hull > Fixed64::ZERO
    }
}

fn expand(catalog: &Catalog, side: &Combatant) -> Result<Vec<Fighter>, CombatError> {
    let rules = &catalog.balance.combat;
    let units = side.units.total();
    let too_many = CombatError::TooManyUnits {
        units,
        limit: rules.max_units_per_side,
    };
    if units > rules.max_units_per_side {
        return Err(too_many);
    }
    let capacity = usize::try_from(units).map_err(|_| too_many.clone())?;
    let factor = |level: u32| Fixed64::ONE + rules.tech_bonus.saturating_mul(Fixed64::from_num(level));
    let mut out = Vec::with_capacity(capacity);
    for (unit, count) in side.units.iter() {
        let spec = catalog.unit(unit)?;
        let hull = spec.hull().saturating_mul(factor(side.armour));
        let shield = spec.shield.saturating_mul(factor(side.shielding));
        let fighter = Fighter {
            unit,
            weapon: spec.weapon.saturating_mul(factor(side.weapons)),
            shield_max: shield,
            shield,
            hull_max: hull,
            hull,
        };
        // Each count is at most the side's total, which fits a usize.
        out.extend(std::iter::repeat_n(fighter, usize::try_from(count).unwrap_or(capacity)));
    }
    Ok(out)
}

fn census(fighters: &[Fighter]) -> UnitCollection {
    UnitCollection::from_pairs(fighters.iter().map(|f| (f.unit, 1)))
}

/// Resolve one shot. Returns the damage that landed on shield or hull.
fn hit(rules: &CombatRules, rng: &mut SimRng, weapon: Fixed64, target: &mut Fighter) -> Fixed64 {
    if !target.alive() {
        return Fixed64::ZERO;
    }
    if weapon < rules.shield_bounce.saturating_mul(target.shield_max) {
        return Fixed64::ZERO;
    }
    if weapon <= target.shield {
        target.shield -= weapon;
        return weapon;
    }
    let through = weapon - target.shield;
    target.shield = Fixed64::ZERO;
    target.hull = (target.hull - through).max(Fixed64::ZERO);
    if target.alive() {
        let integrity = target.hull / target.hull_max;
        if integrity < rules.explosion_threshold && rng.chance(Fixed64::ONE - integrity) {
            target.hull = Fixed64::ZERO;
        }
    }
    weapon
}

/// One side fires at the other. Returns `(shots, damage)`.
fn volley(
    catalog: &Catalog,
    rng: &mut SimRng,
    shooters: &[Fighter],
    targets: &mut [Fighter],
) -> Result<(u64, Fixed64), CatalogError> {
    let rules = &catalog.balance.combat;
    let mut shots = 0u64;
    let mut damage = Fixed64::ZERO;
    if targets.is_empty() {
        return Ok((0, damage));
    }
    for shooter in shooters {
        let spec = catalog.unit(shooter.unit)?;
        loop {
            let idx = rng.below(targets.len());
            shots += 1;
            damage = damage.saturating_add(hit(rules, rng, shooter.weapon, &mut targets[idx]));
            let rf = spec.rapid_fire_against(targets[idx].unit);
            if rf <= 1 {
                break;
            }
            let again = Fixed64::from_num(rf - 1) / Fixed64::from_num(rf);
            if !rng.chance(again) {
                break;
            }
        }
    }
    Ok((shots, damage))
}

// ---------------------------------------------------------------------------
// CombatResolver
// ---------------------------------------------------------------------------

/// Runs battles against a [`Catalog`].
#[derive(Debug, Clone, Copy)]
pub struct CombatResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> CombatResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Fight `attacker` against `defender`.
    ///
    /// `defender_stock` is what the defender's planet holds and `carried`
    /// what the attacking fleet already carries; a winning attacker loots
    /// from the former up to its surviving free cargo.
    pub fn resolve(
        &self,
        seed: MissionId,
        attacker: &Combatant,
        defender: &Combatant,
        defender_stock: &Resources,
        carried: &Resources,
    ) -> Result<CombatOutcome, CombatError> {
        let rules = &self.catalog.balance.combat;
        let mut atk = expand(self.catalog, attacker)?;
        let mut def = expand(self.catalog, defender)?;
        let mut rounds = Vec::new();

        for round in 1..=rules.max_rounds {
            if atk.is_empty() || def.is_empty() {
                break;
            }
            let mut rng = SimRng::for_round(seed, round);
            for f in atk.iter_mut().chain(def.iter_mut()) {
                f.shield = f.shield_max;
            }
            let (attacker_shots, attacker_damage) = volley(self.catalog, &mut rng, &atk, &mut def)?;
            let (defender_shots, defender_damage) = volley(self.catalog, &mut rng, &def, &mut atk)?;
            atk.retain(Fighter::alive);
            def.retain(Fighter::alive);
            rounds.push(RoundSummary {
                round,
                attacker_shots,
                attacker_damage,
                defender_shots,
                defender_damage,
                attacker_remaining: atk.len() as u64,
                defender_remaining: def.len() as u64,
            });
        }

        let attacker_survivors = census(&atk);
        let mut defender_survivors = census(&def);
        let attacker_losses = attacker.units.losses_against(&attacker_survivors);
        let raw_defender_losses = defender.units.losses_against(&defender_survivors);

        let winner = match (atk.is_empty(), def.is_empty()) {
            (false, true) => Winner::Attacker,
            (true, _) => Winner::Defender,
            (false, false) => Winner::Draw,
        };

        let debris = self.debris(&attacker_losses, &raw_defender_losses)?;
        let repaired = self.repair(seed, &raw_defender_losses)?;
        defender_survivors.merge(&repaired);
        let defender_losses = defender.units.losses_against(&defender_survivors);

        let loot = if winner == Winner::Attacker {
            let capacity = cargo_capacity(self.catalog, &attacker_survivors)?;
            let free = capacity.saturating_sub(floor_u64(carried.total()));
            plunder(defender_stock, rules.loot_fraction, free)
        } else {
            Resources::ZERO
        };

        tracing::debug!(
            mission = ?seed,
            rounds = rounds.len(),
            winner = ?winner,
            "battle resolved"
        );

        Ok(CombatOutcome {
            rounds,
            attacker_survivors,
            defender_survivors,
            attacker_losses,
            defender_losses,
            repaired,
            debris,
            loot,
            winner,
        })
    }

    /// Metal and crystal left by destroyed units.
    fn debris(&self, a: &UnitCollection, d: &UnitCollection) -> Result<Resources, CatalogError> {
        let rules = &self.catalog.balance.combat;
        let mut debris = Resources::ZERO;
        for (unit, count) in a.iter().chain(d.iter()) {
            let spec = self.catalog.unit(unit)?;
            let ratio = if spec.role == UnitRole::Defense {
                rules.defense_debris_ratio
            } else {
                rules.debris_ratio
            };
            let n = Fixed64::saturating_from_num(count);
            debris.metal = debris
                .metal
                .saturating_add(spec.cost.metal.saturating_mul(n).saturating_mul(ratio));
            debris.crystal = debris
                .crystal
                .saturating_add(spec.cost.crystal.saturating_mul(n).saturating_mul(ratio));
        }
        let debris = debris.rounded();
        if debris.structural() <= rules.min_debris {
            return Ok(Resources::ZERO);
        }
        Ok(debris)
    }

    /// Roll repair for each destroyed defense unit.
    fn repair(&self, seed: MissionId, losses: &UnitCollection) -> Result<UnitCollection, CatalogError> {
        let rules = &self.catalog.balance.combat;
        let mut rng = SimRng::for_round(seed, rules.max_rounds + 1);
        let mut repaired = UnitCollection::new();
        for (unit, count) in losses.iter() {
            if self.catalog.unit(unit)?.role != UnitRole::Defense {
                continue;
            }
            let rebuilt = (0..count)
                .filter(|_| rng.chance(rules.defense_repair_chance))
                .count() as u64;
            repaired.add(unit, rebuilt);
        }
        Ok(repaired)
    }
}

/// Split loot from `stock` into `capacity` units of cargo.
///
/// At most `fraction` of each resource is available. Metal takes up to a
/// third of the space, crystal up to half of what is left, deuterium the
/// rest; leftover space is then filled with metal and crystal.
pub fn plunder(stock: &Resources, fraction: Fixed64, capacity: u64) -> Resources {
    let (m, c, d) = stock.scaled(fraction).whole();
    let mut space = capacity;

    let mut metal = m.min(space / 3);
    space -= metal;
    let mut crystal = c.min(space / 2);
    space -= crystal;
    let deuterium = d.min(space);
    space -= deuterium;

    let extra = (m - metal).min(space / 2);
    metal += extra;
    space -= extra;
    let extra = (c - crystal).min(space);
    crystal += extra;

    Resources::new(
        u32::try_from(metal).unwrap_or(u32::MAX),
        u32::try_from(crystal).unwrap_or(u32::MAX),
        u32::try_from(deuterium).unwrap_or(u32::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Balance, DriveKind, UnitSpec};

    // Helpers ---------------------------------------------------------------

    const FIGHTER: UnitTypeId = UnitTypeId(0);
    const CRUISER: UnitTypeId = UnitTypeId(1);
    const TURRET: UnitTypeId = UnitTypeId(2);
    const CARGO: UnitTypeId = UnitTypeId(3);

    fn spec(id: UnitTypeId, role: UnitRole, cost: Resources, weapon: u32, shield: u32, cargo: u64) -> UnitSpec {
        UnitSpec {
            id,
            name: format!("u{}", id.0),
            role,
            cost,
            weapon: Fixed64::from_num(weapon),
            shield: Fixed64::from_num(shield),
            speed: 10_000,
            drive: DriveKind::Combustion,
            cargo,
            fuel: 20,
            rapid_fire: vec![],
            requirements: vec![],
        }
    }

    fn catalog() -> Catalog {
        let mut c = Catalog::new(Balance::default());
        c.register_unit(spec(FIGHTER, UnitRole::Ship, Resources::new(3_000, 1_000, 0), 50, 10, 50))
            .unwrap();
        let mut cruiser = spec(CRUISER, UnitRole::Ship, Resources::new(20_000, 7_000, 2_000), 400, 50, 800);
        cruiser.rapid_fire = vec![(FIGHTER, 6)];
        c.register_unit(cruiser).unwrap();
        c.register_unit(spec(TURRET, UnitRole::Defense, Resources::new(2_000, 0, 0), 80, 20, 0))
            .unwrap();
        c.register_unit(spec(CARGO, UnitRole::Ship, Resources::new(2_000, 2_000, 0), 5, 10, 5_000))
            .unwrap();
        c
    }

    fn side(pairs: &[(UnitTypeId, u64)]) -> Combatant {
        Combatant {
            units: UnitCollection::from_pairs(pairs.iter().copied()),
            ..Combatant::default()
        }
    }

    // -----------------------------------------------------------------------
    // Test 1: Same seed, same result
    // -----------------------------------------------------------------------
    #[test]
    fn identical_seed_identical_outcome() {
        let c = catalog();
        let r = CombatResolver::new(&c);
        let a = side(&[(FIGHTER, 5)]);
        let d = side(&[(FIGHTER, 5)]);
        let first = r.resolve(MissionId(42), &a, &d, &Resources::ZERO, &Resources::ZERO).unwrap();
        for _ in 0..5 {
            let again = r.resolve(MissionId(42), &a, &d, &Resources::ZERO, &Resources::ZERO).unwrap();
            assert_eq!(again, first);
        }
        assert!(first.rounds_fought() >= 1 && first.rounds_fought() <= 6);
    }

    // -----------------------------------------------------------------------
    // Test 2: Losses and survivors add up to the starting fleets
    // -----------------------------------------------------------------------
    #[test]
    fn survivors_plus_losses_conserve_units() {
        let c = catalog();
        let r = CombatResolver::new(&c);
        let a = side(&[(FIGHTER, 20), (CRUISER, 2)]);
        let d = side(&[(FIGHTER, 10), (TURRET, 8)]);
        let out = r.resolve(MissionId(7), &a, &d, &Resources::ZERO, &Resources::ZERO).unwrap();
        let mut back = out.attacker_survivors.clone();
        back.merge(&out.attacker_losses);
        assert_eq!(back, a.units);
        let mut back = out.defender_survivors.clone();
        back.merge(&out.defender_losses);
        assert_eq!(back, d.units);
    }

    // -----------------------------------------------------------------------
    // Test 3: Undefended planet is a zero-round attacker win
    // -----------------------------------------------------------------------
    #[test]
    fn empty_defender_means_attacker_wins_with_loot() {
        let c = catalog();
        let r = CombatResolver::new(&c);
        let a = side(&[(CARGO, 1)]);
        let stock = Resources::new(9_000, 3_000, 600);
        let out = r.resolve(MissionId(1), &a, &Combatant::default(), &stock, &Resources::ZERO).unwrap();
        assert_eq!(out.winner, Winner::Attacker);
        assert_eq!(out.rounds_fought(), 0);
        assert_eq!(out.debris, Resources::ZERO);
        // Available: 4500 / 1500 / 300 into 5000 cargo.
        assert_eq!(out.loot, Resources::new(2_433, 1_500, 300));
    }

    // -----------------------------------------------------------------------
    // Test 4: Overwhelming force wins and leaves debris
    // -----------------------------------------------------------------------
    #[test]
    fn overwhelming_attacker_wins() {
        let c = catalog();
        let r = CombatResolver::new(&c);
        let a = side(&[(CRUISER, 30)]);
        let d = side(&[(FIGHTER, 3)]);
        let out = r.resolve(MissionId(99), &a, &d, &Resources::ZERO, &Resources::ZERO).unwrap();
        assert_eq!(out.winner, Winner::Attacker);
        assert!(out.defender_survivors.is_empty());
        // 3 fighters x (3000, 1000) x 30%.
        assert_eq!(out.debris, Resources::new(2_700, 900, 0));
    }

    // -----------------------------------------------------------------------
    // Test 5: Defenses are repaired and leave no debris
    // -----------------------------------------------------------------------
    #[test]
    fn destroyed_defenses_may_be_repaired() {
        let c = catalog();
        let r = CombatResolver::new(&c);
        let a = side(&[(CRUISER, 50)]);
        let d = side(&[(TURRET, 40)]);
        let out = r.resolve(MissionId(3), &a, &d, &Resources::ZERO, &Resources::ZERO).unwrap();
        assert_eq!(out.winner, Winner::Attacker);
        assert!(out.attacker_losses.is_empty());
        assert!(out.repaired.get(TURRET) > 0);
        assert_eq!(out.debris, Resources::ZERO);
        assert_eq!(
            out.defender_losses.get(TURRET) + out.defender_survivors.get(TURRET),
            40
        );
    }

    #[test]
    fn oversized_side_is_refused_before_allocation() {
        let mut c = catalog();
        c.balance.combat.max_units_per_side = 10;
        let r = CombatResolver::new(&c);
        let a = side(&[(FIGHTER, 6), (CRUISER, 5)]);
        let d = side(&[(FIGHTER, 1)]);
        assert_eq!(
            r.resolve(MissionId(5), &a, &d, &Resources::ZERO, &Resources::ZERO),
            Err(CombatError::TooManyUnits { units: 11, limit: 10 })
        );

        let c = catalog();
        let r = CombatResolver::new(&c);
        let horde = side(&[(FIGHTER, u64::MAX), (TURRET, u64::MAX)]);
        assert_eq!(
            r.resolve(MissionId(5), &d, &horde, &Resources::ZERO, &Resources::ZERO),
            Err(CombatError::TooManyUnits {
                units: u64::MAX,
                limit: c.balance.combat.max_units_per_side,
            })
        );
    }

    // -----------------------------------------------------------------------
    // Test 6: Loot split
    // -----------------------------------------------------------------------
    #[test]
    fn plunder_three_pass_split() {
        let half = Fixed64::from_num(0.5);
        // Plenty of everything: a third, half the rest, then the remainder.
        let loot = plunder(&Resources::new(100_000, 100_000, 100_000), half, 9_000);
        assert_eq!(loot, Resources::new(3_000, 3_000, 3_000));
        // Little deuterium leaves room for a second metal pass.
        let loot = plunder(&Resources::new(100_000, 100_000, 0), half, 9_000);
        assert_eq!(loot, Resources::new(4_500, 4_500, 0));
        // Capacity larger than available takes everything available.
        let loot = plunder(&Resources::new(1_000, 500, 200), half, 1_000_000);
        assert_eq!(loot, Resources::new(500, 250, 100));
        // No cargo, no loot.
        assert_eq!(plunder(&Resources::new(1_000, 1_000, 1_000), half, 0), Resources::ZERO);
    }
}
