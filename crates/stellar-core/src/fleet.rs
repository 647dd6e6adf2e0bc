//! Fleet mission state machine.
//!
//! [`FleetMissionEngine`] is pure: it validates dispatches against rows the
//! caller has read, and turns a due mission plus the rows it touches into
//! [`ArrivalEffects`]. Persisting those effects atomically is the job of
//! [`crate::engine::Engine`].
//!
//! Each mission type has one handler, selected by a single match in
//! [`FleetMissionEngine::resolve`]. Return trips share the home-landing
//! handler whatever their mission type.

use crate::catalog::{Catalog, CatalogError, ResearchRole, UnitRole};
use crate::clock::{Timestamp, after, seconds_between};
use crate::combat::{CombatError, CombatOutcome, CombatResolver, Combatant, Winner};
use crate::coords::Coordinate;
use crate::error::{DestinationIssue, InvariantViolation, ValidationError};
use crate::espionage::{info_level, spy};
use crate::expedition::{ExpeditionOutcome, explore};
use crate::fixed::{Fixed64, Seconds, floor_u64};
use crate::id::{MissionId, PlanetId, PlayerId};
use crate::message::{MessageCategory, OutcomeMessage, resources_value, units_value};
use crate::mission::{FleetMission, MissionType};
use crate::planet::{DebrisField, Planet, Player};
use crate::resources::Resources;
use crate::travel;
use crate::units::UnitCollection;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A player's request to send a fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub origin: PlanetId,
    pub destination: Coordinate,
    pub mission: MissionType,
    pub units: UnitCollection,
    pub cargo: Resources,
    pub speed_percent: u32,
}

/// Rows dispatch validation reads besides the origin planet.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub player: &'a Player,
    /// Planet at the destination coordinate, if any.
    pub target: Option<&'a Planet>,
    /// Debris field at the destination slot, if any.
    pub debris: Option<&'a DebrisField>,
    /// Unprocessed missions the player owns.
    pub active_missions: u32,
    pub planet_count: u32,
}

/// Distance, flight time and fuel of a prospective flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightPlan {
    pub distance: u64,
    pub duration: Seconds,
    pub fuel: u64,
}

// ---------------------------------------------------------------------------
// Arrival
// ---------------------------------------------------------------------------

/// A due mission with every row its arrival may touch, read at one
/// consistent version. `target` has been accrued to the arrival instant.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub mission: FleetMission,
    pub owner: Player,
    /// Planet at the mission's destination (the home planet for a return).
    pub target: Option<Planet>,
    pub target_owner: Option<Player>,
    pub debris: Option<DebrisField>,
    /// Planets the mission owner holds now.
    pub owner_planets: u32,
    /// Preallocated id for a return trip.
    pub return_id: MissionId,
    /// Preallocated id for a new colony.
    pub colony_id: PlanetId,
}

/// What an arrival does to the debris field at its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum DebrisChange {
    Unchanged,
    Put(DebrisField),
    Delete(Coordinate),
}

/// Rows to write for one processed arrival, plus the messages to deliver
/// once they are committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalEffects {
    /// The mission, marked processed.
    pub mission: FleetMission,
    /// Updated destination planet, when the arrival changed it.
    pub target: Option<Planet>,
    pub debris: DebrisChange,
    pub colony: Option<Planet>,
    pub return_trip: Option<FleetMission>,
    pub messages: Vec<OutcomeMessage>,
}

fn missing(e: CatalogError) -> InvariantViolation {
    InvariantViolation::MissingCatalogEntry(e).logged()
}

fn battle_failed(mission: MissionId, e: CombatError) -> InvariantViolation {
    match e {
        CombatError::Catalog(e) => missing(e),
        CombatError::TooManyUnits { units, limit } => {
            InvariantViolation::BattleTooLarge { mission, units, limit }.logged()
        }
    }
}

/// Credit `extra` to a planet's stock.
fn credit(planet: &mut Planet, extra: &Resources) -> Result<(), InvariantViolation> {
    planet.resources = planet
        .resources
        .checked_add(extra)
        .ok_or_else(|| InvariantViolation::StockOverflow(planet.id).logged())?;
    Ok(())
}

/// Add `extra` to what mission `m` carries.
fn load(m: &FleetMission, extra: &Resources) -> Result<Resources, InvariantViolation> {
    m.cargo
        .checked_add(extra)
        .ok_or_else(|| InvariantViolation::PayloadOverflow(m.id).logged())
}

fn invalid(destination: Coordinate, issue: DestinationIssue) -> ValidationError {
    ValidationError::InvalidDestination { destination, issue }
}

fn whole(metal: u64, crystal: u64, deuterium: u64) -> Resources {
    Resources {
        metal: Fixed64::saturating_from_num(metal),
        crystal: Fixed64::saturating_from_num(crystal),
        deuterium: Fixed64::saturating_from_num(deuterium),
        energy: Fixed64::ZERO,
    }
}

// ---------------------------------------------------------------------------
// FleetMissionEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct FleetMissionEngine<'a> {
    catalog: &'a Catalog,
}

impl<'a> FleetMissionEngine<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Missions a player may have in flight at once.
    pub fn fleet_slots(&self, player: &Player) -> u32 {
        self.catalog.balance.base_fleet_slots
            + self.catalog.research_level(&player.research, ResearchRole::Computer)
    }

    /// Distance, duration and fuel for `units` flying `from` -> `to`.
    pub fn plan_flight(
        &self,
        from: &Coordinate,
        to: &Coordinate,
        units: &UnitCollection,
        player: &Player,
        speed_percent: u32,
    ) -> Result<FlightPlan, CatalogError> {
        let rules = &self.catalog.balance.travel;
        let distance = travel::distance(rules, from, to);
        let slowest = travel::slowest_speed(self.catalog, units, player)?;
        Ok(FlightPlan {
            distance,
            duration: travel::duration(rules, distance, slowest, speed_percent),
            fuel: travel::fuel(self.catalog, units, distance, speed_percent)?,
        })
    }

    fn count_role(&self, units: &UnitCollection, role: UnitRole) -> u64 {
        units
            .iter()
            .filter(|(u, _)| self.catalog.unit(*u).is_ok_and(|s| s.role == role))
            .map(|(_, n)| n)
            .sum()
    }

    fn require_role(&self, units: &UnitCollection, role: UnitRole) -> Result<(), ValidationError> {
        if self.count_role(units, role) == 0 {
            return Err(ValidationError::MissingRole(role));
        }
        Ok(())
    }

    /// Validate a dispatch and take its units, cargo and fuel off `origin`.
    ///
    /// `origin` must be accrued to `now`. On error `origin` is untouched.
    /// The returned mission is not yet persisted.
    pub fn plan_dispatch(
        &self,
        request: &DispatchRequest,
        id: MissionId,
        origin: &mut Planet,
        ctx: &DispatchContext<'_>,
        now: Timestamp,
    ) -> Result<FleetMission, ValidationError> {
        let player = ctx.player;
        let dest = request.destination;
        let rules = &self.catalog.balance.travel;

        if origin.owner != player.id {
            return Err(ValidationError::NotOwner {
                player: player.id,
                planet: origin.id,
            });
        }
        travel::validate_speed(request.speed_percent)?;
        if request.units.is_empty() {
            return Err(ValidationError::EmptyFleet);
        }
        let (units, limit) = (request.units.total(), self.catalog.balance.combat.max_units_per_side);
        if units > limit {
            return Err(ValidationError::FleetTooLarge { units, limit });
        }
        for (unit, _) in request.units.iter() {
            if !self.catalog.unit(unit)?.is_ship() {
                return Err(ValidationError::StationaryUnit(unit));
            }
        }

        let expedition = request.mission == MissionType::Expedition;
        travel::validate_coordinate(rules, &dest, expedition)?;
        if expedition && dest.position != rules.expedition_position {
            return Err(invalid(dest, DestinationIssue::ExpeditionSlot));
        }
        if dest == origin.coordinate {
            return Err(invalid(dest, DestinationIssue::SameAsOrigin));
        }
        self.check_destination(request, ctx)?;

        let max = self.fleet_slots(player);
        if ctx.active_missions >= max {
            return Err(ValidationError::FleetSlotsExceeded {
                used: ctx.active_missions,
                max,
            });
        }

        let cargo = Resources {
            energy: Fixed64::ZERO,
            ..request.cargo.floored()
        };
        let capacity = travel::cargo_capacity(self.catalog, &request.units)?;
        let requested = floor_u64(cargo.total());
        if requested > capacity {
            return Err(ValidationError::InsufficientCargo { requested, capacity });
        }

        let mut remaining = origin.units.clone();
        remaining.subtract(&request.units)?;

        let plan = self.plan_flight(&origin.coordinate, &dest, &request.units, player, request.speed_percent)?;
        let after_cargo = origin.resources.checked_sub(&cargo).ok_or(
            ValidationError::InsufficientResources {
                needed: cargo.whole(),
                available: origin.resources.whole(),
            },
        )?;
        let fuel = whole(0, 0, plan.fuel);
        let after_fuel = after_cargo
            .checked_sub(&fuel)
            .ok_or(ValidationError::InsufficientFuel {
                needed: plan.fuel,
                available: floor_u64(after_cargo.deuterium),
            })?;

        origin.units = remaining;
        origin.resources = after_fuel;

        tracing::info!(
            mission = ?id,
            owner = ?player.id,
            kind = request.mission.key(),
            from = %origin.coordinate,
            to = %dest,
            duration = plan.duration,
            fuel = plan.fuel,
            "fleet dispatched"
        );

        Ok(FleetMission {
            id,
            owner: player.id,
            mission_type: request.mission,
            origin: origin.coordinate,
            origin_planet: Some(origin.id),
            destination: dest,
            destination_planet: ctx.target.map(|p| p.id),
            target_owner: ctx.target.map(|p| p.owner),
            units: request.units.clone(),
            cargo,
            speed_percent: request.speed_percent,
            fuel_cost: plan.fuel,
            time_departure: now,
            time_arrival: after(now, plan.duration),
            processed: false,
            parent: None,
            recalled: false,
        })
    }

    /// Mission-type specific destination rules.
    fn check_destination(&self, request: &DispatchRequest, ctx: &DispatchContext<'_>) -> Result<(), ValidationError> {
        let dest = request.destination;
        let owner = ctx.player.id;
        match request.mission {
            MissionType::Transport => {
                if ctx.target.is_none() {
                    return Err(invalid(dest, DestinationIssue::NoPlanet));
                }
            }
            MissionType::Deployment => match ctx.target {
                None => return Err(invalid(dest, DestinationIssue::NoPlanet)),
                Some(p) if p.owner != owner => return Err(invalid(dest, DestinationIssue::ForeignPlanet)),
                Some(_) => {}
            },
            MissionType::Attack | MissionType::Espionage => {
                match ctx.target {
                    None => return Err(invalid(dest, DestinationIssue::NoPlanet)),
                    Some(p) if p.owner == owner => return Err(invalid(dest, DestinationIssue::OwnPlanet)),
                    Some(_) => {}
                }
                if request.mission == MissionType::Espionage {
                    self.require_role(&request.units, UnitRole::Probe)?;
                }
            }
            MissionType::Colonization => {
                if ctx.target.is_some() {
                    return Err(invalid(dest, DestinationIssue::Occupied));
                }
                if dest.is_moon {
                    return Err(invalid(dest, DestinationIssue::OutOfRange));
                }
                self.require_role(&request.units, UnitRole::Colonizer)?;
                let max = self.catalog.balance.max_planets;
                if ctx.planet_count >= max {
                    return Err(ValidationError::PlanetLimitReached(max));
                }
            }
            MissionType::Harvest => {
                self.require_role(&request.units, UnitRole::Recycler)?;
                if ctx.debris.is_none_or(DebrisField::is_empty) {
                    return Err(invalid(dest, DestinationIssue::NoDebris));
                }
            }
            MissionType::Expedition => {}
        }
        Ok(())
    }

    /// Turn an outward mission around at `now`.
    ///
    /// Returns the outward mission (processed, recalled) and its return
    /// trip, which flies back for as long as the fleet was out.
    pub fn recall(
        &self,
        mission: &FleetMission,
        player: PlayerId,
        return_id: MissionId,
        now: Timestamp,
    ) -> Result<(FleetMission, FleetMission), ValidationError> {
        if mission.owner != player || mission.is_return() || mission.processed || now >= mission.time_arrival {
            return Err(ValidationError::NotRecallable(mission.id));
        }
        let elapsed = seconds_between(mission.time_departure, now).max(0);
        let mut outward = mission.clone();
        outward.processed = true;
        outward.recalled = true;
        let back = mission.return_trip(return_id, now, elapsed, mission.units.clone(), mission.cargo);
        tracing::info!(mission = ?mission.id, return_trip = ?return_id, elapsed, "fleet recalled");
        Ok((outward, back))
    }

    // -----------------------------------------------------------------------
    // Arrival resolution
    // -----------------------------------------------------------------------

    /// Compute everything a due mission's arrival changes.
    pub fn resolve(&self, arrival: &Arrival) -> Result<ArrivalEffects, InvariantViolation> {
        let m = &arrival.mission;
        if m.processed {
            return Err(InvariantViolation::MissionReprocessed(m.id).logged());
        }
        if m.time_arrival < m.time_departure {
            return Err(InvariantViolation::MissionTimeline(m.id).logged());
        }
        if m.units.is_empty() {
            return Err(InvariantViolation::EmptyMission(m.id).logged());
        }

        let mut fx = ArrivalEffects {
            mission: FleetMission {
                processed: true,
                ..m.clone()
            },
            target: None,
            debris: DebrisChange::Unchanged,
            colony: None,
            return_trip: None,
            messages: Vec::new(),
        };

        if m.is_return() {
            self.land_home(arrival, &mut fx)?;
        } else {
            match m.mission_type {
                MissionType::Transport => self.transport(arrival, &mut fx)?,
                MissionType::Deployment => self.deploy(arrival, &mut fx)?,
                MissionType::Attack => self.attack(arrival, &mut fx)?,
                MissionType::Espionage => self.espionage(arrival, &mut fx)?,
                MissionType::Colonization => self.colonize(arrival, &mut fx)?,
                MissionType::Harvest => self.harvest(arrival, &mut fx)?,
                MissionType::Expedition => self.expedition(arrival, &mut fx)?,
            }
        }

        tracing::debug!(
            mission = ?m.id,
            kind = m.mission_type.key(),
            returning = m.is_return(),
            at = %m.time_arrival,
            return_trip = ?fx.return_trip.as_ref().map(|r| r.id),
            "mission processed"
        );
        Ok(fx)
    }

    fn note(&self, m: &FleetMission, recipient: PlayerId, category: MessageCategory, key: &str) -> OutcomeMessage {
        OutcomeMessage::new(recipient, category, key, m.time_arrival)
            .with("mission", m.id.0)
            .with("origin", m.origin.to_string())
            .with("destination", m.destination.to_string())
    }

    fn send_home(
        &self,
        a: &Arrival,
        units: UnitCollection,
        cargo: Resources,
    ) -> Result<FleetMission, InvariantViolation> {
        let m = &a.mission;
        if m.origin_planet.is_none() {
            return Err(InvariantViolation::MissingHome(m.id).logged());
        }
        Ok(m.return_trip(a.return_id, m.time_arrival, m.duration(), units, cargo))
    }

    fn combatant(&self, units: &UnitCollection, player: Option<&Player>) -> Combatant {
        let level = |role| player.map_or(0, |p| self.catalog.research_level(&p.research, role));
        Combatant {
            units: units.clone(),
            weapons: level(ResearchRole::Weapons),
            shielding: level(ResearchRole::Shielding),
            armour: level(ResearchRole::Armour),
        }
    }

    /// Target planet owned by the mission owner, if it still is.
    fn own_target<'b>(&self, a: &'b Arrival) -> Option<&'b Planet> {
        a.target.as_ref().filter(|p| p.owner == a.mission.owner)
    }

    fn land_home(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let Some(home) = self.own_target(a) else {
            tracing::warn!(mission = ?m.id, home = %m.destination, "home planet gone, fleet lost");
            fx.messages.push(
                self.note(m, m.owner, MessageCategory::Fleet, "return.lost")
                    .with("units", units_value(&m.units)),
            );
            return Ok(());
        };
        let mut home = home.clone();
        home.units.merge(&m.units);
        credit(&mut home, &m.cargo)?;
        fx.target = Some(home);

        let key = if m.cargo.is_empty() {
            "return.no_goods"
        } else {
            "return.arrived"
        };
        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Fleet, key)
                .with_resources(&m.cargo)
                .with("units", units_value(&m.units)),
        );
        Ok(())
    }

    fn transport(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let Some(target) = &a.target else {
            fx.messages.push(self.note(m, m.owner, MessageCategory::Fleet, "transport.failed"));
            fx.return_trip = Some(self.send_home(a, m.units.clone(), m.cargo)?);
            return Ok(());
        };
        let mut target = target.clone();
        credit(&mut target, &m.cargo)?;

        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Fleet, "transport.arrived")
                .with("planet", target.name.clone())
                .with_resources(&m.cargo),
        );
        if target.owner != m.owner {
            fx.messages.push(
                self.note(m, target.owner, MessageCategory::Fleet, "transport.received")
                    .with("sender", m.owner.0)
                    .with("planet", target.name.clone())
                    .with_resources(&m.cargo),
            );
        }
        fx.target = Some(target);
        fx.return_trip = Some(self.send_home(a, m.units.clone(), Resources::ZERO)?);
        Ok(())
    }

    fn deploy(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let Some(target) = self.own_target(a) else {
            fx.messages.push(self.note(m, m.owner, MessageCategory::Fleet, "deployment.failed"));
            fx.return_trip = Some(self.send_home(a, m.units.clone(), m.cargo)?);
            return Ok(());
        };
        let mut target = target.clone();
        target.units.merge(&m.units);
        credit(&mut target, &m.cargo)?;
        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Fleet, "deployment.arrived")
                .with("planet", target.name.clone())
                .with_resources(&m.cargo)
                .with("units", units_value(&m.units)),
        );
        fx.target = Some(target);
        Ok(())
    }

    fn attack(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let Some(target) = &a.target else {
            fx.messages.push(self.note(m, m.owner, MessageCategory::Combat, "attack.no_target"));
            fx.return_trip = Some(self.send_home(a, m.units.clone(), m.cargo)?);
            return Ok(());
        };

        let attacker = self.combatant(&m.units, Some(&a.owner));
        let defender = self.combatant(&target.units, a.target_owner.as_ref());
        let battle = CombatResolver::new(self.catalog)
            .resolve(m.id, &attacker, &defender, &target.resources, &m.cargo)
            .map_err(|e| battle_failed(m.id, e))?;

        let mut planet = target.clone();
        planet.units = battle.defender_survivors.clone();
        planet.resources = planet
            .resources
            .checked_sub(&battle.loot)
            .ok_or_else(|| InvariantViolation::NegativeStock(planet.id).logged())?;

        if !battle.debris.is_empty() {
            fx.debris = DebrisChange::Put(self.grow_debris(a, &battle.debris)?);
        }

        tracing::info!(
            mission = ?m.id,
            attacker = ?m.owner,
            defender = ?planet.owner,
            at = %m.destination,
            winner = ?battle.winner,
            "battle fought"
        );

        let report = combat_report(self.note(m, m.owner, MessageCategory::Combat, "combat.report"), &battle);
        if planet.owner != m.owner {
            fx.messages.push(combat_report(
                self.note(m, planet.owner, MessageCategory::Combat, "combat.report"),
                &battle,
            ));
        }
        fx.messages.insert(0, report);

        if !battle.attacker_survivors.is_empty() {
            let cargo = load(m, &battle.loot)?;
            fx.return_trip = Some(self.send_home(a, battle.attacker_survivors.clone(), cargo)?);
        }
        fx.target = Some(planet);
        Ok(())
    }

    fn grow_debris(&self, a: &Arrival, extra: &Resources) -> Result<DebrisField, InvariantViolation> {
        let mut field = a
            .debris
            .clone()
            .unwrap_or_else(|| DebrisField::new(a.mission.destination.slot()));
        field.resources = field
            .resources
            .checked_add(extra)
            .ok_or_else(|| InvariantViolation::DebrisOverflow(field.slot).logged())?;
        Ok(field)
    }

    fn espionage(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        fx.return_trip = Some(self.send_home(a, m.units.clone(), m.cargo)?);
        let Some(target) = &a.target else {
            fx.messages.push(self.note(m, m.owner, MessageCategory::Espionage, "espionage.no_target"));
            return Ok(());
        };

        let probes = self.count_role(&m.units, UnitRole::Probe);
        let own = self.catalog.research_level(&a.owner.research, ResearchRole::Espionage);
        let victim = a
            .target_owner
            .clone()
            .unwrap_or_else(|| Player::new(target.owner, String::new()));
        let theirs = self.catalog.research_level(&victim.research, ResearchRole::Espionage);
        let level = info_level(probes, own, theirs);
        let report = spy(self.catalog, &self.catalog.balance.espionage, level, target, &victim);

        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Espionage, "espionage.report")
                .with_params(report.to_params()),
        );
        if target.owner != m.owner {
            fx.messages.push(
                self.note(m, target.owner, MessageCategory::Espionage, "espionage.detected")
                    .with("spy", m.owner.0)
                    .with("probes", probes),
            );
        }
        Ok(())
    }

    fn colonize(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let max = self.catalog.balance.max_planets;
        let colonizer = m
            .units
            .iter()
            .map(|(u, _)| u)
            .find(|u| self.catalog.unit(*u).is_ok_and(|s| s.role == UnitRole::Colonizer));

        let failure = if a.target.is_some() {
            Some("occupied")
        } else if a.owner_planets >= max {
            Some("planet_limit")
        } else if colonizer.is_none() {
            Some("no_colonizer")
        } else {
            None
        };
        if let Some(reason) = failure {
            fx.messages.push(
                self.note(m, m.owner, MessageCategory::Colonization, "colonization.failed")
                    .with("reason", reason),
            );
            fx.return_trip = Some(self.send_home(a, m.units.clone(), m.cargo)?);
            return Ok(());
        }

        let mut units = m.units.clone();
        if let Some(ship) = colonizer {
            units
                .remove(ship, 1)
                .map_err(|shortfall| InvariantViolation::UnitUnderflow {
                    planet: a.colony_id,
                    shortfall,
                })?;
        }
        let mut colony = Planet::new(
            a.colony_id,
            m.owner,
            "Colony",
            m.destination,
            self.catalog.balance.planet_fields,
            m.time_arrival,
        );
        colony.resources = m.cargo;
        colony.units = units;

        tracing::info!(mission = ?m.id, owner = ?m.owner, planet = ?colony.id, at = %m.destination, "colony founded");
        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Colonization, "colonization.succeeded")
                .with("planet", colony.id.0)
                .with_resources(&m.cargo),
        );
        fx.colony = Some(colony);
        Ok(())
    }

    fn harvest(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let recyclers = m
            .units
            .filtered(|u| self.catalog.unit(u).is_ok_and(|s| s.role == UnitRole::Recycler));
        let recycler_space = travel::cargo_capacity(self.catalog, &recyclers).map_err(missing)?;
        let fleet_space = travel::cargo_capacity(self.catalog, &m.units)
            .map_err(missing)?
            .saturating_sub(floor_u64(m.cargo.total()));
        let mut space = recycler_space.min(fleet_space);

        let field = a.debris.clone();
        let (fm, fc, _) = field.as_ref().map_or((0, 0, 0), |f| f.resources.whole());
        let metal = fm.min(space);
        space -= metal;
        let crystal = fc.min(space);
        let collected = whole(metal, crystal, 0);

        if let Some(mut field) = field {
            field.resources = field.resources.checked_sub(&collected).unwrap_or(Resources::ZERO);
            fx.debris = if field.is_empty() {
                DebrisChange::Delete(field.slot)
            } else {
                DebrisChange::Put(field)
            };
        }

        fx.messages.push(
            self.note(m, m.owner, MessageCategory::Harvest, "harvest.report")
                .with_resources(&collected)
                .with("remaining_metal", fm - metal)
                .with("remaining_crystal", fc - crystal),
        );
        let cargo = load(m, &collected)?;
        fx.return_trip = Some(self.send_home(a, m.units.clone(), cargo)?);
        Ok(())
    }

    fn expedition(&self, a: &Arrival, fx: &mut ArrivalEffects) -> Result<(), InvariantViolation> {
        let m = &a.mission;
        let fleet = self.combatant(&m.units, Some(&a.owner));
        let outcome = explore(self.catalog, m.id, &fleet, &m.cargo).map_err(|e| battle_failed(m.id, e))?;
        let message = self.note(m, m.owner, MessageCategory::Expedition, outcome.key());

        let (units, cargo, message) = match outcome {
            ExpeditionOutcome::Nothing => (m.units.clone(), m.cargo, message),
            ExpeditionOutcome::Resources(found) => {
                (m.units.clone(), load(m, &found)?, message.with_resources(&found))
            }
            ExpeditionOutcome::Ships(found) => {
                let mut units = m.units.clone();
                units.merge(&found);
                (units, m.cargo, message.with("units", units_value(&found)))
            }
            ExpeditionOutcome::Pirates(battle) => {
                let message = message
                    .with("winner", winner_key(battle.winner))
                    .with("losses", units_value(&battle.attacker_losses));
                (battle.attacker_survivors, m.cargo, message)
            }
        };
        fx.messages.push(message);
        if !units.is_empty() {
            fx.return_trip = Some(self.send_home(a, units, cargo)?);
        }
        Ok(())
    }
}

fn winner_key(winner: Winner) -> &'static str {
    match winner {
        Winner::Attacker => "attacker",
        Winner::Defender => "defender",
        Winner::Draw => "draw",
    }
}

fn combat_report(message: OutcomeMessage, battle: &CombatOutcome) -> OutcomeMessage {
    message
        .with("winner", winner_key(battle.winner))
        .with("rounds", battle.rounds_fought())
        .with("attacker_losses", units_value(&battle.attacker_losses))
        .with("defender_losses", units_value(&battle.defender_losses))
        .with("repaired", units_value(&battle.repaired))
        .with("loot", resources_value(&battle.loot))
        .with("debris", resources_value(&battle.debris))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Coordinate;
    use crate::test_utils::*;
    use serde_json::json;

    // Helpers ---------------------------------------------------------------

    fn home() -> Planet {
        let mut p = Planet::new(PlanetId(1), PlayerId(1), "Home", Coordinate::planet(1, 100, 4), 163, t(0));
        p.resources = Resources::new(50_000, 50_000, 50_000);
        p.units = UnitCollection::from_pairs([
            (SMALL_CARGO, 5),
            (LIGHT_FIGHTER, 10),
            (COLONY_SHIP, 1),
            (RECYCLER, 2),
            (PROBE, 3),
            (ROCKET_LAUNCHER, 4),
        ]);
        p
    }

    fn other(owner: u64, position: u8) -> Planet {
        Planet::new(
            PlanetId(10 + u64::from(position)),
            PlayerId(owner),
            "Other",
            Coordinate::planet(1, 100, position),
            163,
            t(0),
        )
    }

    fn request(mission: MissionType, to: Coordinate, units: &[(crate::id::UnitTypeId, u64)]) -> DispatchRequest {
        DispatchRequest {
            origin: PlanetId(1),
            destination: to,
            mission,
            units: UnitCollection::from_pairs(units.iter().copied()),
            cargo: Resources::ZERO,
            speed_percent: 100,
        }
    }

    fn ctx<'a>(player: &'a Player, target: Option<&'a Planet>) -> DispatchContext<'a> {
        DispatchContext {
            player,
            target,
            debris: None,
            active_missions: 0,
            planet_count: 1,
        }
    }

    fn arrival(mission: FleetMission, target: Option<Planet>) -> Arrival {
        let target_owner = target.as_ref().map(|p| Player::new(p.owner, "them"));
        Arrival {
            owner: Player::new(mission.owner, "me"),
            mission,
            target,
            target_owner,
            debris: None,
            owner_planets: 1,
            return_id: MissionId(99),
            colony_id: PlanetId(77),
        }
    }

    // -----------------------------------------------------------------------
    // Test 1: Dispatch takes units, cargo and fuel off the origin
    // -----------------------------------------------------------------------
    #[test]
    fn dispatch_deducts_units_cargo_and_fuel() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(1, 8);
        let mut origin = home();
        let mut req = request(MissionType::Transport, target.coordinate, &[(SMALL_CARGO, 1)]);
        req.cargo = Resources::new(100, 100, 0);

        let m = engine
            .plan_dispatch(&req, MissionId(1), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        assert_eq!(origin.units.get(SMALL_CARGO), 4);
        assert_eq!(origin.resources.metal, Fixed64::from_num(49_900));
        let expected_fuel = 50_000 - m.fuel_cost;
        assert_eq!(floor_u64(origin.resources.deuterium), expected_fuel);
        assert_eq!(m.destination_planet, Some(target.id));
        assert_eq!(m.time_departure, t(0));
        assert_eq!(m.duration(), 5_009);
        assert!(m.fuel_cost >= 1);
    }

    // -----------------------------------------------------------------------
    // Test 2: Rejections leave the origin untouched
    // -----------------------------------------------------------------------
    #[test]
    fn rejected_dispatch_changes_nothing() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(2, 8);
        let before = home();

        let cases: Vec<(DispatchRequest, DispatchContext<'_>, ValidationError)> = vec![
            (
                request(MissionType::Transport, target.coordinate, &[(SMALL_CARGO, 9)]),
                ctx(&me, Some(&target)),
                ValidationError::InsufficientUnits(crate::units::UnitShortfall {
                    unit: SMALL_CARGO,
                    requested: 9,
                    available: 5,
                }),
            ),
            (
                request(MissionType::Transport, target.coordinate, &[(ROCKET_LAUNCHER, 1)]),
                ctx(&me, Some(&target)),
                ValidationError::StationaryUnit(ROCKET_LAUNCHER),
            ),
            (
                request(MissionType::Transport, target.coordinate, &[]),
                ctx(&me, Some(&target)),
                ValidationError::EmptyFleet,
            ),
            (
                request(MissionType::Deployment, target.coordinate, &[(SMALL_CARGO, 1)]),
                ctx(&me, Some(&target)),
                invalid(target.coordinate, DestinationIssue::ForeignPlanet),
            ),
            (
                request(MissionType::Colonization, target.coordinate, &[(COLONY_SHIP, 1)]),
                ctx(&me, Some(&target)),
                invalid(target.coordinate, DestinationIssue::Occupied),
            ),
            (
                request(MissionType::Espionage, target.coordinate, &[(SMALL_CARGO, 1)]),
                ctx(&me, Some(&target)),
                ValidationError::MissingRole(UnitRole::Probe),
            ),
            (
                request(MissionType::Harvest, target.coordinate, &[(RECYCLER, 1)]),
                ctx(&me, Some(&target)),
                invalid(target.coordinate, DestinationIssue::NoDebris),
            ),
            (
                request(MissionType::Expedition, target.coordinate, &[(SMALL_CARGO, 1)]),
                ctx(&me, Some(&target)),
                invalid(target.coordinate, DestinationIssue::ExpeditionSlot),
            ),
            (
                request(MissionType::Attack, home().coordinate, &[(LIGHT_FIGHTER, 1)]),
                ctx(&me, None),
                invalid(home().coordinate, DestinationIssue::SameAsOrigin),
            ),
        ];

        for (req, c, expected) in cases {
            let mut origin = home();
            let err = engine
                .plan_dispatch(&req, MissionId(1), &mut origin, &c, t(0))
                .unwrap_err();
            assert_eq!(err, expected, "{:?}", req.mission);
            assert_eq!(origin, before);
        }
    }

    // -----------------------------------------------------------------------
    // Test 3: Fleet slots, speed, cargo and fuel limits
    // -----------------------------------------------------------------------
    #[test]
    fn slot_cargo_and_fuel_limits() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(1, 8);
        let mut origin = home();

        let req = request(MissionType::Transport, target.coordinate, &[(SMALL_CARGO, 1)]);
        let busy = DispatchContext {
            active_missions: 1,
            ..ctx(&me, Some(&target))
        };
        assert_eq!(
            engine.plan_dispatch(&req, MissionId(1), &mut origin, &busy, t(0)),
            Err(ValidationError::FleetSlotsExceeded { used: 1, max: 1 })
        );

        let mut slow = req.clone();
        slow.speed_percent = 55;
        assert_eq!(
            engine.plan_dispatch(&slow, MissionId(1), &mut origin, &ctx(&me, Some(&target)), t(0)),
            Err(ValidationError::InvalidSpeed(55))
        );

        let mut heavy = req.clone();
        heavy.cargo = Resources::new(5_001, 0, 0);
        assert_eq!(
            engine.plan_dispatch(&heavy, MissionId(1), &mut origin, &ctx(&me, Some(&target)), t(0)),
            Err(ValidationError::InsufficientCargo {
                requested: 5_001,
                capacity: 5_000,
            })
        );

        origin.resources = Resources::new(1_000, 1_000, 0);
        assert!(matches!(
            engine.plan_dispatch(&req, MissionId(1), &mut origin, &ctx(&me, Some(&target)), t(0)),
            Err(ValidationError::InsufficientFuel { available: 0, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 4: Transport arrival delivers and sends the ships home empty
    // -----------------------------------------------------------------------
    #[test]
    fn transport_arrival_delivers_cargo() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(2, 8);
        let mut origin = home();
        let mut req = request(MissionType::Transport, target.coordinate, &[(SMALL_CARGO, 1)]);
        req.cargo = Resources::new(100, 100, 0);
        let m = engine
            .plan_dispatch(&req, MissionId(1), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m.clone(), Some(target.clone()))).unwrap();
        assert!(fx.mission.processed);
        let delivered = fx.target.unwrap();
        assert_eq!(delivered.resources, Resources::new(100, 100, 0));
        let back = fx.return_trip.unwrap();
        assert_eq!(back.time_departure, m.time_arrival);
        assert_eq!(back.duration(), m.duration());
        assert!(back.cargo.is_empty());
        assert_eq!(back.units, m.units);

        let keys: Vec<_> = fx.messages.iter().map(|m| m.template_key.as_str()).collect();
        assert_eq!(keys, ["transport.arrived", "transport.received"]);
        assert_eq!(fx.messages[0].param("metal"), Some(&json!(100)));
        assert_eq!(fx.messages[1].recipient, PlayerId(2));
    }

    // -----------------------------------------------------------------------
    // Test 5: Returns land at home, or are lost when home is gone
    // -----------------------------------------------------------------------
    #[test]
    fn return_lands_or_is_lost() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let out = FleetMission {
            id: MissionId(1),
            owner: PlayerId(1),
            mission_type: MissionType::Transport,
            origin: Coordinate::planet(1, 100, 4),
            origin_planet: Some(PlanetId(1)),
            destination: Coordinate::planet(1, 100, 8),
            destination_planet: Some(PlanetId(18)),
            target_owner: Some(PlayerId(2)),
            units: UnitCollection::from_pairs([(SMALL_CARGO, 1)]),
            cargo: Resources::ZERO,
            speed_percent: 100,
            fuel_cost: 5,
            time_departure: t(0),
            time_arrival: t(100),
            processed: false,
            parent: None,
            recalled: false,
        };
        let back = out.return_trip(MissionId(2), t(100), 100, out.units.clone(), Resources::new(7, 0, 0));

        let mut h = home();
        h.units = UnitCollection::new();
        let fx = engine.resolve(&arrival(back.clone(), Some(h))).unwrap();
        assert_eq!(fx.target.as_ref().unwrap().units.get(SMALL_CARGO), 1);
        assert_eq!(fx.messages[0].template_key, "return.arrived");
        assert!(fx.return_trip.is_none());

        let fx = engine.resolve(&arrival(back, None)).unwrap();
        assert!(fx.target.is_none());
        assert_eq!(fx.messages[0].template_key, "return.lost");
    }

    // -----------------------------------------------------------------------
    // Test 6: Processed missions are never resolved again
    // -----------------------------------------------------------------------
    #[test]
    fn reprocessing_is_an_invariant_violation() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(1, 8);
        let mut origin = home();
        let req = request(MissionType::Deployment, target.coordinate, &[(LIGHT_FIGHTER, 2)]);
        let mut m = engine
            .plan_dispatch(&req, MissionId(4), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();
        m.processed = true;
        assert_eq!(
            engine.resolve(&arrival(m, Some(target))).unwrap_err(),
            InvariantViolation::MissionReprocessed(MissionId(4))
        );
    }

    // -----------------------------------------------------------------------
    // Test 7: Colonization founds a planet or falls back to a return trip
    // -----------------------------------------------------------------------
    #[test]
    fn colonization_outcomes() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let spot = Coordinate::planet(1, 100, 9);
        let mut origin = home();
        let mut req = request(MissionType::Colonization, spot, &[(COLONY_SHIP, 1), (SMALL_CARGO, 1)]);
        req.cargo = Resources::new(500, 0, 0);
        let m = engine
            .plan_dispatch(&req, MissionId(3), &mut origin, &ctx(&me, None), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m.clone(), None)).unwrap();
        let colony = fx.colony.unwrap();
        assert_eq!(colony.id, PlanetId(77));
        assert_eq!(colony.coordinate, spot);
        assert_eq!(colony.units, UnitCollection::from_pairs([(SMALL_CARGO, 1)]));
        assert_eq!(colony.resources, Resources::new(500, 0, 0));
        assert_eq!(colony.last_update, m.time_arrival);
        assert!(fx.return_trip.is_none());

        let squatter = Planet::new(PlanetId(5), PlayerId(3), "Squat", spot, 163, t(10));
        let fx = engine.resolve(&arrival(m.clone(), Some(squatter))).unwrap();
        assert!(fx.colony.is_none());
        assert!(fx.target.is_none());
        let back = fx.return_trip.unwrap();
        assert_eq!(back.units, m.units);
        assert_eq!(back.cargo, m.cargo);
        assert_eq!(fx.messages[0].param("reason"), Some(&json!("occupied")));
    }

    // -----------------------------------------------------------------------
    // Test 8: Harvest collects metal first up to recycler capacity
    // -----------------------------------------------------------------------
    #[test]
    fn harvest_takes_metal_first() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let slot = Coordinate::planet(1, 100, 8);
        let mut field = DebrisField::new(slot);
        field.resources = Resources::new(15_000, 10_000, 0);
        let mut origin = home();
        let req = request(MissionType::Harvest, slot, &[(RECYCLER, 1)]);
        let c = DispatchContext {
            debris: Some(&field),
            ..ctx(&me, None)
        };
        let m = engine.plan_dispatch(&req, MissionId(6), &mut origin, &c, t(0)).unwrap();

        let mut a = arrival(m, None);
        a.debris = Some(field);
        let fx = engine.resolve(&a).unwrap();
        let back = fx.return_trip.unwrap();
        assert_eq!(back.cargo, Resources::new(15_000, 5_000, 0));
        match fx.debris {
            DebrisChange::Put(left) => assert_eq!(left.resources, Resources::new(0, 5_000, 0)),
            other => panic!("expected a smaller field, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Test 9: Recall flies back for as long as the fleet was out
    // -----------------------------------------------------------------------
    #[test]
    fn recall_is_symmetric() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(2, 8);
        let mut origin = home();
        let req = request(MissionType::Attack, target.coordinate, &[(LIGHT_FIGHTER, 3)]);
        let m = engine
            .plan_dispatch(&req, MissionId(8), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let (outward, back) = engine.recall(&m, PlayerId(1), MissionId(9), t(600)).unwrap();
        assert!(outward.processed && outward.recalled);
        assert_eq!(back.time_departure, t(600));
        assert_eq!(back.time_arrival, t(1_200));
        assert_eq!(back.parent, Some(MissionId(8)));

        assert_eq!(
            engine.recall(&m, PlayerId(2), MissionId(9), t(600)),
            Err(ValidationError::NotRecallable(MissionId(8)))
        );
        assert_eq!(
            engine.recall(&back, PlayerId(1), MissionId(10), t(700)),
            Err(ValidationError::NotRecallable(MissionId(9)))
        );
    }

    // -----------------------------------------------------------------------
    // Test 10: Attack applies survivors, loot and debris
    // -----------------------------------------------------------------------
    #[test]
    fn attack_applies_battle() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(2, 8);
        target.resources = Resources::new(10_000, 10_000, 10_000);
        target.units = UnitCollection::from_pairs([(SMALL_CARGO, 1)]);
        let mut origin = home();
        let req = request(MissionType::Attack, target.coordinate, &[(LIGHT_FIGHTER, 10)]);
        let m = engine
            .plan_dispatch(&req, MissionId(12), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m.clone(), Some(target.clone()))).unwrap();
        let hit = fx.target.unwrap();
        assert!(hit.units.is_empty());
        let back = fx.return_trip.unwrap();
        let loot = back.cargo;
        assert!(!loot.is_empty());
        assert_eq!(hit.resources.checked_add(&loot), Some(target.resources));
        assert!(matches!(fx.debris, DebrisChange::Put(_)));

        let recipients: Vec<_> = fx.messages.iter().map(|m| m.recipient).collect();
        assert_eq!(recipients, [PlayerId(1), PlayerId(2)]);
        assert!(fx.messages.iter().all(|m| m.template_key == "combat.report"));
        assert_eq!(fx.messages[0].param("winner"), Some(&json!("attacker")));
    }

    // -----------------------------------------------------------------------
    // Test 11: Espionage reports and always sends the probes home
    // -----------------------------------------------------------------------
    #[test]
    fn espionage_reports_and_returns() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(2, 8);
        target.resources = Resources::new(1_234, 0, 0);
        let mut origin = home();
        let req = request(MissionType::Espionage, target.coordinate, &[(PROBE, 1)]);
        let m = engine
            .plan_dispatch(&req, MissionId(13), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m.clone(), Some(target))).unwrap();
        assert!(fx.target.is_none());
        assert_eq!(fx.return_trip.unwrap().units, m.units);
        assert_eq!(fx.messages[0].template_key, "espionage.report");
        assert_eq!(fx.messages[0].param("metal"), Some(&json!(1_234)));
        assert!(fx.messages[0].param("fleet").is_none());
        assert_eq!(fx.messages[1].template_key, "espionage.detected");
        assert_eq!(fx.messages[1].recipient, PlayerId(2));
    }

    // -----------------------------------------------------------------------
    // Test 12: A draw loots nothing and both sides keep their survivors
    // -----------------------------------------------------------------------
    #[test]
    fn attack_draw_keeps_both_fleets() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(2, 8);
        target.resources = Resources::new(10_000, 10_000, 10_000);
        target.units = UnitCollection::from_pairs([(COLONY_SHIP, 3)]);
        let mut origin = home();
        let req = request(MissionType::Attack, target.coordinate, &[(COLONY_SHIP, 1), (PROBE, 1)]);
        let m = engine
            .plan_dispatch(&req, MissionId(14), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        // The defenders kill a probe with any hit but only graze the shielded
        // colony ship; the attacker cannot get through their shields at all.
        let mut a = arrival(m.clone(), Some(target.clone()));
        a.owner.research.insert(SHIELDING_TECH, 20);
        if let Some(defender) = a.target_owner.as_mut() {
            defender.research.insert(WEAPONS_TECH, 11);
        }
        let fx = engine.resolve(&a).unwrap();

        assert_eq!(fx.messages[0].param("winner"), Some(&json!("draw")));
        let hit = fx.target.unwrap();
        assert_eq!(hit.units, target.units);
        assert_eq!(hit.resources, target.resources);
        let back = fx.return_trip.unwrap();
        assert_eq!(back.units, UnitCollection::from_pairs([(COLONY_SHIP, 1)]));
        assert!(back.cargo.is_empty());
        match fx.debris {
            DebrisChange::Put(field) => {
                assert_eq!(field.slot, target.coordinate.slot());
                assert_eq!(field.resources, Resources::new(0, 300, 0));
            }
            other => panic!("expected debris from the lost probe, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Test 13: A wiped-out attacker schedules no return
    // -----------------------------------------------------------------------
    #[test]
    fn attacker_wiped_out_does_not_return() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(2, 8);
        target.resources = Resources::new(5_000, 0, 0);
        target.units = UnitCollection::from_pairs([(ROCKET_LAUNCHER, 2)]);
        let mut origin = home();
        let req = request(MissionType::Attack, target.coordinate, &[(PROBE, 1)]);
        let m = engine
            .plan_dispatch(&req, MissionId(15), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m, Some(target.clone()))).unwrap();
        assert!(fx.mission.processed);
        assert!(fx.return_trip.is_none());
        assert_eq!(fx.messages[0].param("winner"), Some(&json!("defender")));
        let held = fx.target.unwrap();
        assert_eq!(held.units, target.units);
        assert_eq!(held.resources, target.resources);
        assert!(matches!(fx.debris, DebrisChange::Put(ref f) if f.resources == Resources::new(0, 300, 0)));
    }

    // -----------------------------------------------------------------------
    // Test 14: Deployment stations the fleet, or turns back from a lost planet
    // -----------------------------------------------------------------------
    #[test]
    fn deployment_stations_units_and_cargo() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(1, 8);
        target.units = UnitCollection::from_pairs([(LIGHT_FIGHTER, 1)]);
        let mut origin = home();
        let mut req = request(MissionType::Deployment, target.coordinate, &[(LIGHT_FIGHTER, 2)]);
        req.cargo = Resources::new(60, 0, 0);
        let m = engine
            .plan_dispatch(&req, MissionId(16), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        let fx = engine.resolve(&arrival(m, Some(target))).unwrap();
        assert!(fx.return_trip.is_none());
        let stationed = fx.target.unwrap();
        assert_eq!(stationed.units.get(LIGHT_FIGHTER), 3);
        assert_eq!(stationed.resources, Resources::new(60, 0, 0));
        assert_eq!(fx.messages[0].template_key, "deployment.arrived");
    }

    #[test]
    fn deployment_to_a_lost_planet_flies_home() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(1, 8);
        let mut origin = home();
        let mut req = request(MissionType::Deployment, target.coordinate, &[(LIGHT_FIGHTER, 2)]);
        req.cargo = Resources::new(60, 0, 0);
        let m = engine
            .plan_dispatch(&req, MissionId(17), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        // The planet changed hands while the fleet was under way.
        let mut taken = target.clone();
        taken.owner = PlayerId(2);
        let fx = engine.resolve(&arrival(m.clone(), Some(taken))).unwrap();
        assert!(fx.target.is_none());
        assert_eq!(fx.messages[0].template_key, "deployment.failed");
        let back = fx.return_trip.unwrap();
        assert_eq!(back.units, m.units);
        assert_eq!(back.cargo, m.cargo);
        assert_eq!(back.time_departure, m.time_arrival);
    }

    // -----------------------------------------------------------------------
    // Test 15: Quantities past the representable range are refused
    // -----------------------------------------------------------------------
    #[test]
    fn delivery_past_the_stock_range_is_an_invariant_violation() {
        let catalog = standard_catalog();
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let mut target = other(2, 8);
        let mut origin = home();
        let mut req = request(MissionType::Transport, target.coordinate, &[(SMALL_CARGO, 1)]);
        req.cargo = Resources::new(100, 0, 0);
        let m = engine
            .plan_dispatch(&req, MissionId(18), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();

        target.resources = Resources::new(i32::MAX as u32, 0, 0);
        assert_eq!(
            engine.resolve(&arrival(m, Some(target.clone()))).unwrap_err(),
            InvariantViolation::StockOverflow(target.id)
        );
    }

    #[test]
    fn fleets_beyond_the_battle_limit_cannot_leave() {
        let mut balance = crate::catalog::Balance::default();
        balance.combat.max_units_per_side = 3;
        let catalog = catalog_with(balance);
        let engine = FleetMissionEngine::new(&catalog);
        let me = Player::new(PlayerId(1), "me");
        let target = other(2, 8);
        let mut origin = home();
        let before = origin.clone();
        let req = request(MissionType::Attack, target.coordinate, &[(LIGHT_FIGHTER, 4)]);
        assert_eq!(
            engine.plan_dispatch(&req, MissionId(19), &mut origin, &ctx(&me, Some(&target)), t(0)),
            Err(ValidationError::FleetTooLarge { units: 4, limit: 3 })
        );
        assert_eq!(origin, before);

        // A defence larger than the limit fails the arrival instead of
        // simulating millions of units.
        let req = request(MissionType::Attack, target.coordinate, &[(LIGHT_FIGHTER, 2)]);
        let m = engine
            .plan_dispatch(&req, MissionId(20), &mut origin, &ctx(&me, Some(&target)), t(0))
            .unwrap();
        let mut fortress = target.clone();
        fortress.units = UnitCollection::from_pairs([(ROCKET_LAUNCHER, 4)]);
        assert_eq!(
            engine.resolve(&arrival(m, Some(fortress))).unwrap_err(),
            InvariantViolation::BattleTooLarge {
                mission: MissionId(20),
                units: 4,
                limit: 3,
            }
        );
    }
}
