//! The catch-up orchestrator and the operations callers trigger.
//!
//! # Architecture
//!
//! The [`Engine`] holds no game state of its own. It owns handles to:
//! - a [`Store`] (the only shared state between workers)
//! - a [`Clock`] supplying "now"
//! - a [`MessageDispatcher`] for outcome messages
//! - the read-only [`Catalog`]
//!
//! Any number of engines may share one store; each behaves like an
//! independent request worker.
//!
//! # Catch-up pass
//!
//! Every operation touching a player first runs [`Engine::catch_up_player`]:
//! 1. **Collect** -- queue heads of the player's planets and research,
//!    arrivals of the player's missions and of missions targeting the
//!    player's planets, all due at the visit instant.
//! 2. **Order** -- pick the earliest event by `(time, queue before arrival,
//!    id)`.
//! 3. **Apply** -- run it through the [`IdempotencyGuard`]: the affected
//!    planet is accrued to the event instant and the effect is committed in
//!    the same change set. An arrival first drains the target planet's own
//!    earlier events.
//! 4. **Repeat** until nothing is due, then accrue every planet to now.

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::clock::{Clock, Timestamp};
use crate::coords::Coordinate;
use crate::error::{EngineError, InvariantViolation, StoreError, ValidationError};
use crate::fixed::Seconds;
use crate::fleet::{Arrival, DebrisChange, DispatchContext, DispatchRequest, FleetMissionEngine};
use crate::guard::{Attempt, Claim, IdempotencyGuard};
use crate::id::{BuildingTypeId, MissionId, PlanetId, PlayerId, QueueItemId, ResearchId, UnitTypeId};
use crate::ledger::ResourceLedger;
use crate::message::{MessageDispatcher, OutcomeMessage, deliver_all};
use crate::mission::{FleetMission, MissionType};
use crate::planet::{Planet, Player};
use crate::queue::{Cancellation, QueueItem, QueueKind, QueueOrder, QueueProcessor, QueueScope};
use crate::store::{ChangeSet, Check, Sequence, Store, Write};
use crate::travel;

// ---------------------------------------------------------------------------
// Due events
// ---------------------------------------------------------------------------

/// Processing order of due events. Queue completions sort before arrivals
/// at the same instant, so a building finished at `t` defends at `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EventKey {
    at: Timestamp,
    rank: u8,
    id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Due {
    Queue(QueueItemId),
    Arrival(MissionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct DueEvent {
    key: EventKey,
    due: Due,
}

fn queue_event(item: &QueueItem) -> DueEvent {
    DueEvent {
        key: EventKey {
            at: item.completion,
            rank: 0,
            id: item.id.0,
        },
        due: Due::Queue(item.id),
    }
}

fn arrival_event(mission: &FleetMission) -> DueEvent {
    DueEvent {
        key: EventKey {
            at: mission.time_arrival,
            rank: 1,
            id: mission.id.0,
        },
        due: Due::Arrival(mission.id),
    }
}

/// What one catch-up pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    pub queue_items: u32,
    pub missions: u32,
    /// Planets accrued to the visit instant.
    pub accruals: u32,
    /// Transitions another worker completed first, or that stayed
    /// contended.
    pub skipped: u32,
    /// A transition stayed contended. The pass stopped there and left
    /// every planet at its last transition instead of accruing to now.
    pub contended: bool,
}

fn dangling(what: String) -> EngineError {
    tracing::error!(%what, "dangling row reference");
    StoreError::Corrupt(what).into()
}

/// A user-initiated write either commits or reports contention.
fn settle<T>(claim: Claim<T>) -> Result<T, EngineError> {
    match claim {
        Claim::Applied(v) => Ok(v),
        Claim::AlreadyDone | Claim::Contended => Err(EngineError::Contended),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    mailbox: Arc<dyn MessageDispatcher>,
    catalog: Arc<Catalog>,
    guard: IdempotencyGuard,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("guard", &self.guard).finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        mailbox: Arc<dyn MessageDispatcher>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            clock,
            mailbox,
            catalog,
            guard: IdempotencyGuard::default(),
        }
    }

    pub fn with_guard(mut self, guard: IdempotencyGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn ledger(&self) -> ResourceLedger<'_> {
        ResourceLedger::new(&self.catalog)
    }

    fn queues(&self) -> QueueProcessor<'_> {
        QueueProcessor::new(&self.catalog)
    }

    fn fleets(&self) -> FleetMissionEngine<'_> {
        FleetMissionEngine::new(&self.catalog)
    }

    fn store(&self) -> &dyn Store {
        &*self.store
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Create a player account row.
    pub fn create_player(&self, name: &str) -> Result<PlayerId, EngineError> {
        let id = PlayerId(self.store.allocate(Sequence::Player)?);
        let mut cs = ChangeSet::new();
        cs.write(Write::InsertPlayer(Player::new(id, name)));
        let claim = self.guard.run(self.store(), "create player", || -> Result<_, EngineError> {
            Ok(Attempt::Commit(cs.clone(), id))
        })?;
        settle(claim)
    }

    /// Found a planet for `owner` at an empty coordinate, e.g. a home
    /// planet at registration.
    pub fn create_planet(&self, owner: PlayerId, name: &str, coordinate: Coordinate) -> Result<PlanetId, EngineError> {
        travel::validate_coordinate(&self.catalog.balance.travel, &coordinate, false)?;
        let now = self.now();
        let id = PlanetId(self.store.allocate(Sequence::Planet)?);
        let claim = self.guard.run(self.store(), "create planet", || -> Result<_, EngineError> {
            let player = self
                .store
                .player(owner)?
                .ok_or(ValidationError::UnknownPlayer(owner))?;
            if self.store.planet_at(coordinate)?.is_some() {
                return Err(ValidationError::InvalidDestination {
                    destination: coordinate,
                    issue: crate::error::DestinationIssue::Occupied,
                }
                .into());
            }
            let planet = Planet::new(id, owner, name, coordinate, self.catalog.balance.planet_fields, now);
            let mut cs = ChangeSet::new();
            cs.expect_player(&player)
                .check(Check::PositionVacant(coordinate))
                .write(Write::InsertPlanet(planet));
            Ok(Attempt::Commit(cs, id))
        })?;
        settle(claim)
    }

    // -----------------------------------------------------------------------
    // Catch-up
    // -----------------------------------------------------------------------

    /// Apply every transition due for `player` up to now.
    pub fn catch_up_player(&self, player: PlayerId) -> Result<CatchUpReport, EngineError> {
        let now = self.now();
        let mut report = CatchUpReport::default();
        let mut skipped = HashSet::new();
        self.drain(now, None, &mut skipped, &mut report, || self.player_events(player, now))?;
        if report.contended {
            tracing::warn!(player = ?player, at = %now, "catch-up stopped at a contended transition");
            return Ok(report);
        }

        for planet in self.store.planets_of(player)? {
            match self.accrue_planet(planet.row.id, now)? {
                Claim::Applied(()) => report.accruals += 1,
                Claim::AlreadyDone => {}
                Claim::Contended => report.skipped += 1,
            }
        }
        tracing::debug!(
            player = ?player,
            at = %now,
            queue_items = report.queue_items,
            missions = report.missions,
            skipped = report.skipped,
            "catch-up pass finished"
        );
        Ok(report)
    }

    /// Catch up `player` before a write that accrues to now. A pass that
    /// stopped early would let the write skip production owed to the
    /// pending transition.
    fn caught_up(&self, player: PlayerId) -> Result<(), EngineError> {
        if self.catch_up_player(player)?.contended {
            return Err(EngineError::Contended);
        }
        Ok(())
    }

    /// Catch up the owner of `planet`.
    pub fn catch_up_planet(&self, planet: PlanetId) -> Result<CatchUpReport, EngineError> {
        let owner = self
            .store
            .planet(planet)?
            .ok_or(ValidationError::UnknownPlanet(planet))?
            .row
            .owner;
        self.catch_up_player(owner)
    }

    fn player_events(&self, player: PlayerId, now: Timestamp) -> Result<Vec<DueEvent>, EngineError> {
        let mut out = Vec::new();
        for planet in self.store.planets_of(player)? {
            self.planet_events(&planet.row, now, &mut out)?;
        }
        self.research_event(player, now, &mut out)?;
        for mission in self.store.active_missions_of(player)? {
            if mission.row.is_due(now) {
                out.push(arrival_event(&mission.row));
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn planet_events(&self, planet: &Planet, now: Timestamp, out: &mut Vec<DueEvent>) -> Result<(), EngineError> {
        for kind in [QueueKind::Construction, QueueKind::Shipyard] {
            let queue = self.store.queue(QueueScope::Planet(planet.id, kind))?;
            if let Some(head) = queue.first()
                && head.row.is_due(now)
            {
                out.push(queue_event(&head.row));
            }
        }
        for mission in self.store.missions_to(planet.coordinate)? {
            if mission.row.is_due(now) {
                out.push(arrival_event(&mission.row));
            }
        }
        Ok(())
    }

    fn research_event(&self, player: PlayerId, now: Timestamp, out: &mut Vec<DueEvent>) -> Result<(), EngineError> {
        let queue = self.store.queue(QueueScope::Research(player))?;
        if let Some(head) = queue.first()
            && head.row.is_due(now)
        {
            out.push(queue_event(&head.row));
        }
        Ok(())
    }

    /// Process events from `collect` in order until none remain below
    /// `bound`. Events another worker already settled are not retried in
    /// this pass; a contended event stops the pass, since every later
    /// event depends on it.
    fn drain(
        &self,
        now: Timestamp,
        bound: Option<EventKey>,
        skipped: &mut HashSet<DueEvent>,
        report: &mut CatchUpReport,
        mut collect: impl FnMut() -> Result<Vec<DueEvent>, EngineError>,
    ) -> Result<(), EngineError> {
        loop {
            let next = collect()?
                .into_iter()
                .filter(|e| bound.is_none_or(|b| e.key < b) && !skipped.contains(e))
                .min();
            let Some(event) = next else {
                return Ok(());
            };
            let claim = match event.due {
                Due::Queue(id) => self.complete_queue_item(id, now)?,
                Due::Arrival(id) => self.process_arrival(id, now, report)?,
            };
            match (claim, event.due) {
                (Claim::Applied(()), Due::Queue(_)) => report.queue_items += 1,
                (Claim::Applied(()), Due::Arrival(_)) => report.missions += 1,
                (Claim::AlreadyDone, _) => {
                    skipped.insert(event);
                    report.skipped += 1;
                }
                (Claim::Contended, _) => {
                    report.skipped += 1;
                    report.contended = true;
                    return Ok(());
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn accrue_planet(&self, planet: PlanetId, now: Timestamp) -> Result<Claim<()>, EngineError> {
        self.guard.run(self.store(), "accrual", || -> Result<_, EngineError> {
            let Some(read) = self.store.planet(planet)? else {
                return Ok(Attempt::Done);
            };
            if read.row.last_update >= now {
                return Ok(Attempt::Done);
            }
            let mut row = read.row.clone();
            self.ledger().accrue(&mut row, now)?;
            let mut cs = ChangeSet::new();
            cs.expect_planet(&read).write(Write::PutPlanet(row));
            Ok(Attempt::Commit(cs, ()))
        })
    }

    /// Complete a due queue head and start its successor.
    fn complete_queue_item(&self, id: QueueItemId, now: Timestamp) -> Result<Claim<()>, EngineError> {
        self.guard.run(self.store(), "queue completion", || -> Result<_, EngineError> {
            let Some(item) = self.store.queue_item(id)? else {
                return Ok(Attempt::Done);
            };
            if !item.row.is_due(now) {
                return Ok(Attempt::Done);
            }
            let queue = self.store.queue(item.row.scope())?;
            if queue.first().map(|head| head.row.id) != Some(id) {
                return Ok(Attempt::Done);
            }

            let planet = self
                .store
                .planet(item.row.planet)?
                .ok_or_else(|| dangling(format!("queue item {id:?} on missing planet {:?}", item.row.planet)))?;
            let player = self
                .store
                .player(item.row.owner)?
                .ok_or_else(|| dangling(format!("queue item {id:?} of missing player {:?}", item.row.owner)))?;

            let mut p = planet.row.clone();
            let mut pl = player.row.clone();
            let mut next = queue.get(1).map(|n| n.row.clone());
            self.queues().complete(&item.row, next.as_mut(), &mut p, &mut pl)?;

            let mut cs = ChangeSet::new();
            cs.expect_queue_item(&item)
                .expect_planet(&planet)
                .expect_player(&player)
                .write(Write::DeleteQueueItem(id));
            if let (Some(read), Some(started)) = (queue.get(1), next) {
                cs.expect_queue_item(read).write(Write::PutQueueItem(started));
            }
            cs.write(Write::PutPlanet(p));
            if item.row.kind == QueueKind::Research {
                cs.write(Write::PutPlayer(pl));
            }
            Ok(Attempt::Commit(cs, ()))
        })
    }

    /// Resolve one due mission, after the events that precede it at its
    /// destination.
    fn process_arrival(
        &self,
        id: MissionId,
        now: Timestamp,
        report: &mut CatchUpReport,
    ) -> Result<Claim<()>, EngineError> {
        let Some(mission) = self.store.mission(id)? else {
            return Ok(Claim::AlreadyDone);
        };
        if !mission.row.is_due(now) {
            return Ok(Claim::AlreadyDone);
        }

        let bound = arrival_event(&mission.row).key;
        let target = self.store.planet_at(mission.row.destination)?.map(|p| (p.row.id, p.row.owner));
        let owner = mission.row.owner;
        let destination = mission.row.destination;
        let mut skipped = HashSet::new();
        self.drain(now, Some(bound), &mut skipped, report, || {
            let mut out = Vec::new();
            if let Some((planet, target_owner)) = target {
                if let Some(p) = self.store.planet(planet)? {
                    self.planet_events(&p.row, now, &mut out)?;
                }
                self.research_event(target_owner, now, &mut out)?;
            } else {
                // Earlier arrivals may found a colony here first.
                for other in self.store.missions_to(destination)? {
                    if other.row.is_due(now) {
                        out.push(arrival_event(&other.row));
                    }
                }
            }
            self.research_event(owner, now, &mut out)?;
            Ok(out)
        })?;
        if report.contended {
            return Ok(Claim::Contended);
        }

        // Drawn once and shared by every retry.
        let return_id = if mission.row.is_return() {
            MissionId(0)
        } else {
            MissionId(self.store.allocate(Sequence::Mission)?)
        };
        let colony_id = if mission.row.mission_type == MissionType::Colonization && !mission.row.is_return() {
            PlanetId(self.store.allocate(Sequence::Planet)?)
        } else {
            PlanetId(0)
        };
        let claim = self.guard.run(self.store(), "mission arrival", || {
            self.arrival_attempt(id, now, return_id, colony_id)
        })?;
        Ok(match claim {
            Claim::Applied(messages) => {
                deliver_all(&*self.mailbox, messages);
                Claim::Applied(())
            }
            Claim::AlreadyDone => Claim::AlreadyDone,
            Claim::Contended => Claim::Contended,
        })
    }

    fn arrival_attempt(
        &self,
        id: MissionId,
        now: Timestamp,
        return_id: MissionId,
        colony_id: PlanetId,
    ) -> Result<Attempt<Vec<OutcomeMessage>>, EngineError> {
        let Some(mission) = self.store.mission(id)? else {
            return Ok(Attempt::Done);
        };
        if !mission.row.is_due(now) {
            return Ok(Attempt::Done);
        }
        let m = &mission.row;

        let owner = self
            .store
            .player(m.owner)?
            .ok_or_else(|| dangling(format!("mission {id:?} of missing player {:?}", m.owner)))?;
        let target = self.store.planet_at(m.destination)?;
        let target_owner = match &target {
            Some(t) if t.row.owner == m.owner => Some(owner.row.clone()),
            Some(t) => self.store.player(t.row.owner)?.map(|p| p.row),
            None => None,
        };
        let debris = match m.mission_type {
            MissionType::Attack | MissionType::Harvest if !m.is_return() => self.store.debris(m.destination)?,
            _ => None,
        };
        let colonizing = m.mission_type == MissionType::Colonization && !m.is_return();
        let owner_planets = if colonizing {
            self.store.planets_of(m.owner)?.len() as u32
        } else {
            0
        };
        let mut accrued = target.as_ref().map(|t| t.row.clone());
        if let Some(planet) = accrued.as_mut() {
            self.ledger().accrue(planet, m.time_arrival)?;
        }

        let fx = self.fleets().resolve(&Arrival {
            mission: m.clone(),
            owner: owner.row.clone(),
            target: accrued,
            target_owner,
            debris: debris.as_ref().map(|d| d.row.clone()),
            owner_planets,
            return_id,
            colony_id,
        })?;

        let mut cs = ChangeSet::new();
        cs.expect_mission(&mission).write(Write::PutMission(fx.mission));
        match (&target, fx.target) {
            (Some(read), Some(updated)) => {
                cs.expect_planet(read).write(Write::PutPlanet(updated));
            }
            (Some(read), None) => {
                cs.expect_planet(read);
            }
            (None, _) => {
                cs.check(Check::PositionVacant(m.destination));
            }
        }
        match fx.debris {
            DebrisChange::Unchanged => {}
            DebrisChange::Put(field) => {
                cs.expect_debris(m.destination, debris.as_ref())
                    .write(Write::PutDebris(field));
            }
            DebrisChange::Delete(slot) => {
                cs.expect_debris(m.destination, debris.as_ref())
                    .write(Write::DeleteDebris(slot));
            }
        }
        if let Some(colony) = fx.colony {
            // Serializes a player's colonizations so the planet limit holds.
            cs.expect_player(&owner)
                .write(Write::PutPlayer(owner.row.clone()))
                .write(Write::InsertPlanet(colony));
        }
        if let Some(trip) = fx.return_trip {
            cs.write(Write::InsertMission(trip));
        }
        Ok(Attempt::Commit(cs, fx.messages))
    }

    // -----------------------------------------------------------------------
    // Fleet operations
    // -----------------------------------------------------------------------

    /// Send a fleet. Returns the persisted mission.
    pub fn dispatch(&self, player: PlayerId, request: &DispatchRequest) -> Result<FleetMission, EngineError> {
        self.caught_up(player)?;
        let now = self.now();
        let id = MissionId(self.store.allocate(Sequence::Mission)?);

        let claim = self.guard.run(self.store(), "dispatch", || -> Result<_, EngineError> {
            let account = self
                .store
                .player(player)?
                .ok_or(ValidationError::UnknownPlayer(player))?;
            let origin = self
                .store
                .planet(request.origin)?
                .ok_or(ValidationError::UnknownPlanet(request.origin))?;
            let target = self.store.planet_at(request.destination)?;
            let debris = self.store.debris(request.destination)?;
            let active = self.store.active_missions_of(player)?.len() as u32;
            let planets = self.store.planets_of(player)?.len() as u32;

            let mut source = origin.row.clone();
            self.ledger().accrue(&mut source, now)?;
            let ctx = DispatchContext {
                player: &account.row,
                target: target.as_ref().map(|t| &t.row),
                debris: debris.as_ref().map(|d| &d.row),
                active_missions: active,
                planet_count: planets,
            };
            let mission = self.fleets().plan_dispatch(request, id, &mut source, &ctx, now)?;

            // The player row is rewritten so concurrent dispatches recount
            // fleet slots.
            let mut cs = ChangeSet::new();
            cs.expect_player(&account)
                .write(Write::PutPlayer(account.row.clone()))
                .expect_planet(&origin)
                .write(Write::PutPlanet(source))
                .write(Write::InsertMission(mission.clone()));
            Ok(Attempt::Commit(cs, mission))
        })?;
        settle(claim)
    }

    /// Turn an outward mission around now. Returns the return trip.
    pub fn recall(&self, player: PlayerId, mission: MissionId) -> Result<FleetMission, EngineError> {
        self.caught_up(player)?;
        let now = self.now();
        let return_id = MissionId(self.store.allocate(Sequence::Mission)?);

        let claim = self.guard.run(self.store(), "recall", || -> Result<_, EngineError> {
            let read = self
                .store
                .mission(mission)?
                .ok_or(ValidationError::UnknownMission(mission))?;
            let (outward, back) = self.fleets().recall(&read.row, player, return_id, now)?;
            let mut cs = ChangeSet::new();
            cs.expect_mission(&read)
                .write(Write::PutMission(outward))
                .write(Write::InsertMission(back.clone()));
            Ok(Attempt::Commit(cs, back))
        })?;
        settle(claim)
    }

    // -----------------------------------------------------------------------
    // Queue operations
    // -----------------------------------------------------------------------

    pub fn enqueue_building(
        &self,
        player: PlayerId,
        planet: PlanetId,
        building: BuildingTypeId,
    ) -> Result<QueueItem, EngineError> {
        self.enqueue(player, planet, QueueOrder::Building(building))
    }

    /// Queue research, carried out in the lab of `planet`.
    pub fn enqueue_research(
        &self,
        player: PlayerId,
        planet: PlanetId,
        research: ResearchId,
    ) -> Result<QueueItem, EngineError> {
        self.enqueue(player, planet, QueueOrder::Research(research))
    }

    pub fn enqueue_units(
        &self,
        player: PlayerId,
        planet: PlanetId,
        unit: UnitTypeId,
        count: u64,
    ) -> Result<QueueItem, EngineError> {
        self.enqueue(player, planet, QueueOrder::Units { unit, count })
    }

    fn enqueue(&self, player: PlayerId, planet: PlanetId, order: QueueOrder) -> Result<QueueItem, EngineError> {
        self.caught_up(player)?;
        let now = self.now();
        let id = QueueItemId(self.store.allocate(Sequence::QueueItem)?);
        let scope = match order {
            QueueOrder::Building(_) => QueueScope::Planet(planet, QueueKind::Construction),
            QueueOrder::Units { .. } => QueueScope::Planet(planet, QueueKind::Shipyard),
            QueueOrder::Research(_) => QueueScope::Research(player),
        };

        let claim = self.guard.run(self.store(), "enqueue", || -> Result<_, EngineError> {
            let account = self
                .store
                .player(player)?
                .ok_or(ValidationError::UnknownPlayer(player))?;
            let site = self
                .store
                .planet(planet)?
                .ok_or(ValidationError::UnknownPlanet(planet))?;
            if site.row.owner != player {
                return Err(ValidationError::NotOwner { player, planet }.into());
            }
            let queue: Vec<QueueItem> = self.store.queue(scope)?.into_iter().map(|v| v.row).collect();

            let mut row = site.row.clone();
            self.ledger().accrue(&mut row, now)?;
            let item = self.queues().enqueue(order, id, &mut row, &account.row, &queue, now)?;

            // Research queues span planets; the player row orders appends.
            let mut cs = ChangeSet::new();
            cs.expect_player(&account)
                .write(Write::PutPlayer(account.row.clone()))
                .expect_planet(&site)
                .write(Write::PutPlanet(row))
                .write(Write::InsertQueueItem(item.clone()));
            Ok(Attempt::Commit(cs, item))
        })?;
        let item = settle(claim)?;
        tracing::info!(
            item = ?item.id,
            player = ?player,
            planet = ?planet,
            target = ?item.target,
            completion = %item.completion,
            "order queued"
        );
        Ok(item)
    }

    /// Cancel a queued order and refund its cost to its planet.
    pub fn cancel(&self, player: PlayerId, item: QueueItemId) -> Result<Cancellation, EngineError> {
        self.caught_up(player)?;
        let now = self.now();

        let claim = self.guard.run(self.store(), "cancel", || -> Result<_, EngineError> {
            let read = self
                .store
                .queue_item(item)?
                .ok_or(ValidationError::UnknownQueueItem(item))?;
            if read.row.owner != player {
                return Err(ValidationError::NotOwner {
                    player,
                    planet: read.row.planet,
                }
                .into());
            }
            let account = self
                .store
                .player(player)?
                .ok_or(ValidationError::UnknownPlayer(player))?;
            let queue = self.store.queue(read.row.scope())?;
            let rows: Vec<QueueItem> = queue.iter().map(|v| v.row.clone()).collect();
            let cancellation = self.queues().cancel(&rows, item, now)?;

            let site = self
                .store
                .planet(read.row.planet)?
                .ok_or_else(|| dangling(format!("queue item {item:?} on missing planet {:?}", read.row.planet)))?;
            let mut planet = site.row.clone();
            self.ledger().accrue(&mut planet, now)?;
            planet.resources = planet
                .resources
                .checked_add(&cancellation.refund)
                .ok_or_else(|| InvariantViolation::StockOverflow(planet.id).logged())?;

            let mut cs = ChangeSet::new();
            cs.expect_player(&account)
                .write(Write::PutPlayer(account.row.clone()))
                .expect_queue_item(&read)
                .write(Write::DeleteQueueItem(item))
                .expect_planet(&site)
                .write(Write::PutPlanet(planet));
            for moved in &cancellation.rescheduled {
                if let Some(was) = queue.iter().find(|v| v.row.id == moved.id) {
                    cs.expect_queue_item(was);
                }
                cs.write(Write::PutQueueItem(moved.clone()));
            }
            Ok(Attempt::Commit(cs, cancellation))
        })?;
        let cancellation = settle(claim)?;
        tracing::info!(item = ?item, player = ?player, "order cancelled");
        Ok(cancellation)
    }

    /// Items of one queue, after catch-up.
    pub fn queue(&self, player: PlayerId, scope: QueueScope) -> Result<Vec<QueueItem>, EngineError> {
        self.catch_up_player(player)?;
        Ok(self.store.queue(scope)?.into_iter().map(|v| v.row).collect())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The player's planets, caught up to now.
    pub fn overview(&self, player: PlayerId) -> Result<Vec<Planet>, EngineError> {
        self.catch_up_player(player)?;
        Ok(self.store.planets_of(player)?.into_iter().map(|p| p.row).collect())
    }

    /// Unprocessed missions the player owns, by arrival.
    pub fn active_missions(&self, player: PlayerId) -> Result<Vec<FleetMission>, EngineError> {
        self.catch_up_player(player)?;
        Ok(self
            .store
            .active_missions_of(player)?
            .into_iter()
            .map(|m| m.row)
            .collect())
    }

    /// Hostile missions of other players heading for the player's planets.
    pub fn incoming_missions(&self, player: PlayerId) -> Result<Vec<FleetMission>, EngineError> {
        self.catch_up_player(player)?;
        let mut incoming = Vec::new();
        for planet in self.store.planets_of(player)? {
            incoming.extend(
                self.store
                    .missions_to(planet.row.coordinate)?
                    .into_iter()
                    .map(|m| m.row)
                    .filter(|m| m.owner != player && !m.is_return() && m.mission_type.is_hostile()),
            );
        }
        incoming.sort_by_key(|m| (m.time_arrival, m.id));
        Ok(incoming)
    }

    /// A mission the player sent or is targeted by.
    pub fn mission(&self, player: PlayerId, id: MissionId) -> Result<Option<FleetMission>, EngineError> {
        self.catch_up_player(player)?;
        Ok(self
            .store
            .mission(id)?
            .map(|m| m.row)
            .filter(|m| m.owner == player || m.target_owner == Some(player)))
    }

    /// Total flight time of a mission from its stored timestamps.
    pub fn mission_duration(&self, id: MissionId) -> Result<Seconds, EngineError> {
        let mission = self
            .store
            .mission(id)?
            .ok_or(ValidationError::UnknownMission(id))?;
        if mission.row.time_arrival < mission.row.time_departure {
            return Err(InvariantViolation::MissionTimeline(id).logged().into());
        }
        Ok(mission.row.duration())
    }

    /// Flight time and fuel a dispatch would need, without sending.
    pub fn estimate_flight(
        &self,
        player: PlayerId,
        request: &DispatchRequest,
    ) -> Result<crate::fleet::FlightPlan, EngineError> {
        let account = self
            .store
            .player(player)?
            .ok_or(ValidationError::UnknownPlayer(player))?;
        let origin = self
            .store
            .planet(request.origin)?
            .ok_or(ValidationError::UnknownPlanet(request.origin))?;
        self.fleets()
            .plan_flight(
                &origin.row.coordinate,
                &request.destination,
                &request.units,
                &account.row,
                request.speed_percent,
            )
            .map_err(|e| EngineError::Validation(e.into()))
    }
}
