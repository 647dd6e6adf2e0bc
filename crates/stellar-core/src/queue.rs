//! Time-ordered construction, research and shipyard queues.
//!
//! A queue is the list of [`QueueItem`] rows sharing a [`QueueScope`],
//! ordered by completion. The head is the item in progress; every later
//! item starts when its predecessor completes. Costs are deducted at
//! enqueue and refunded on cancel, so completing an item never re-checks
//! affordability.

use serde::{Deserialize, Serialize};

use crate::catalog::{BuildingRole, Catalog, CatalogError};
use crate::clock::{Timestamp, after, checked_after};
use crate::error::{InvariantViolation, ValidationError};
use crate::fixed::{Fixed64, Seconds, floor_u64};
use crate::id::{BuildingTypeId, PlanetId, PlayerId, QueueItemId, ResearchId, UnitTypeId};
use crate::ledger::ResourceLedger;
use crate::planet::{Planet, Player};
use crate::resources::Resources;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    Construction,
    Research,
    Shipyard,
}

/// Which queue an item belongs to. Construction and shipyard queues are
/// per planet; research runs one queue per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueScope {
    Planet(PlanetId, QueueKind),
    Research(PlayerId),
}

/// What a player asks to have built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueOrder {
    Building(BuildingTypeId),
    Research(ResearchId),
    Units { unit: UnitTypeId, count: u64 },
}

/// What a queued item produces when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueTarget {
    Building { building: BuildingTypeId, level: u32 },
    Research { research: ResearchId, level: u32 },
    Units { unit: UnitTypeId, count: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub kind: QueueKind,
    pub owner: PlayerId,
    /// Planet the work happens on (the lab planet for research).
    pub planet: PlanetId,
    pub target: QueueTarget,
    /// Deducted at enqueue; returned in full on cancel.
    pub cost: Resources,
    pub requested_start: Timestamp,
    pub start: Timestamp,
    /// Fixed when the item starts; tentative before that.
    pub duration: Seconds,
    pub completion: Timestamp,
}

impl QueueItem {
    pub fn scope(&self) -> QueueScope {
        match self.kind {
            QueueKind::Research => QueueScope::Research(self.owner),
            kind => QueueScope::Planet(self.planet, kind),
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.completion <= now
    }
}

/// Result of a successful cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub removed: QueueItem,
    pub refund: Resources,
    /// Later items of the same queue with their new times.
    pub rescheduled: Vec<QueueItem>,
}

// ---------------------------------------------------------------------------
// Schedule checks
// ---------------------------------------------------------------------------

/// Verify that items are ordered, non-overlapping and well-formed.
pub fn check_schedule(queue: &[QueueItem]) -> Result<(), InvariantViolation> {
    let mut prev: Option<Timestamp> = None;
    for item in queue {
        if item.completion < item.start {
            return Err(InvariantViolation::CompletionBeforeStart {
                item: item.id,
                start: item.start,
                completion: item.completion,
            }
            .logged());
        }
        if let Some(p) = prev
            && item.start < p
        {
            return Err(InvariantViolation::QueueOverlap { item: item.id }.logged());
        }
        prev = Some(item.completion);
    }
    Ok(())
}

fn missing(e: CatalogError) -> InvariantViolation {
    InvariantViolation::MissingCatalogEntry(e).logged()
}

// ---------------------------------------------------------------------------
// QueueProcessor
// ---------------------------------------------------------------------------

/// Costs, durations and transitions of queue items.
#[derive(Debug, Clone, Copy)]
pub struct QueueProcessor<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueueProcessor<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Cost of a target. Orders whose cost leaves the Q32.32 range are
    /// rejected rather than capped.
    pub fn cost(&self, target: &QueueTarget) -> Result<Resources, ValidationError> {
        let cost = match *target {
            QueueTarget::Building { building, level } => {
                self.catalog.building(building)?.cost_at(level)
            }
            QueueTarget::Research { research, level } => {
                self.catalog.research(research)?.cost_at(level)
            }
            QueueTarget::Units { unit, count } => {
                let count = Fixed64::checked_from_num(count).ok_or(ValidationError::OrderTooLarge)?;
                self.catalog.unit(unit)?.cost.checked_scaled(count)
            }
        };
        cost.ok_or(ValidationError::OrderTooLarge)
    }

    /// Seconds needed to complete `target` with the facilities on `planet`.
    pub fn duration(&self, target: &QueueTarget, planet: &Planet) -> Result<Seconds, ValidationError> {
        let balance = &self.catalog.balance;
        let speed = u128::from(balance.universe_speed.max(1));
        let robotics = u128::from(
            self.catalog
                .building_level(&planet.buildings, BuildingRole::RoboticsFactory),
        );
        let nanite = self
            .catalog
            .building_level(&planet.buildings, BuildingRole::NaniteFactory)
            .min(32);
        let nanite_factor = 1u128 << nanite;

        let secs = match *target {
            QueueTarget::Building { building, level } => {
                let work = self.catalog.building(building)?.cost_at(level).map(|c| c.structural());
                work_seconds(work, 2_500 * (1 + robotics) * nanite_factor * speed)
            }
            QueueTarget::Research { research, level } => {
                let lab = u128::from(
                    self.catalog
                        .building_level(&planet.buildings, BuildingRole::ResearchLab),
                );
                let work = self.catalog.research(research)?.cost_at(level).map(|c| c.structural());
                work_seconds(work, 1_000 * (1 + lab) * speed)
            }
            QueueTarget::Units { unit, count } => {
                let shipyard = u128::from(
                    self.catalog
                        .building_level(&planet.buildings, BuildingRole::Shipyard),
                );
                let work = Some(self.catalog.unit(unit)?.cost.structural());
                work_seconds(work, 2_500 * (1 + shipyard) * nanite_factor * speed)
                    .zip(i64::try_from(count).ok())
                    .and_then(|(each, count)| each.checked_mul(count))
            }
        };
        secs.ok_or(ValidationError::OrderTooLarge)
    }

    /// Validate an order and append it to `queue`'s schedule.
    ///
    /// `planet` must already be accrued to `now`; the cost is deducted
    /// from it. The returned item is not yet persisted.
    pub fn enqueue(
        &self,
        order: QueueOrder,
        id: QueueItemId,
        planet: &mut Planet,
        player: &Player,
        queue: &[QueueItem],
        now: Timestamp,
    ) -> Result<QueueItem, ValidationError> {
        let limit = self.catalog.balance.queue_limit;
        if queue.len() >= limit {
            return Err(ValidationError::QueueFull { limit });
        }

        let (kind, target, requirements) = match order {
            QueueOrder::Building(building) => {
                let spec = self.catalog.building(building)?;
                let queued = queue
                    .iter()
                    .filter(|i| matches!(i.target, QueueTarget::Building { building: b, .. } if b == building))
                    .count() as u32;
                if planet.fields_used() + queue.len() as u32 >= planet.fields_max {
                    return Err(ValidationError::FieldsExhausted(planet.id));
                }
                let level = planet.building_level(building) + queued + 1;
                (
                    QueueKind::Construction,
                    QueueTarget::Building { building, level },
                    spec.requirements.as_slice(),
                )
            }
            QueueOrder::Research(research) => {
                let spec = self.catalog.research(research)?;
                let queued = queue
                    .iter()
                    .filter(|i| matches!(i.target, QueueTarget::Research { research: r, .. } if r == research))
                    .count() as u32;
                let level = player.research_level(research) + queued + 1;
                (
                    QueueKind::Research,
                    QueueTarget::Research { research, level },
                    spec.requirements.as_slice(),
                )
            }
            QueueOrder::Units { unit, count } => {
                if count == 0 {
                    return Err(ValidationError::InvalidQuantity);
                }
                let spec = self.catalog.unit(unit)?;
                (
                    QueueKind::Shipyard,
                    QueueTarget::Units { unit, count },
                    spec.requirements.as_slice(),
                )
            }
        };

        self.catalog
            .requirements_met(requirements, &planet.buildings, &player.research)
            .map_err(ValidationError::RequirementsNotMet)?;

        let cost = self.cost(&target)?;
        let start = queue.last().map_or(now, |last| last.completion.max(now));
        let duration = self.duration(&target, planet)?;
        let completion = checked_after(start, duration).ok_or(ValidationError::OrderTooLarge)?;
        planet.resources = planet.resources.checked_sub(&cost).ok_or(
            ValidationError::InsufficientResources {
                needed: cost.whole(),
                available: planet.resources.whole(),
            },
        )?;

        Ok(QueueItem {
            id,
            kind,
            owner: player.id,
            planet: planet.id,
            target,
            cost,
            requested_start: now,
            start,
            duration,
            completion,
        })
    }

    /// Apply a completed item's effect.
    pub fn apply(&self, item: &QueueItem, planet: &mut Planet, player: &mut Player) {
        match item.target {
            QueueTarget::Building { building, level } => {
                planet.buildings.insert(building, level);
            }
            QueueTarget::Research { research, level } => {
                player.research.insert(research, level);
            }
            QueueTarget::Units { unit, count } => {
                planet.units.add(unit, count);
            }
        }
        tracing::debug!(
            item = ?item.id,
            planet = ?item.planet,
            target = ?item.target,
            at = %item.completion,
            "queue item completed"
        );
    }

    /// Start `next` after its predecessor completed at `prev_completion`,
    /// fixing its duration with the facilities `planet` has now.
    pub fn start_next(
        &self,
        next: &mut QueueItem,
        prev_completion: Timestamp,
        planet: &Planet,
    ) -> Result<(), InvariantViolation> {
        let overflow = || InvariantViolation::ScheduleOverflow(next.id).logged();
        next.start = prev_completion.max(next.requested_start);
        next.duration = match self.duration(&next.target, planet) {
            Ok(secs) => secs,
            Err(ValidationError::Catalog(e)) => return Err(missing(e)),
            Err(_) => return Err(overflow()),
        };
        next.completion = checked_after(next.start, next.duration).ok_or_else(overflow)?;
        Ok(())
    }

    /// Complete the due head `item` and start its successor `next`.
    ///
    /// `planet` is accrued to the completion instant before the effect is
    /// applied, so production changes take effect exactly when the
    /// building finishes; `next` is timed with the facilities that result.
    pub fn complete(
        &self,
        item: &QueueItem,
        next: Option<&mut QueueItem>,
        planet: &mut Planet,
        player: &mut Player,
    ) -> Result<(), InvariantViolation> {
        ResourceLedger::new(self.catalog).accrue(planet, item.completion)?;
        self.apply(item, planet, player);
        if let Some(next) = next {
            self.start_next(next, item.completion, planet)?;
        }
        Ok(())
    }

    /// Remove an item and refund its cost.
    ///
    /// Items that have not started can always be cancelled. The running
    /// head only when it is the sole item and the balance allows it. A
    /// level cannot be cancelled while a higher level of the same target
    /// is queued behind it.
    pub fn cancel(
        &self,
        queue: &[QueueItem],
        item: QueueItemId,
        now: Timestamp,
    ) -> Result<Cancellation, ValidationError> {
        let idx = queue
            .iter()
            .position(|i| i.id == item)
            .ok_or(ValidationError::UnknownQueueItem(item))?;
        let removed = &queue[idx];

        let started = idx == 0 && removed.start <= now;
        if started && !(queue.len() == 1 && self.catalog.balance.allow_head_cancel) {
            return Err(ValidationError::NotCancellable(item));
        }
        let blocked = queue[idx + 1..].iter().any(|later| match (removed.target, later.target) {
            (
                QueueTarget::Building { building: a, level: la },
                QueueTarget::Building { building: b, level: lb },
            ) => a == b && lb > la,
            (
                QueueTarget::Research { research: a, level: la },
                QueueTarget::Research { research: b, level: lb },
            ) => a == b && lb > la,
            _ => false,
        });
        if blocked {
            return Err(ValidationError::NotCancellable(item));
        }

        let mut prev = if idx == 0 { now } else { queue[idx - 1].completion };
        let mut rescheduled = Vec::new();
        for later in &queue[idx + 1..] {
            let mut moved = later.clone();
            moved.start = prev.max(moved.requested_start);
            moved.completion = after(moved.start, moved.duration);
            prev = moved.completion;
            rescheduled.push(moved);
        }

        Ok(Cancellation {
            removed: removed.clone(),
            refund: removed.cost,
            rescheduled,
        })
    }
}

/// Whole seconds for `work` structural points at `per_hour`, at least one.
fn work_seconds(work: Option<Fixed64>, per_hour: u128) -> Option<Seconds> {
    let work = u128::from(floor_u64(work?));
    let secs = work * 3_600 / per_hour.max(1);
    i64::try_from(secs).ok().map(|s| s.max(1))
}
