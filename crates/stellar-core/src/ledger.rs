//! Resource production and lazy accrual.
//!
//! A planet's stock is only ever brought forward by [`ResourceLedger::accrue`],
//! which credits `rate x elapsed` and moves `last_update` in the same step.
//! Because the credit and the timestamp live in the same row, a second
//! accrual over the same interval finds nothing left to credit.

use serde::{Deserialize, Serialize};

use crate::catalog::{BuildingRole, Catalog};
use crate::clock::Timestamp;
use crate::error::InvariantViolation;
use crate::fixed::{Fixed64, millis_to_hours, pow};
use crate::planet::Planet;
use crate::resources::{ResourceKind, Resources};

/// Hourly output of a planet and the energy balance that limits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    /// Net hourly change of each stocked resource, after the energy factor.
    pub hourly: Resources,
    pub energy_produced: Fixed64,
    pub energy_consumed: Fixed64,
    /// `min(1, produced / consumed)`; 1 when nothing consumes energy.
    pub factor: Fixed64,
}

/// Computes production rates and storage limits from a [`Catalog`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceLedger<'a> {
    catalog: &'a Catalog,
}

impl<'a> ResourceLedger<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Production of `planet` at its current building levels.
    pub fn production(&self, planet: &Planet) -> Production {
        let balance = &self.catalog.balance;
        let speed = Fixed64::from_num(balance.universe_speed.max(1));

        let mut gross = Resources::ZERO;
        let mut upkeep = Resources::ZERO;
        let mut energy_produced = Fixed64::ZERO;
        let mut energy_consumed = Fixed64::ZERO;

        for building in self.catalog.buildings() {
            let level = planet.building_level(building.id);
            if level == 0 {
                continue;
            }
            for y in &building.yields {
                let amount = y.at_level(level);
                match (y.resource, amount >= Fixed64::ZERO) {
                    (ResourceKind::Energy, true) => {
                        energy_produced = energy_produced.saturating_add(amount)
                    }
                    (ResourceKind::Energy, false) => {
                        energy_consumed = energy_consumed.saturating_sub(amount)
                    }
                    (kind, true) => {
                        let slot = gross.get_mut(kind);
                        *slot = slot.saturating_add(amount.saturating_mul(speed));
                    }
                    (kind, false) => {
                        let slot = upkeep.get_mut(kind);
                        *slot = slot.saturating_add(amount.saturating_mul(speed));
                    }
                }
            }
        }

        let factor = if energy_consumed <= Fixed64::ZERO {
            Fixed64::ONE
        } else {
            (energy_produced / energy_consumed).min(Fixed64::ONE)
        };

        let mut hourly = gross
            .scaled(factor)
            .saturating_add(&upkeep)
            .saturating_add(&balance.base_income.scaled(speed));
        hourly.energy = energy_produced.saturating_sub(energy_consumed);

        Production {
            hourly,
            energy_produced,
            energy_consumed,
            factor,
        }
    }

    /// Storage capacity per stocked resource.
    pub fn capacity(&self, planet: &Planet) -> Resources {
        let balance = &self.catalog.balance;
        let mut cap = Resources::ZERO;
        for kind in ResourceKind::STOCKED {
            let level = self
                .catalog
                .building_level(&planet.buildings, BuildingRole::Storage(kind));
            *cap.get_mut(kind) = balance
                .storage_base
                .saturating_mul(pow(balance.storage_growth, level))
                .floor();
        }
        cap
    }

    /// Bring `planet` forward to `until`.
    ///
    /// Production stops at storage capacity; stock already above capacity
    /// (from deliveries or loot) is kept but does not grow. Consumption
    /// stops at zero. Returns `false` when `until` is not after
    /// `last_update` and nothing changed.
    pub fn accrue(&self, planet: &mut Planet, until: Timestamp) -> Result<bool, InvariantViolation> {
        if planet.resources.has_negative() {
            return Err(InvariantViolation::NegativeStock(planet.id).logged());
        }
        if until <= planet.last_update {
            if until < planet.last_update {
                tracing::debug!(
                    planet = ?planet.id,
                    last_update = %planet.last_update,
                    until = %until,
                    "accrual target precedes last update"
                );
            }
            return Ok(false);
        }

        let elapsed_ms = (until - planet.last_update).num_milliseconds();
        let hours = millis_to_hours(elapsed_ms);
        let rates = self.production(planet).hourly;
        let cap = self.capacity(planet);

        for kind in ResourceKind::STOCKED {
            let rate = rates.get(kind);
            let limit = cap.get(kind);
            let stock = planet.resources.get_mut(kind);
            let delta = rate.saturating_mul(hours);
            if rate >= Fixed64::ZERO {
                if *stock < limit {
                    *stock = stock.saturating_add(delta).min(limit);
                }
            } else {
                *stock = stock.saturating_add(delta).max(Fixed64::ZERO);
            }
        }

        tracing::debug!(
            planet = ?planet.id,
            from = %planet.last_update,
            until = %until,
            "accrued resources"
        );
        planet.last_update = until;
        Ok(true)
    }
}
