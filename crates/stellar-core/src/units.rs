//! Ship and defense counts, used both as planet inventory and as a fleet
//! manifest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::UnitTypeId;

/// Not enough units of one type to satisfy a subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("need {requested} of {unit:?}, only {available} present")]
pub struct UnitShortfall {
    pub unit: UnitTypeId,
    pub requested: u64,
    pub available: u64,
}

/// Mapping from unit type to count. Zero entries are never stored, so two
/// collections with the same non-zero counts compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCollection {
    counts: BTreeMap<UnitTypeId, u64>,
}

impl UnitCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(unit, count)` pairs, merging duplicates.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (UnitTypeId, u64)>) -> Self {
        let mut c = Self::new();
        for (unit, n) in pairs {
            c.add(unit, n);
        }
        c
    }

    pub fn get(&self, unit: UnitTypeId) -> u64 {
        self.counts.get(&unit).copied().unwrap_or(0)
    }

    pub fn add(&mut self, unit: UnitTypeId, n: u64) {
        if n == 0 {
            return;
        }
        let slot = self.counts.entry(unit).or_insert(0);
        *slot = slot.saturating_add(n);
    }

    /// Remove `n` units of one type, failing without change if short.
    pub fn remove(&mut self, unit: UnitTypeId, n: u64) -> Result<(), UnitShortfall> {
        let available = self.get(unit);
        if available < n {
            return Err(UnitShortfall {
                unit,
                requested: n,
                available,
            });
        }
        if available == n {
            self.counts.remove(&unit);
        } else if n > 0 {
            self.counts.insert(unit, available - n);
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &UnitCollection) {
        for (unit, n) in other.iter() {
            self.add(unit, n);
        }
    }

    /// True if every count in `other` is available here.
    pub fn contains(&self, other: &UnitCollection) -> bool {
        other.iter().all(|(unit, n)| self.get(unit) >= n)
    }

    /// Remove every count in `other`, all or nothing.
    pub fn subtract(&mut self, other: &UnitCollection) -> Result<(), UnitShortfall> {
        if let Some((unit, n)) = other.iter().find(|(unit, n)| self.get(*unit) < *n) {
            return Err(UnitShortfall {
                unit,
                requested: n,
                available: self.get(unit),
            });
        }
        for (unit, n) in other.iter() {
            self.remove(unit, n)?;
        }
        Ok(())
    }

    /// Units present here but missing from `survivors`, per type.
    pub fn losses_against(&self, survivors: &UnitCollection) -> UnitCollection {
        UnitCollection::from_pairs(
            self.iter()
                .map(|(unit, n)| (unit, n.saturating_sub(survivors.get(unit)))),
        )
    }

    /// Keep only the types accepted by `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(UnitTypeId) -> bool) -> UnitCollection {
        UnitCollection::from_pairs(self.iter().filter(|(unit, _)| keep(*unit)))
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0, |acc, n| acc.saturating_add(*n))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitTypeId, u64)> + '_ {
        self.counts.iter().map(|(u, n)| (*u, *n))
    }
}
