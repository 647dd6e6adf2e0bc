//! Resource quantities: stock, costs, cargo, loot and debris all share the
//! same [`Resources`] bundle.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, floor_u64};

/// One kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Metal,
    Crystal,
    Deuterium,
    Energy,
}

impl ResourceKind {
    /// The three kinds that are stocked, transported and looted.
    pub const STOCKED: [ResourceKind; 3] = [Self::Metal, Self::Crystal, Self::Deuterium];
}

/// A bundle of metal, crystal, deuterium and energy.
///
/// Quantities are never negative: subtraction is checked and fails as a
/// whole rather than clamping one component. Energy travels along for
/// costs and for the planet's energy balance but is never accrued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub metal: Fixed64,
    pub crystal: Fixed64,
    pub deuterium: Fixed64,
    #[serde(default)]
    pub energy: Fixed64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        metal: Fixed64::ZERO,
        crystal: Fixed64::ZERO,
        deuterium: Fixed64::ZERO,
        energy: Fixed64::ZERO,
    };

    /// Whole-number constructor for metal, crystal and deuterium.
    pub fn new(metal: u32, crystal: u32, deuterium: u32) -> Self {
        Self {
            metal: Fixed64::from_num(metal),
            crystal: Fixed64::from_num(crystal),
            deuterium: Fixed64::from_num(deuterium),
            energy: Fixed64::ZERO,
        }
    }

    pub fn with_energy(mut self, energy: u32) -> Self {
        self.energy = Fixed64::from_num(energy);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Fixed64 {
        match kind {
            ResourceKind::Metal => self.metal,
            ResourceKind::Crystal => self.crystal,
            ResourceKind::Deuterium => self.deuterium,
            ResourceKind::Energy => self.energy,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut Fixed64 {
        match kind {
            ResourceKind::Metal => &mut self.metal,
            ResourceKind::Crystal => &mut self.crystal,
            ResourceKind::Deuterium => &mut self.deuterium,
            ResourceKind::Energy => &mut self.energy,
        }
    }

    /// True when every component is zero or less.
    pub fn is_empty(&self) -> bool {
        self.metal <= Fixed64::ZERO
            && self.crystal <= Fixed64::ZERO
            && self.deuterium <= Fixed64::ZERO
    }

    /// True when any component is negative.
    pub fn has_negative(&self) -> bool {
        self.metal < Fixed64::ZERO
            || self.crystal < Fixed64::ZERO
            || self.deuterium < Fixed64::ZERO
            || self.energy < Fixed64::ZERO
    }

    /// Sum of the three stocked kinds.
    pub fn total(&self) -> Fixed64 {
        self.metal
            .saturating_add(self.crystal)
            .saturating_add(self.deuterium)
    }

    /// Metal plus crystal, the basis for build times and unit integrity.
    pub fn structural(&self) -> Fixed64 {
        self.metal.saturating_add(self.crystal)
    }

    /// True if `self` holds at least `other` of every stocked kind.
    pub fn covers(&self, other: &Resources) -> bool {
        self.metal >= other.metal
            && self.crystal >= other.crystal
            && self.deuterium >= other.deuterium
    }

    /// Saturating sum, for hourly rates only. Stock and cargo use
    /// [`Resources::checked_add`].
    pub fn saturating_add(&self, other: &Resources) -> Resources {
        Resources {
            metal: self.metal.saturating_add(other.metal),
            crystal: self.crystal.saturating_add(other.crystal),
            deuterium: self.deuterium.saturating_add(other.deuterium),
            energy: self.energy.saturating_add(other.energy),
        }
    }

    /// Sum of every component; `None` if any leaves the Q32.32 range.
    pub fn checked_add(&self, other: &Resources) -> Option<Resources> {
        Some(Resources {
            metal: self.metal.checked_add(other.metal)?,
            crystal: self.crystal.checked_add(other.crystal)?,
            deuterium: self.deuterium.checked_add(other.deuterium)?,
            energy: self.energy.checked_add(other.energy)?,
        })
    }

    /// Subtract the stocked kinds; `None` if any would go negative.
    /// Energy is left untouched.
    pub fn checked_sub(&self, other: &Resources) -> Option<Resources> {
        if !self.covers(other) {
            return None;
        }
        Some(Resources {
            metal: self.metal - other.metal,
            crystal: self.crystal - other.crystal,
            deuterium: self.deuterium - other.deuterium,
            energy: self.energy,
        })
    }

    /// Multiply every component by `factor`.
    pub fn scaled(&self, factor: Fixed64) -> Resources {
        Resources {
            metal: self.metal.saturating_mul(factor),
            crystal: self.crystal.saturating_mul(factor),
            deuterium: self.deuterium.saturating_mul(factor),
            energy: self.energy.saturating_mul(factor),
        }
    }

    /// Multiply every component by `factor`; `None` on overflow.
    pub fn checked_scaled(&self, factor: Fixed64) -> Option<Resources> {
        Some(Resources {
            metal: self.metal.checked_mul(factor)?,
            crystal: self.crystal.checked_mul(factor)?,
            deuterium: self.deuterium.checked_mul(factor)?,
            energy: self.energy.checked_mul(factor)?,
        })
    }

    /// Drop fractional parts; cargo and loot move in whole units.
    pub fn floored(&self) -> Resources {
        Resources {
            metal: self.metal.floor(),
            crystal: self.crystal.floor(),
            deuterium: self.deuterium.floor(),
            energy: self.energy.floor(),
        }
    }

    /// Round to the nearest whole unit.
    pub fn rounded(&self) -> Resources {
        Resources {
            metal: self.metal.round(),
            crystal: self.crystal.round(),
            deuterium: self.deuterium.round(),
            energy: self.energy.round(),
        }
    }

    /// Whole-unit view `(metal, crystal, deuterium)` for reports.
    pub fn whole(&self) -> (u64, u64, u64) {
        (
            floor_u64(self.metal),
            floor_u64(self.crystal),
            floor_u64(self.deuterium),
        )
    }
}
