use std::fmt;

use serde::{Deserialize, Serialize};

/// A location in the universe: galaxy, solar system, orbital position, and
/// whether the body at that position is the moon rather than the planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub galaxy: u16,
    pub system: u16,
    pub position: u8,
    #[serde(default)]
    pub is_moon: bool,
}

impl Coordinate {
    pub fn planet(galaxy: u16, system: u16, position: u8) -> Self {
        Self {
            galaxy,
            system,
            position,
            is_moon: false,
        }
    }

    pub fn moon(galaxy: u16, system: u16, position: u8) -> Self {
        Self {
            is_moon: true,
            ..Self::planet(galaxy, system, position)
        }
    }

    /// The orbital slot this coordinate sits in. Debris fields are keyed by
    /// slot, shared by the planet and its moon.
    pub fn slot(&self) -> Coordinate {
        Coordinate {
            is_moon: false,
            ..*self
        }
    }

    /// True when both coordinates share galaxy, system and position.
    pub fn same_slot(&self, other: &Coordinate) -> bool {
        self.slot() == other.slot()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.galaxy, self.system, self.position)?;
        if self.is_moon {
            write!(f, " (moon)")?;
        }
        Ok(())
    }
}
