//! Deterministic PRNG for battle and expedition resolution.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, excellent
//! statistical properties. Every random decision the engine makes is drawn
//! from a generator seeded by the mission id, so replays and reports
//! reproduce identically on any worker.

use crate::fixed::Fixed64;
use crate::id::MissionId;

/// Mixing constant used to derive independent per-round streams.
const ROUND_SALT: u64 = 0xD1B5_4A32_D192_ED03;

/// Mixing constant for expedition outcome streams.
const EXPEDITION_SALT: u64 = 0x8CB9_2BA7_2F3D_8DD7;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generator for one battle round. Round streams are independent, so a
    /// change in how many draws round 2 makes never shifts round 3.
    pub fn for_round(mission: MissionId, round: u32) -> Self {
        let mut seeder = Self::new(mission.0 ^ ROUND_SALT.wrapping_mul(u64::from(round) + 1));
        Self::new(seeder.next_u64())
    }

    /// Generator for an expedition's outcome rolls, independent of the
    /// battle streams of the same mission.
    pub fn for_expedition(mission: MissionId) -> Self {
        let mut seeder = Self::new(mission.0.rotate_left(17) ^ EXPEDITION_SALT);
        Self::new(seeder.next_u64())
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform index in `0..bound`. Returns 0 for an empty range.
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((u128::from(self.next_u64()) * bound as u128) >> 64) as usize
    }

    /// Returns `true` with the given probability (Fixed64 in [0, 1]).
    ///
    /// - probability <= 0 always returns false
    /// - probability >= 1 always returns true
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0,1) the raw Q32.32 bits are the fraction scaled to
        // [0, 2^32); compare against a uniform u32.
        let upper = (self.next_u64() >> 32) as u32;
        u64::from(upper) < probability.to_bits() as u64
    }

    /// Uniform fraction in [0, 1).
    pub fn fraction(&mut self) -> Fixed64 {
        Fixed64::from_bits((self.next_u64() >> 32) as i64)
    }

    /// Pick an index proportionally to `weights`. Returns `None` when every
    /// weight is zero.
    pub fn weighted(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
        if total == 0 {
            return None;
        }
        let mut roll = ((u128::from(self.next_u64()) * u128::from(total)) >> 64) as u64;
        for (i, w) in weights.iter().enumerate() {
            let w = u64::from(*w);
            if roll < w {
                return Some(i);
            }
            roll -= w;
        }
        None
    }

    /// Get the internal state.
    pub fn state(&self) -> u64 {
        self.state
    }
}
