//! Stellar Core -- a lazily evaluated simulation engine for space-strategy
//! games.
//!
//! Nothing ticks in the background. Every state transition (resource
//! accrual, queue completion, fleet arrival, battle) is computed on demand
//! when a request touches the affected player, in event-time order, and
//! committed atomically through a versioned [`store::Store`].
//!
//! # Catch-up Pass
//!
//! Each operation on [`engine::Engine`] first brings the player up to date:
//!
//! 1. **Collect** -- due queue heads and due fleet arrivals that involve the
//!    player's planets.
//! 2. **Order** -- by event time, queue completions before arrivals, then id.
//! 3. **Apply** -- accrue the affected planet to the event instant and apply
//!    the effect, claimed through the [`guard::IdempotencyGuard`] so that
//!    concurrent workers apply it exactly once.
//! 4. **Settle** -- accrue every planet of the player to now.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Catch-up orchestrator and request operations.
//! - [`ledger::ResourceLedger`] -- Production rates and lazy accrual.
//! - [`queue::QueueProcessor`] -- Construction, research and shipyard queues.
//! - [`fleet::FleetMissionEngine`] -- Dispatch validation and arrival effects.
//! - [`combat::CombatResolver`] -- Seeded round-based battles.
//! - [`store::Store`] -- Versioned rows with conditional commits.
//! - [`catalog::Catalog`] -- Unit, building and research definitions plus
//!   balance constants (frozen at startup).
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`serialize`] -- Versioned store snapshots via bitcode.

pub mod catalog;
pub mod clock;
pub mod combat;
pub mod coords;
pub mod engine;
pub mod error;
pub mod espionage;
pub mod expedition;
pub mod fixed;
pub mod fleet;
pub mod guard;
pub mod id;
pub mod ledger;
pub mod message;
pub mod mission;
pub mod planet;
pub mod queue;
pub mod resources;
pub mod rng;
pub mod serialize;
pub mod store;
pub mod travel;
pub mod units;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
