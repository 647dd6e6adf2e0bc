//! Error tiers of the engine.
//!
//! - [`ValidationError`]: a request was rejected before any state changed.
//! - [`InvariantViolation`]: persisted state is inconsistent. Fatal for the
//!   operation that found it; logged at `error` level on construction via
//!   [`InvariantViolation::logged`].
//! - [`StoreError`]: the persistence layer failed.
//!
//! Losing an idempotency claim is not an error; see [`crate::guard::Claim`].

use crate::catalog::{CatalogError, Requirement, UnitRole};
use crate::clock::Timestamp;
use crate::coords::Coordinate;
use crate::id::{MissionId, PlanetId, PlayerId, QueueItemId, UnitTypeId};
use crate::units::UnitShortfall;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Why a destination is not legal for the requested mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationIssue {
    OutOfRange,
    SameAsOrigin,
    /// Colonization needs an empty slot.
    Occupied,
    /// The mission needs a planet at the destination.
    NoPlanet,
    /// Attacks and espionage may not target your own planets.
    OwnPlanet,
    /// Deployment only goes to your own planets.
    ForeignPlanet,
    /// Expeditions go to the deep-space slot and only there.
    ExpeditionSlot,
    NoDebris,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("insufficient resources: need {needed:?}, have {available:?}")]
    InsufficientResources {
        needed: (u64, u64, u64),
        available: (u64, u64, u64),
    },
    #[error(transparent)]
    InsufficientUnits(#[from] UnitShortfall),
    #[error("requirement not met: {0:?}")]
    RequirementsNotMet(Requirement),
    #[error("invalid destination {destination}: {issue:?}")]
    InvalidDestination {
        destination: Coordinate,
        issue: DestinationIssue,
    },
    #[error("fleet slots exceeded ({used} of {max} in use)")]
    FleetSlotsExceeded { used: u32, max: u32 },
    #[error("insufficient fuel: need {needed} deuterium, have {available}")]
    InsufficientFuel { needed: u64, available: u64 },
    #[error("cargo of {requested} exceeds capacity {capacity}")]
    InsufficientCargo { requested: u64, capacity: u64 },
    #[error("speed must be a multiple of 10 between 10 and 100, got {0}")]
    InvalidSpeed(u32),
    #[error("fleet has no ships")]
    EmptyFleet,
    #[error("fleet of {units} units exceeds the limit of {limit}")]
    FleetTooLarge { units: u64, limit: u64 },
    #[error("unit {0:?} cannot fly")]
    StationaryUnit(UnitTypeId),
    #[error("mission needs at least one unit with role {0:?}")]
    MissingRole(UnitRole),
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("order cost or build time is out of range")]
    OrderTooLarge,
    #[error("queue is full ({limit} items)")]
    QueueFull { limit: usize },
    #[error("no free building fields on planet {0:?}")]
    FieldsExhausted(PlanetId),
    #[error("planet limit of {0} reached")]
    PlanetLimitReached(u32),
    #[error("player {player:?} does not own planet {planet:?}")]
    NotOwner { player: PlayerId, planet: PlanetId },
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),
    #[error("unknown planet {0:?}")]
    UnknownPlanet(PlanetId),
    #[error("unknown mission {0:?}")]
    UnknownMission(MissionId),
    #[error("unknown queue item {0:?}")]
    UnknownQueueItem(QueueItemId),
    #[error("mission {0:?} cannot be recalled")]
    NotRecallable(MissionId),
    #[error("queue item {0:?} cannot be cancelled")]
    NotCancellable(QueueItemId),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Invariant violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("queue item {item:?} completes at {completion} before it starts at {start}")]
    CompletionBeforeStart {
        item: QueueItemId,
        start: Timestamp,
        completion: Timestamp,
    },
    #[error("queue item {item:?} starts before its predecessor completes")]
    QueueOverlap { item: QueueItemId },
    #[error("negative resource stock on planet {0:?}")]
    NegativeStock(PlanetId),
    #[error("planet {planet:?} last updated at {last_update}, after {until}")]
    AccrualBackwards {
        planet: PlanetId,
        last_update: Timestamp,
        until: Timestamp,
    },
    #[error("mission {0:?} is already processed")]
    MissionReprocessed(MissionId),
    #[error("mission {0:?} arrives before it departs")]
    MissionTimeline(MissionId),
    #[error("mission {0:?} carries no units")]
    EmptyMission(MissionId),
    #[error("return mission {0:?} has no home planet")]
    MissingHome(MissionId),
    #[error("units on {planet:?} cannot cover a recorded loss: {shortfall}")]
    UnitUnderflow {
        planet: PlanetId,
        shortfall: UnitShortfall,
    },
    #[error("queue item {0:?} can no longer be scheduled")]
    ScheduleOverflow(QueueItemId),
    #[error("resources credited to planet {0:?} exceed the representable stock")]
    StockOverflow(PlanetId),
    #[error("resources carried by mission {0:?} exceed the representable stock")]
    PayloadOverflow(MissionId),
    #[error("debris at {0} exceeds the representable stock")]
    DebrisOverflow(Coordinate),
    #[error("battle of mission {mission:?} has {units} units on one side, limit {limit}")]
    BattleTooLarge {
        mission: MissionId,
        units: u64,
        limit: u64,
    },
    #[error("catalog entry referenced by stored state is missing: {0}")]
    MissingCatalogEntry(CatalogError),
}

impl InvariantViolation {
    /// Log the violation and hand it back for propagation.
    pub fn logged(self) -> Self {
        tracing::error!(violation = %self, "invariant violation detected");
        self
    }
}

// ---------------------------------------------------------------------------
// Store and engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store row is corrupt: {0}")]
    Corrupt(String),
}

/// Everything an engine operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A user-initiated write kept colliding with concurrent writers.
    #[error("operation kept conflicting with concurrent updates")]
    Contended,
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}
