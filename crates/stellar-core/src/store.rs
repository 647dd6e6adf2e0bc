//! Persistence contract and an in-memory implementation.
//!
//! Every row carries a version that increases on each write. Writers read
//! rows, compute their change and submit a [`ChangeSet`]: the checks name
//! the versions they read, and the commit applies all writes only if every
//! check still holds. That single conditional commit is what makes each
//! state transition happen at most once across workers that share nothing
//! but the store.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::coords::Coordinate;
use crate::error::StoreError;
use crate::id::{MissionId, PlanetId, PlayerId, QueueItemId};
use crate::mission::FleetMission;
use crate::planet::{DebrisField, Planet, Player};
use crate::queue::{QueueItem, QueueScope};

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// A row together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub row: T,
}

/// Id sequences the store hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Player,
    Planet,
    Mission,
    QueueItem,
}

/// A precondition of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Player { id: PlayerId, version: u64 },
    Planet { id: PlanetId, version: u64 },
    Mission { id: MissionId, version: u64 },
    QueueItem { id: QueueItemId, version: u64 },
    /// `None` requires that no debris field exists at the slot.
    Debris { slot: Coordinate, version: Option<u64> },
    /// No planet at this exact coordinate.
    PositionVacant(Coordinate),
}

/// One write of a commit. `Put*` replaces a row and bumps its version;
/// `Insert*` fails the commit if the id (or a planet's coordinate) is
/// taken.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertPlayer(Player),
    PutPlayer(Player),
    InsertPlanet(Planet),
    PutPlanet(Planet),
    InsertMission(FleetMission),
    PutMission(FleetMission),
    InsertQueueItem(QueueItem),
    PutQueueItem(QueueItem),
    DeleteQueueItem(QueueItemId),
    PutDebris(DebrisField),
    DeleteDebris(Coordinate),
}

/// Checks and writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub checks: Vec<Check>,
    pub writes: Vec<Write>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, check: Check) -> &mut Self {
        if !self.checks.contains(&check) {
            self.checks.push(check);
        }
        self
    }

    pub fn write(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    /// Require `planet` unchanged since it was read.
    pub fn expect_planet(&mut self, planet: &Versioned<Planet>) -> &mut Self {
        self.check(Check::Planet {
            id: planet.row.id,
            version: planet.version,
        })
    }

    pub fn expect_player(&mut self, player: &Versioned<Player>) -> &mut Self {
        self.check(Check::Player {
            id: player.row.id,
            version: player.version,
        })
    }

    pub fn expect_mission(&mut self, mission: &Versioned<FleetMission>) -> &mut Self {
        self.check(Check::Mission {
            id: mission.row.id,
            version: mission.version,
        })
    }

    pub fn expect_queue_item(&mut self, item: &Versioned<QueueItem>) -> &mut Self {
        self.check(Check::QueueItem {
            id: item.row.id,
            version: item.version,
        })
    }

    /// Require the debris field at `slot` unchanged (or still absent).
    pub fn expect_debris(&mut self, slot: Coordinate, field: Option<&Versioned<DebrisField>>) -> &mut Self {
        self.check(Check::Debris {
            slot: slot.slot(),
            version: field.map(|f| f.version),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// A check failed; nothing was written.
    Conflict,
}

/// Read/write contract of the durable store.
pub trait Store: Send + Sync {
    fn allocate(&self, sequence: Sequence) -> Result<u64, StoreError>;

    fn player(&self, id: PlayerId) -> Result<Option<Versioned<Player>>, StoreError>;
    fn planet(&self, id: PlanetId) -> Result<Option<Versioned<Planet>>, StoreError>;
    fn planet_at(&self, coordinate: Coordinate) -> Result<Option<Versioned<Planet>>, StoreError>;
    fn planets_of(&self, owner: PlayerId) -> Result<Vec<Versioned<Planet>>, StoreError>;

    fn mission(&self, id: MissionId) -> Result<Option<Versioned<FleetMission>>, StoreError>;
    /// Unprocessed missions owned by `owner`, by arrival.
    fn active_missions_of(&self, owner: PlayerId) -> Result<Vec<Versioned<FleetMission>>, StoreError>;
    /// Unprocessed missions whose destination is exactly `coordinate`, by
    /// arrival.
    fn missions_to(&self, coordinate: Coordinate) -> Result<Vec<Versioned<FleetMission>>, StoreError>;

    fn queue_item(&self, id: QueueItemId) -> Result<Option<Versioned<QueueItem>>, StoreError>;
    /// Items of one queue ordered by completion.
    fn queue(&self, scope: QueueScope) -> Result<Vec<Versioned<QueueItem>>, StoreError>;

    fn debris(&self, slot: Coordinate) -> Result<Option<Versioned<DebrisField>>, StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// All rows of an [`InMemoryStore`]. Also the snapshot payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub players: BTreeMap<PlayerId, Versioned<Player>>,
    pub planets: BTreeMap<PlanetId, Versioned<Planet>>,
    pub missions: BTreeMap<MissionId, Versioned<FleetMission>>,
    pub queue: BTreeMap<QueueItemId, Versioned<QueueItem>>,
    pub debris: BTreeMap<Coordinate, Versioned<DebrisField>>,
    /// Last id handed out per sequence: player, planet, mission, queue item.
    pub sequences: [u64; 4],
}

impl Tables {
    fn check(&self, check: &Check) -> bool {
        match check {
            Check::Player { id, version } => self.players.get(id).map(|r| r.version) == Some(*version),
            Check::Planet { id, version } => self.planets.get(id).map(|r| r.version) == Some(*version),
            Check::Mission { id, version } => self.missions.get(id).map(|r| r.version) == Some(*version),
            Check::QueueItem { id, version } => self.queue.get(id).map(|r| r.version) == Some(*version),
            Check::Debris { slot, version } => self.debris.get(&slot.slot()).map(|r| r.version) == *version,
            Check::PositionVacant(c) => !self.planets.values().any(|p| p.row.coordinate == *c),
        }
    }

    /// Inserts that would collide with existing rows.
    fn insert_blocked(&self, write: &Write) -> bool {
        match write {
            Write::InsertPlayer(p) => self.players.contains_key(&p.id),
            Write::InsertPlanet(p) => {
                self.planets.contains_key(&p.id)
                    || self.planets.values().any(|o| o.row.coordinate == p.coordinate)
            }
            Write::InsertMission(m) => self.missions.contains_key(&m.id),
            Write::InsertQueueItem(q) => self.queue.contains_key(&q.id),
            _ => false,
        }
    }

    fn apply(&mut self, write: Write) {
        fn put<K: Ord, T>(map: &mut BTreeMap<K, Versioned<T>>, key: K, row: T) {
            let version = map.get(&key).map_or(1, |r| r.version + 1);
            map.insert(key, Versioned { version, row });
        }
        match write {
            Write::InsertPlayer(p) | Write::PutPlayer(p) => put(&mut self.players, p.id, p),
            Write::InsertPlanet(p) | Write::PutPlanet(p) => put(&mut self.planets, p.id, p),
            Write::InsertMission(m) | Write::PutMission(m) => put(&mut self.missions, m.id, m),
            Write::InsertQueueItem(q) | Write::PutQueueItem(q) => put(&mut self.queue, q.id, q),
            Write::DeleteQueueItem(id) => {
                self.queue.remove(&id);
            }
            Write::PutDebris(d) => put(&mut self.debris, d.slot.slot(), d),
            Write::DeleteDebris(slot) => {
                self.debris.remove(&slot.slot());
            }
        }
    }
}

/// Commit counters, for tests and benchmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub applied: u64,
    pub conflicts: u64,
}

/// A [`Store`] kept in process memory behind a read/write lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    applied: AtomicU64,
    conflicts: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
            ..Self::default()
        }
    }

    /// Copy of every row.
    pub fn tables(&self) -> Result<Tables, StoreError> {
        Ok(self.read()?.clone())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            applied: self.applied.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    /// All missions, processed or not.
    pub fn all_missions(&self) -> Result<Vec<Versioned<FleetMission>>, StoreError> {
        Ok(self.read()?.missions.values().cloned().collect())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

fn by_arrival(mut v: Vec<Versioned<FleetMission>>) -> Vec<Versioned<FleetMission>> {
    v.sort_by_key(|m| (m.row.time_arrival, m.row.id));
    v
}

impl Store for InMemoryStore {
    fn allocate(&self, sequence: Sequence) -> Result<u64, StoreError> {
        let mut t = self.write()?;
        let slot = match sequence {
            Sequence::Player => 0,
            Sequence::Planet => 1,
            Sequence::Mission => 2,
            Sequence::QueueItem => 3,
        };
        t.sequences[slot] += 1;
        Ok(t.sequences[slot])
    }

    fn player(&self, id: PlayerId) -> Result<Option<Versioned<Player>>, StoreError> {
        Ok(self.read()?.players.get(&id).cloned())
    }

    fn planet(&self, id: PlanetId) -> Result<Option<Versioned<Planet>>, StoreError> {
        Ok(self.read()?.planets.get(&id).cloned())
    }

    fn planet_at(&self, coordinate: Coordinate) -> Result<Option<Versioned<Planet>>, StoreError> {
        Ok(self
            .read()?
            .planets
            .values()
            .find(|p| p.row.coordinate == coordinate)
            .cloned())
    }

    fn planets_of(&self, owner: PlayerId) -> Result<Vec<Versioned<Planet>>, StoreError> {
        Ok(self
            .read()?
            .planets
            .values()
            .filter(|p| p.row.owner == owner)
            .cloned()
            .collect())
    }

    fn mission(&self, id: MissionId) -> Result<Option<Versioned<FleetMission>>, StoreError> {
        Ok(self.read()?.missions.get(&id).cloned())
    }

    fn active_missions_of(&self, owner: PlayerId) -> Result<Vec<Versioned<FleetMission>>, StoreError> {
        Ok(by_arrival(
            self.read()?
                .missions
                .values()
                .filter(|m| m.row.owner == owner && !m.row.processed)
                .cloned()
                .collect(),
        ))
    }

    fn missions_to(&self, coordinate: Coordinate) -> Result<Vec<Versioned<FleetMission>>, StoreError> {
        Ok(by_arrival(
            self.read()?
                .missions
                .values()
                .filter(|m| m.row.destination == coordinate && !m.row.processed)
                .cloned()
                .collect(),
        ))
    }

    fn queue_item(&self, id: QueueItemId) -> Result<Option<Versioned<QueueItem>>, StoreError> {
        Ok(self.read()?.queue.get(&id).cloned())
    }

    fn queue(&self, scope: QueueScope) -> Result<Vec<Versioned<QueueItem>>, StoreError> {
        let mut items: Vec<_> = self
            .read()?
            .queue
            .values()
            .filter(|q| q.row.scope() == scope)
            .cloned()
            .collect();
        items.sort_by_key(|q| (q.row.completion, q.row.id));
        Ok(items)
    }

    fn debris(&self, slot: Coordinate) -> Result<Option<Versioned<DebrisField>>, StoreError> {
        Ok(self.read()?.debris.get(&slot.slot()).cloned())
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, StoreError> {
        let mut t = self.write()?;
        let ok = changes.checks.iter().all(|c| t.check(c))
            && !changes.writes.iter().any(|w| t.insert_blocked(w));
        if !ok {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitOutcome::Conflict);
        }
        for write in changes.writes {
            t.apply(write);
        }
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(CommitOutcome::Applied)
    }
}
