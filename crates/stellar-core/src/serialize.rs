//! Snapshots of an in-memory store.
//!
//! Binary encoding via `bitcode` behind a versioned header, so a snapshot
//! from another format version is rejected before its payload is decoded.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::store::{InMemoryStore, Tables};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a store snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x57E1_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] crate::error::StoreError),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Instant the snapshot was taken at.
    pub taken_at: Timestamp,
}

impl SnapshotHeader {
    pub fn new(taken_at: Timestamp) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            taken_at,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// The header is encoded separately so it can be checked before the
/// payload is touched.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    header: Vec<u8>,
    payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Save / restore
// ---------------------------------------------------------------------------

/// Encode every row of `tables`.
pub fn encode(tables: &Tables, taken_at: Timestamp) -> Result<Vec<u8>, SnapshotError> {
    let header = bitcode::serialize(&SnapshotHeader::new(taken_at))
        .map_err(|e| SnapshotError::Encode(e.to_string()))?;
    let payload = bitcode::serialize(tables).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    bitcode::serialize(&Envelope { header, payload }).map_err(|e| SnapshotError::Encode(e.to_string()))
}

/// Read just the header of a snapshot.
pub fn read_header(data: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    let envelope: Envelope = bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    bitcode::deserialize(&envelope.header).map_err(|e| SnapshotError::Decode(e.to_string()))
}

/// Decode a snapshot, validating its header first.
pub fn decode(data: &[u8]) -> Result<(SnapshotHeader, Tables), SnapshotError> {
    let envelope: Envelope = bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    let header: SnapshotHeader =
        bitcode::deserialize(&envelope.header).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    header.validate()?;
    let tables = bitcode::deserialize(&envelope.payload).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok((header, tables))
}

/// Snapshot a live store.
pub fn save(store: &InMemoryStore, taken_at: Timestamp) -> Result<Vec<u8>, SnapshotError> {
    let tables = store.tables()?;
    let bytes = encode(&tables, taken_at)?;
    tracing::debug!(
        players = tables.players.len(),
        planets = tables.planets.len(),
        missions = tables.missions.len(),
        bytes = bytes.len(),
        "store snapshot taken"
    );
    Ok(bytes)
}

/// Rebuild a store from a snapshot.
pub fn restore(data: &[u8]) -> Result<InMemoryStore, SnapshotError> {
    let (header, tables) = decode(data)?;
    tracing::debug!(taken_at = %header.taken_at, "store snapshot restored");
    Ok(InMemoryStore::from_tables(tables))
}
