//! Fleet mission records.
//!
//! An outward mission and its return trip are two rows. The return points
//! back at the outward mission through `parent`; nothing points forward.

use serde::{Deserialize, Serialize};

use crate::clock::{Timestamp, after, seconds_between};
use crate::coords::Coordinate;
use crate::fixed::Seconds;
use crate::id::{MissionId, PlanetId, PlayerId};
use crate::resources::Resources;
use crate::units::UnitCollection;

/// What a fleet does when it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionType {
    Transport,
    Deployment,
    Attack,
    Espionage,
    Colonization,
    Expedition,
    Harvest,
}

impl MissionType {
    /// Stable lowercase name, used in message templates.
    pub fn key(&self) -> &'static str {
        match self {
            MissionType::Transport => "transport",
            MissionType::Deployment => "deployment",
            MissionType::Attack => "attack",
            MissionType::Espionage => "espionage",
            MissionType::Colonization => "colonization",
            MissionType::Expedition => "expedition",
            MissionType::Harvest => "harvest",
        }
    }

    /// Missions that end in a fight with the destination owner.
    pub fn is_hostile(&self) -> bool {
        matches!(self, MissionType::Attack | MissionType::Espionage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetMission {
    pub id: MissionId,
    pub owner: PlayerId,
    pub mission_type: MissionType,
    pub origin: Coordinate,
    pub origin_planet: Option<PlanetId>,
    pub destination: Coordinate,
    /// Planet at the destination when known. Always set on return trips.
    pub destination_planet: Option<PlanetId>,
    /// Owner of the destination planet at dispatch.
    pub target_owner: Option<PlayerId>,
    pub units: UnitCollection,
    pub cargo: Resources,
    pub speed_percent: u32,
    pub fuel_cost: u64,
    pub time_departure: Timestamp,
    pub time_arrival: Timestamp,
    pub processed: bool,
    /// Outward mission this trip returns from.
    pub parent: Option<MissionId>,
    /// Set on an outward mission that was turned around before arriving.
    pub recalled: bool,
}

impl FleetMission {
    pub fn is_return(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.processed && self.time_arrival <= now
    }

    /// Total flight time from the stored timestamps.
    pub fn duration(&self) -> Seconds {
        seconds_between(self.time_departure, self.time_arrival)
    }

    /// Return trip leaving the destination at `departure` with the same
    /// flight time, carrying `units` and `cargo` home.
    pub fn return_trip(
        &self,
        id: MissionId,
        departure: Timestamp,
        flight: Seconds,
        units: UnitCollection,
        cargo: Resources,
    ) -> FleetMission {
        FleetMission {
            id,
            owner: self.owner,
            mission_type: self.mission_type,
            origin: self.destination,
            origin_planet: self.destination_planet,
            destination: self.origin,
            destination_planet: self.origin_planet,
            target_owner: Some(self.owner),
            units,
            cargo,
            speed_percent: self.speed_percent,
            fuel_cost: 0,
            time_departure: departure,
            time_arrival: after(departure, flight),
            processed: false,
            parent: Some(self.id),
            recalled: false,
        }
    }
}
