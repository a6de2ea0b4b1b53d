pub mod state;
pub mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

pub use state::{FlightSectorState, OpenSector, SectorStateStore};
pub use tracker::{OccupancyTracker, TrackerBatch};

/// One position report for a flight, as fed to the occupancy tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub callsign: String,
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub altitude_ft: Option<i64>,
    pub groundspeed_kt: Option<f64>,
}
