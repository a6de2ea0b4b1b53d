//! Sector occupancy data model.
//!
//! A time-bounded record of a flight being inside one named sector. An open
//! occupancy has no exit yet; a flight has at most one open occupancy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectorOccupancy {
    pub id: Option<i64>,
    pub callsign: String,
    pub sector_name: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub entry_pos: Position,
    pub exit_pos: Option<Position>,
    pub entry_altitude: Option<i64>,
    pub exit_altitude: Option<i64>,
    pub duration_seconds: Option<i64>,
}

impl SectorOccupancy {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Interval covered by the occupancy; open rows are cut at `until`.
    pub fn interval(&self, until: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.exit_time.unwrap_or(until).max(self.entry_time);
        (self.entry_time, end)
    }

    pub fn duration_until(&self, until: DateTime<Utc>) -> Duration {
        let (start, end) = self.interval(until);
        end - start
    }
}
