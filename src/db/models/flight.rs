use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlightStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    pub callsign: String,
    pub cid: i64,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: FlightStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlightRecord {
    /// End of the flight's active span: completion time if known, else the
    /// last time it was seen.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.last_seen)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightIdentity {
    pub callsign: String,
    pub cid: i64,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
