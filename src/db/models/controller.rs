//! Controller session data models.
//!
//! `ControllerSession` is the raw online period of one controller login as
//! written by ingestion. `ControllerIdentity` is the inbound record used to
//! create or refresh it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSession {
    pub id: i64,
    pub callsign: String,
    pub cid: i64,
    pub name: Option<String>,
    pub facility_rating: i64,
    pub logon_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_finalized: bool,
}

impl ControllerSession {
    pub fn online_for(&self) -> Duration {
        self.last_seen - self.logon_time
    }

    pub fn is_completion_eligible(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_seen > threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerIdentity {
    pub callsign: String,
    pub cid: i64,
    pub name: Option<String>,
    pub facility_rating: i64,
    pub logon_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
