//! Durable summaries produced by the engine.
//!
//! - `ControllerSummary`: one merged controller session, terminal once written.
//! - `FlightContactSummary`: the percentage-of-time-under-contact figures for
//!   one completed flight.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-flight detail inside a controller summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AircraftDetail {
    pub callsign: String,
    pub first_contact: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub contact_count: u32,
    pub frequency_mhz: String,
    pub min_distance_nm: f64,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSummary {
    pub id: String,
    pub callsign: String,
    pub cid: i64,
    pub name: Option<String>,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub total_aircraft: u32,
    pub peak_aircraft: u32,
    /// Hour bucket (`YYYY-MM-DDTHH:00Z`) → distinct flights contacted.
    pub hourly_breakdown: BTreeMap<String, u32>,
    pub frequencies_used: Vec<String>,
    pub aircraft_details: Vec<AircraftDetail>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerContact {
    pub callsign: String,
    pub first_contact: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub minutes: u32,
    pub frequencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightContactSummary {
    pub callsign: String,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_minutes: u32,
    pub contact_minutes: u32,
    pub airborne_minutes: u32,
    pub airborne_contact_minutes: u32,
    pub controller_time_percentage: f64,
    pub airborne_controller_time_percentage: f64,
    pub controllers: Vec<ControllerContact>,
}
