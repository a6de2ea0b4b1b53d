//! In-memory per-flight sector state.
//!
//! The store is the only place sector hysteresis lives between samples. It
//! is written by ingestion and cleared by the completion signal; the flight
//! sweep never touches it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::geo::Position;

/// The occupancy currently open for a flight.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSector {
    pub name: String,
    pub entry_time: DateTime<Utc>,
    pub entry_pos: Position,
    pub entry_altitude: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightSectorState {
    pub current: Option<OpenSector>,
    /// Consecutive samples below the exit speed.
    pub exit_counter: u32,
    pub last_speed: Option<f64>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl FlightSectorState {
    pub fn current_sector(&self) -> Option<&str> {
        self.current.as_ref().map(|open| open.name.as_str())
    }
}

#[derive(Debug, Default)]
pub struct SectorStateStore {
    flights: Mutex<HashMap<String, FlightSectorState>>,
}

impl SectorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the whole map for one ingestion batch.
    pub async fn lock(&self) -> MutexGuard<'_, HashMap<String, FlightSectorState>> {
        self.flights.lock().await
    }

    pub async fn get(&self, callsign: &str) -> Option<FlightSectorState> {
        self.flights.lock().await.get(callsign).cloned()
    }

    pub async fn remove(&self, callsign: &str) -> Option<FlightSectorState> {
        self.flights.lock().await.remove(callsign)
    }
}
