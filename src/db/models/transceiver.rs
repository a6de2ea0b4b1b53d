//! Transceiver sample data model.
//!
//! One timestamped radio frequency + position observation for a flight or a
//! controller, as delivered by the upstream collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Flight,
    Controller,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Flight => "Flight",
            SampleKind::Controller => "Controller",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransceiverSample {
    pub callsign: String,
    pub frequency_hz: i64,
    pub timestamp: DateTime<Utc>,
    pub position: Option<Position>,
    pub kind: SampleKind,
}

impl TransceiverSample {
    pub fn new(
        callsign: impl Into<String>,
        kind: SampleKind,
        frequency_hz: i64,
        timestamp: DateTime<Utc>,
        position: Option<Position>,
    ) -> Self {
        Self {
            callsign: callsign.into(),
            frequency_hz,
            timestamp,
            position,
            kind,
        }
    }
}
