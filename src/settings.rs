use std::{fs, path::Path, path::PathBuf, time::Duration as StdDuration};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::controllers::RadiusTable;
use crate::errors::{EngineError, Result};

const MAX_TIME_WINDOW_SECS: u64 = 24 * 60 * 60;
const MAX_SPAN_MINS: i64 = 7 * 24 * 60;
const MAX_RETENTION_HOURS: i64 = 366 * 24;

/// Engine configuration, read once at startup from a JSON file. Every field
/// is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub sector_catalog_path: PathBuf,

    /// Max |t_flight - t_controller| for two transceiver samples to match.
    pub time_window_secs: u64,
    /// Search radius used when looking for controllers from a flight.
    pub flight_distance_nm: f64,
    pub radii: RadiusTable,

    /// Fraction of the distance threshold inside which confidence stays at 1.0.
    pub inner_radius_ratio: f64,
    /// Confidence at exactly the distance threshold.
    pub min_confidence: f64,
    /// Added to matches with controllers at the flight's departure or arrival.
    pub airport_affinity_bonus: f64,

    pub completion_threshold_mins: i64,
    pub reconnection_threshold_mins: i64,
    pub controller_sweep_interval_mins: u64,
    pub flight_sweep_interval_mins: u64,
    pub detection_timeout_secs: u64,
    /// Widening applied to the counterpart side of a detection query.
    pub query_buffer_mins: i64,
    pub transceiver_retention_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("atc_contact.sqlite3"),
            sector_catalog_path: PathBuf::from("sectors.json"),
            time_window_secs: 180,
            flight_distance_nm: 300.0,
            radii: RadiusTable::default(),
            inner_radius_ratio: 0.25,
            min_confidence: 0.3,
            airport_affinity_bonus: 0.1,
            completion_threshold_mins: 30,
            reconnection_threshold_mins: 5,
            controller_sweep_interval_mins: 60,
            flight_sweep_interval_mins: 60,
            detection_timeout_secs: 30,
            query_buffer_mins: 120,
            transceiver_retention_hours: 48,
        }
    }
}

impl EngineConfig {
    /// Load from `path`. A missing file yields the defaults; an unreadable
    /// or invalid file is an error, the engine must not start on a guess.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str::<EngineConfig>(&contents)?
        } else {
            log::warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            EngineConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.radii.validate().map_err(EngineError::Config)?;

        if self.time_window_secs == 0 || self.time_window_secs > MAX_TIME_WINDOW_SECS {
            return Err(EngineError::Config(format!(
                "time_window_secs must be within 1..={MAX_TIME_WINDOW_SECS}"
            )));
        }
        if self.detection_timeout_secs == 0 {
            return Err(EngineError::Config("detection_timeout_secs must be > 0".into()));
        }
        if !(self.flight_distance_nm.is_finite() && self.flight_distance_nm > 0.0) {
            return Err(EngineError::Config("flight_distance_nm must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.inner_radius_ratio) {
            return Err(EngineError::Config("inner_radius_ratio must be within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::Config("min_confidence must be within [0, 1]".into()));
        }
        if self.completion_threshold_mins <= 0 || self.reconnection_threshold_mins < 0 {
            return Err(EngineError::Config(
                "completion threshold must be > 0 and reconnection threshold >= 0".into(),
            ));
        }
        let spans = [
            ("completion_threshold_mins", self.completion_threshold_mins),
            ("reconnection_threshold_mins", self.reconnection_threshold_mins),
            ("query_buffer_mins", self.query_buffer_mins),
        ];
        for (name, mins) in spans {
            if !(0..=MAX_SPAN_MINS).contains(&mins) {
                return Err(EngineError::Config(format!(
                    "{name} must be within 0..={MAX_SPAN_MINS}"
                )));
            }
        }
        let intervals = [
            self.controller_sweep_interval_mins,
            self.flight_sweep_interval_mins,
        ];
        if intervals.iter().any(|mins| *mins == 0 || *mins > MAX_SPAN_MINS as u64) {
            return Err(EngineError::Config(format!(
                "sweep intervals must be within 1..={MAX_SPAN_MINS} minutes"
            )));
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&self.transceiver_retention_hours) {
            return Err(EngineError::Config(format!(
                "transceiver_retention_hours must be within 1..={MAX_RETENTION_HOURS}"
            )));
        }
        Ok(())
    }

    pub fn time_window(&self) -> Duration {
        Duration::seconds(self.time_window_secs as i64)
    }

    pub fn completion_threshold(&self) -> Duration {
        Duration::minutes(self.completion_threshold_mins)
    }

    pub fn reconnection_threshold(&self) -> Duration {
        Duration::minutes(self.reconnection_threshold_mins)
    }

    pub fn query_buffer(&self) -> Duration {
        Duration::minutes(self.query_buffer_mins)
    }

    pub fn transceiver_retention(&self) -> Duration {
        Duration::hours(self.transceiver_retention_hours)
    }

    pub fn detection_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.detection_timeout_secs)
    }

    pub fn controller_sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.controller_sweep_interval_mins * 60)
    }

    pub fn flight_sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.flight_sweep_interval_mins * 60)
    }
}
