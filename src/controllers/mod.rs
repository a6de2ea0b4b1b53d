//! Controller callsign classification.
//!
//! The category is derived from the last three characters of the callsign
//! (`SY_TWR` → Tower). Each category maps to the proximity radius used when
//! matching that controller against flights.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerCategory {
    Ground,
    Tower,
    Approach,
    Center,
    FlightService,
    Observer,
    Fallback,
}

impl ControllerCategory {
    pub const ALL: [ControllerCategory; 7] = [
        ControllerCategory::Ground,
        ControllerCategory::Tower,
        ControllerCategory::Approach,
        ControllerCategory::Center,
        ControllerCategory::FlightService,
        ControllerCategory::Observer,
        ControllerCategory::Fallback,
    ];

    pub fn from_callsign(callsign: &str) -> Self {
        let upper = callsign.trim().to_ascii_uppercase();
        let suffix = upper.get(upper.len().saturating_sub(3)..).unwrap_or("");

        match suffix {
            "GND" | "DEL" => ControllerCategory::Ground,
            "TWR" => ControllerCategory::Tower,
            "APP" | "DEP" => ControllerCategory::Approach,
            "CTR" => ControllerCategory::Center,
            "FSS" => ControllerCategory::FlightService,
            "OBS" => ControllerCategory::Observer,
            _ => ControllerCategory::Fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerCategory::Ground => "ground",
            ControllerCategory::Tower => "tower",
            ControllerCategory::Approach => "approach",
            ControllerCategory::Center => "center",
            ControllerCategory::FlightService => "flight_service",
            ControllerCategory::Observer => "observer",
            ControllerCategory::Fallback => "fallback",
        }
    }

    pub fn is_observer(&self) -> bool {
        *self == ControllerCategory::Observer
    }
}

impl fmt::Display for ControllerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category proximity radius in nautical miles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusTable {
    pub ground: f64,
    pub tower: f64,
    pub approach: f64,
    pub center: f64,
    pub flight_service: f64,
    pub observer: f64,
    pub fallback: f64,
}

impl Default for RadiusTable {
    fn default() -> Self {
        Self {
            ground: 15.0,
            tower: 15.0,
            approach: 60.0,
            center: 400.0,
            flight_service: 1000.0,
            // observers never control traffic
            observer: 0.0,
            fallback: 30.0,
        }
    }
}

impl RadiusTable {
    pub fn radius_nm(&self, category: ControllerCategory) -> f64 {
        match category {
            ControllerCategory::Ground => self.ground,
            ControllerCategory::Tower => self.tower,
            ControllerCategory::Approach => self.approach,
            ControllerCategory::Center => self.center,
            ControllerCategory::FlightService => self.flight_service,
            ControllerCategory::Observer => self.observer,
            ControllerCategory::Fallback => self.fallback,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for category in ControllerCategory::ALL {
            let r = self.radius_nm(category);
            if !r.is_finite() || r < 0.0 {
                return Err(format!("radius for {category} must be a non-negative number, got {r}"));
            }
        }
        Ok(())
    }
}

/// Category plus radius for a callsign, resolved against a radius table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerClass {
    pub category: ControllerCategory,
    pub radius_nm: f64,
}

pub fn classify(callsign: &str, radii: &RadiusTable) -> ControllerClass {
    let category = ControllerCategory::from_callsign(callsign);
    ControllerClass {
        category,
        radius_nm: radii.radius_nm(category),
    }
}
