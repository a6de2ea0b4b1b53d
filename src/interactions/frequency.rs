//! Frequency labels and the tolerance-based historical frequency report.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::TransceiverSample;

pub const DEFAULT_TOLERANCE_HZ: i64 = 100;

/// MHz display label: rounded to the nearest kHz, trailing zeros trimmed,
/// at least one decimal kept (`118500001 -> "118.5"`, `121000000 -> "121.0"`).
pub fn mhz_label(frequency_hz: i64) -> String {
    let khz = (frequency_hz as f64 / 1_000.0).round() as i64;
    let whole = khz / 1_000;
    let fraction = (khz % 1_000).abs();

    let mut text = format!("{whole}.{fraction:03}");
    while text.ends_with('0') && !text.ends_with(".0") {
        text.pop();
    }
    text
}

/// Lower-confidence contact found by frequency alone (no distance check).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyContact {
    pub flight_callsign: String,
    pub controller_callsign: String,
    pub frequency_label: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub samples: u32,
}

/// Groups flight samples that share a frequency (within `tolerance_hz`) with
/// a controller sample within `time_window`, by (flight, controller, label).
/// Each flight sample counts at most once per controller.
pub fn frequency_report(
    flight_samples: &[TransceiverSample],
    controller_samples: &[TransceiverSample],
    tolerance_hz: i64,
    time_window: Duration,
) -> Vec<FrequencyContact> {
    let mut grouped: BTreeMap<(String, String, String), FrequencyContact> = BTreeMap::new();

    for flight in flight_samples {
        let mut seen_controllers: Vec<&str> = Vec::new();
        for controller in controller_samples {
            if seen_controllers.contains(&controller.callsign.as_str()) {
                continue;
            }
            if (flight.frequency_hz - controller.frequency_hz).abs() > tolerance_hz {
                continue;
            }
            let gap = (flight.timestamp - controller.timestamp).num_seconds().abs();
            if gap > time_window.num_seconds() {
                continue;
            }
            seen_controllers.push(&controller.callsign);

            let label = mhz_label(flight.frequency_hz);
            let key = (flight.callsign.clone(), controller.callsign.clone(), label.clone());
            grouped
                .entry(key)
                .and_modify(|contact| {
                    contact.first_seen = contact.first_seen.min(flight.timestamp);
                    contact.last_seen = contact.last_seen.max(flight.timestamp);
                    contact.samples += 1;
                })
                .or_insert_with(|| FrequencyContact {
                    flight_callsign: flight.callsign.clone(),
                    controller_callsign: controller.callsign.clone(),
                    frequency_label: label,
                    first_seen: flight.timestamp,
                    last_seen: flight.timestamp,
                    samples: 1,
                });
        }
    }

    grouped.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SampleKind;
    use crate::geo::Position;
    use crate::interactions::{match_samples, MatchConfig};
    use chrono::TimeZone;

    fn t(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap()
    }

    #[test]
    fn labels() {
        assert_eq!(mhz_label(118_500_000), "118.5");
        assert_eq!(mhz_label(118_500_001), "118.5");
        assert_eq!(mhz_label(124_425_000), "124.425");
        assert_eq!(mhz_label(121_000_000), "121.0");
        assert_eq!(mhz_label(132_849_600), "132.85");
    }

    #[test]
    fn near_frequencies_share_label_but_not_a_match() {
        let pos = Some(Position::new(-33.9, 151.2));
        let flights =
            vec![TransceiverSample::new("QFA1", SampleKind::Flight, 118_500_000, t(0), pos)];
        let controllers =
            vec![TransceiverSample::new("SY_TWR", SampleKind::Controller, 118_500_001, t(0), pos)];

        assert!(match_samples(&flights, &controllers, &MatchConfig::default()).is_empty());

        let window = Duration::seconds(180);
        let report = frequency_report(&flights, &controllers, DEFAULT_TOLERANCE_HZ, window);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].frequency_label, "118.5");
        assert_eq!(report[0].controller_callsign, "SY_TWR");
    }

    #[test]
    fn report_ignores_distance_and_groups_samples() {
        let far = Some(Position::new(51.5, -0.1));
        let flights = vec![
            TransceiverSample::new("QFA1", SampleKind::Flight, 124_400_000, t(0), None),
            TransceiverSample::new("QFA1", SampleKind::Flight, 124_400_000, t(1), None),
            TransceiverSample::new("QFA1", SampleKind::Flight, 124_400_000, t(30), None),
        ];
        let controllers = vec![
            TransceiverSample::new("ML_CTR", SampleKind::Controller, 124_400_050, t(0), far),
            TransceiverSample::new("ML_CTR", SampleKind::Controller, 124_400_050, t(1), far),
        ];

        let window = Duration::seconds(180);
        let report = frequency_report(&flights, &controllers, DEFAULT_TOLERANCE_HZ, window);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].samples, 2);
        assert_eq!(report[0].first_seen, t(0));
        assert_eq!(report[0].last_seen, t(1));
    }
}
