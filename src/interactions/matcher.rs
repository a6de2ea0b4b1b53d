//! Frequency/time/distance matching between two transceiver sample streams.
//!
//! Two samples match when they are on exactly the same frequency, within
//! `time_window` of each other and within `distance_threshold_nm` great-circle
//! distance. For every sample of side `a` at most one match per counterpart
//! callsign is produced: the counterpart sample closest in time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{SampleKind, TransceiverSample};
use crate::geo::haversine_nm;
use crate::interactions::{config::MatchConfig, scoring::distance_confidence};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMatch {
    pub flight_callsign: String,
    pub controller_callsign: String,
    pub frequency_hz: i64,
    /// Timestamp of the side-`a` sample.
    pub timestamp: DateTime<Utc>,
    pub distance_nm: f64,
    pub confidence: f64,
}

struct Candidate<'a> {
    sample: &'a TransceiverSample,
    gap_secs: i64,
    distance_nm: f64,
    confidence: f64,
}

/// Side-`b` samples bucketed by exact frequency, each bucket sorted by time.
fn index_by_frequency(samples: &[TransceiverSample]) -> HashMap<i64, Vec<&TransceiverSample>> {
    let mut index: HashMap<i64, Vec<&TransceiverSample>> = HashMap::new();
    for sample in samples {
        index.entry(sample.frequency_hz).or_default().push(sample);
    }
    for bucket in index.values_mut() {
        bucket.sort_by_key(|s| s.timestamp);
    }
    index
}

pub fn match_samples(
    a: &[TransceiverSample],
    b: &[TransceiverSample],
    config: &MatchConfig,
) -> Vec<InteractionMatch> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let index = index_by_frequency(b);
    let mut matches = Vec::new();

    for sample in a {
        // missing position on either side scores 0 and is dropped
        let Some(own_pos) = sample.position else {
            continue;
        };
        let Some(bucket) = index.get(&sample.frequency_hz) else {
            continue;
        };

        let earliest = sample.timestamp - config.time_window;
        let latest = sample.timestamp + config.time_window;
        let lo = bucket.partition_point(|s| s.timestamp < earliest);
        let hi = bucket.partition_point(|s| s.timestamp <= latest);

        let mut best: HashMap<&str, Candidate> = HashMap::new();
        for other in &bucket[lo..hi] {
            if other.callsign == sample.callsign {
                continue;
            }
            let Some(other_pos) = other.position else {
                continue;
            };

            let distance_nm = haversine_nm(&own_pos, &other_pos);
            if distance_nm > config.distance_threshold_nm {
                continue;
            }
            let confidence = distance_confidence(distance_nm, config);
            if confidence <= 0.0 {
                continue;
            }

            let candidate = Candidate {
                sample: other,
                gap_secs: (other.timestamp - sample.timestamp).num_seconds().abs(),
                distance_nm,
                confidence,
            };
            let closer = match best.get(other.callsign.as_str()) {
                Some(current) => {
                    candidate.gap_secs < current.gap_secs
                        || (candidate.gap_secs == current.gap_secs
                            && candidate.distance_nm < current.distance_nm)
                }
                None => true,
            };
            if closer {
                best.insert(other.callsign.as_str(), candidate);
            }
        }

        let mut picked: Vec<Candidate> = best.into_values().collect();
        picked.sort_by(|x, y| x.sample.callsign.cmp(&y.sample.callsign));

        for candidate in picked {
            let (flight, controller) = match sample.kind {
                SampleKind::Flight => (&sample.callsign, &candidate.sample.callsign),
                SampleKind::Controller => (&candidate.sample.callsign, &sample.callsign),
            };
            matches.push(InteractionMatch {
                flight_callsign: flight.clone(),
                controller_callsign: controller.clone(),
                frequency_hz: sample.frequency_hz,
                timestamp: sample.timestamp,
                distance_nm: candidate.distance_nm,
                confidence: candidate.confidence,
            });
        }
    }

    matches.sort_by(|x, y| x.timestamp.cmp(&y.timestamp));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use chrono::TimeZone;

    fn t(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, s).unwrap()
    }

    fn flight(
        callsign: &str,
        freq: i64,
        at: DateTime<Utc>,
        pos: Option<Position>,
    ) -> TransceiverSample {
        TransceiverSample::new(callsign, SampleKind::Flight, freq, at, pos)
    }

    fn controller(
        callsign: &str,
        freq: i64,
        at: DateTime<Utc>,
        pos: Option<Position>,
    ) -> TransceiverSample {
        TransceiverSample::new(callsign, SampleKind::Controller, freq, at, pos)
    }

    fn sydney() -> Option<Position> {
        Some(Position::new(-33.95, 151.18))
    }

    #[test]
    fn exact_frequency_required() {
        let a = vec![flight("QFA1", 118_500_000, t(0, 0), sydney())];
        let b = vec![controller("SY_TWR", 118_500_001, t(0, 0), sydney())];
        assert!(match_samples(&a, &b, &MatchConfig::default()).is_empty());
    }

    #[test]
    fn time_window_is_inclusive() {
        let config = MatchConfig::default();
        let a = vec![flight("QFA1", 118_500_000, t(5, 0), sydney())];
        let edge = vec![controller("SY_TWR", 118_500_000, t(8, 0), sydney())];
        let beyond = vec![controller("SY_TWR", 118_500_000, t(8, 1), sydney())];
        assert_eq!(match_samples(&a, &edge, &config).len(), 1);
        assert!(match_samples(&a, &beyond, &config).is_empty());
    }

    #[test]
    fn distance_uses_great_circle() {
        // ~60 nm apart along the equator
        let a = vec![flight("QFA1", 124_000_000, t(0, 0), Some(Position::new(0.0, 0.0)))];
        let b = vec![controller("XX_APP", 124_000_000, t(0, 0), Some(Position::new(0.0, 1.0)))];
        let within = MatchConfig::default().with_threshold(61.0);
        let outside = MatchConfig::default().with_threshold(59.0);

        let found = match_samples(&a, &b, &within);
        assert_eq!(found.len(), 1);
        assert!((found[0].distance_nm - 60.04).abs() < 0.5);
        assert!(match_samples(&a, &b, &outside).is_empty());
    }

    #[test]
    fn missing_position_is_discarded() {
        let a = vec![flight("QFA1", 118_500_000, t(0, 0), None)];
        let b = vec![controller("SY_TWR", 118_500_000, t(0, 0), sydney())];
        assert!(match_samples(&a, &b, &MatchConfig::default()).is_empty());
        assert!(match_samples(&b, &a, &MatchConfig::default()).is_empty());
    }

    #[test]
    fn one_match_per_counterpart_nearest_in_time() {
        let a = vec![controller("SY_APP", 124_400_000, t(10, 0), sydney())];
        let b = vec![
            flight("QFA1", 124_400_000, t(8, 0), sydney()),
            flight("QFA1", 124_400_000, t(10, 30), sydney()),
            flight("QFA1", 124_400_000, t(12, 0), sydney()),
            flight("VOZ2", 124_400_000, t(11, 0), sydney()),
        ];
        let found = match_samples(&a, &b, &MatchConfig::default().with_threshold(60.0));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].flight_callsign, "QFA1");
        assert_eq!(found[0].controller_callsign, "SY_APP");
        assert_eq!(found[0].timestamp, t(10, 0));
        assert_eq!(found[1].flight_callsign, "VOZ2");
    }

    #[test]
    fn sides_are_labelled_by_sample_kind() {
        let a = vec![flight("QFA1", 118_500_000, t(0, 0), sydney())];
        let b = vec![controller("SY_TWR", 118_500_000, t(0, 30), sydney())];
        let found = match_samples(&a, &b, &MatchConfig::default().with_threshold(15.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].flight_callsign, "QFA1");
        assert_eq!(found[0].controller_callsign, "SY_TWR");
        assert_eq!(found[0].confidence, 1.0);
        assert_eq!(found[0].timestamp, t(0, 0));
    }
}
