//! Percentage of a flight's time spent in contact with ATC.
//!
//! Time is counted in whole UTC minutes: a minute counts as "in contact" if
//! at least one match falls inside it. The airborne figures use sector
//! occupancy as the denominator, so ground time does not dilute them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::db::models::{ControllerContact, FlightContactSummary, FlightRecord, SectorOccupancy};
use crate::interactions::{mhz_label, InteractionMatch};

fn minute_bucket(at: &DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

fn ceil_minutes(seconds: i64) -> u32 {
    if seconds <= 0 {
        return 0;
    }
    u32::try_from((seconds + 59) / 60).unwrap_or(u32::MAX)
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (f64::from(part) / f64::from(whole) * 100.0).clamp(0.0, 100.0)
}

pub fn summarize_flight(
    flight: &FlightRecord,
    matches: &[InteractionMatch],
    occupancies: &[SectorOccupancy],
    end_time: DateTime<Utc>,
) -> FlightContactSummary {
    let logon = flight.logon_time;
    let in_span: Vec<&InteractionMatch> = matches
        .iter()
        .filter(|m| m.timestamp >= logon && m.timestamp <= end_time)
        .collect();

    let contact_buckets: BTreeSet<i64> =
        in_span.iter().map(|m| minute_bucket(&m.timestamp)).collect();

    let total_minutes = ceil_minutes((end_time - logon).num_seconds());
    let contact_minutes = contact_buckets.len() as u32;

    let intervals: Vec<(i64, i64)> = occupancies
        .iter()
        .map(|occupancy| {
            let (start, end) = occupancy.interval(end_time);
            (start.timestamp(), end.timestamp())
        })
        .collect();

    let airborne_seconds: i64 = occupancies
        .iter()
        .map(|occupancy| match occupancy.duration_seconds {
            Some(seconds) if !occupancy.is_open() => seconds.max(0),
            _ => occupancy.duration_until(end_time).num_seconds().max(0),
        })
        .sum();
    let airborne_minutes = ceil_minutes(airborne_seconds);

    // a bucket is airborne if any part of that minute overlaps an occupancy
    let airborne_contact_minutes = contact_buckets
        .iter()
        .filter(|bucket| {
            let minute_start = **bucket * 60;
            let minute_end = minute_start + 59;
            intervals
                .iter()
                .any(|(start, end)| minute_start <= *end && minute_end >= *start)
        })
        .count() as u32;

    let mut per_controller: BTreeMap<&str, Vec<&InteractionMatch>> = BTreeMap::new();
    for m in &in_span {
        per_controller.entry(m.controller_callsign.as_str()).or_default().push(m);
    }

    let mut controllers: Vec<ControllerContact> = per_controller
        .into_iter()
        .filter_map(|(callsign, hits)| {
            let first_contact = hits.iter().map(|m| m.timestamp).min()?;
            let last_contact = hits.iter().map(|m| m.timestamp).max()?;
            let minutes: BTreeSet<i64> = hits.iter().map(|m| minute_bucket(&m.timestamp)).collect();
            let frequencies: BTreeSet<String> =
                hits.iter().map(|m| mhz_label(m.frequency_hz)).collect();
            Some(ControllerContact {
                callsign: callsign.to_string(),
                first_contact,
                last_contact,
                minutes: minutes.len() as u32,
                frequencies: frequencies.into_iter().collect(),
            })
        })
        .collect();
    controllers.sort_by(|a, b| {
        a.first_contact
            .cmp(&b.first_contact)
            .then_with(|| a.callsign.cmp(&b.callsign))
    });

    FlightContactSummary {
        callsign: flight.callsign.clone(),
        departure: flight.departure.clone(),
        arrival: flight.arrival.clone(),
        logon_time: logon,
        end_time,
        total_minutes,
        contact_minutes,
        airborne_minutes,
        airborne_contact_minutes,
        controller_time_percentage: percentage(contact_minutes, total_minutes),
        airborne_controller_time_percentage: percentage(airborne_contact_minutes, airborne_minutes),
        controllers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::FlightStatus;
    use crate::geo::Position;
    use chrono::{Duration, TimeZone};

    fn t(m: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(m)
    }

    fn flight() -> FlightRecord {
        FlightRecord {
            callsign: "QFA1".into(),
            cid: 1,
            departure: Some("YSSY".into()),
            arrival: Some("YMML".into()),
            logon_time: t(0),
            last_seen: t(100),
            status: FlightStatus::Completed,
            completed_at: Some(t(100)),
        }
    }

    fn hit(controller: &str, m: i64, secs: i64) -> InteractionMatch {
        InteractionMatch {
            flight_callsign: "QFA1".into(),
            controller_callsign: controller.into(),
            frequency_hz: 124_400_000,
            timestamp: t(m) + Duration::seconds(secs),
            distance_nm: 10.0,
            confidence: 1.0,
        }
    }

    fn occupancy(from: i64, to: Option<i64>) -> SectorOccupancy {
        SectorOccupancy {
            id: None,
            callsign: "QFA1".into(),
            sector_name: "WOL".into(),
            entry_time: t(from),
            exit_time: to.map(t),
            entry_pos: Position::new(-34.0, 151.0),
            exit_pos: None,
            entry_altitude: None,
            exit_altitude: None,
            duration_seconds: to.map(|to| (to - from) * 60),
        }
    }

    #[test]
    fn minutes_are_distinct_buckets() {
        let matches = vec![
            hit("SY_APP", 10, 0),
            hit("SY_APP", 10, 30),
            hit("SY_APP", 11, 0),
            hit("ML_CTR", 11, 10),
            hit("ML_CTR", 50, 0),
        ];
        let summary = summarize_flight(&flight(), &matches, &[occupancy(5, Some(45))], t(100));

        assert_eq!(summary.total_minutes, 100);
        assert_eq!(summary.contact_minutes, 3);
        assert!((summary.controller_time_percentage - 3.0).abs() < 1e-9);
        assert_eq!(summary.airborne_minutes, 40);
        assert_eq!(summary.airborne_contact_minutes, 2);
        assert!((summary.airborne_controller_time_percentage - 5.0).abs() < 1e-9);

        assert_eq!(summary.controllers.len(), 2);
        assert_eq!(summary.controllers[0].callsign, "SY_APP");
        assert_eq!(summary.controllers[0].minutes, 2);
        assert_eq!(summary.controllers[1].callsign, "ML_CTR");
        assert_eq!(summary.controllers[1].minutes, 2);
        assert_eq!(summary.controllers[1].frequencies, vec!["124.4".to_string()]);
    }

    #[test]
    fn open_occupancy_counts_up_to_end_time() {
        let summary = summarize_flight(
            &flight(),
            &[hit("SY_APP", 90, 0)],
            &[occupancy(80, None)],
            t(100),
        );
        assert_eq!(summary.airborne_minutes, 20);
        assert_eq!(summary.airborne_contact_minutes, 1);
    }

    #[test]
    fn zero_denominators_give_zero_percent() {
        let mut record = flight();
        record.completed_at = Some(t(0));
        let summary = summarize_flight(&record, &[], &[], t(0));
        assert_eq!(summary.total_minutes, 0);
        assert_eq!(summary.controller_time_percentage, 0.0);
        assert_eq!(summary.airborne_controller_time_percentage, 0.0);
    }

    #[test]
    fn percentages_are_clamped() {
        // contact in every minute of a one-minute sector visit
        let matches: Vec<_> = (0..10).map(|m| hit("SY_TWR", m, 0)).collect();
        let summary = summarize_flight(&flight(), &matches, &[occupancy(2, Some(3))], t(100));
        assert!(summary.airborne_controller_time_percentage <= 100.0);
    }
}
