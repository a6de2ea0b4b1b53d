use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::models::{AircraftDetail, ControllerSummary};
use crate::interactions::{mhz_label, InteractionMatch};
use crate::sessions::merge::MergedSession;

/// `YYYY-MM-DDTHH:00Z` bucket key for the hourly breakdown.
pub fn hour_key(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:00Z").to_string()
}

/// Most distinct flights seen together within any rolling 60 s window.
fn peak_in_rolling_minute(matches: &[InteractionMatch]) -> usize {
    let mut ordered: Vec<&InteractionMatch> = matches.iter().collect();
    ordered.sort_by_key(|m| m.timestamp);

    let window = Duration::seconds(60);
    let mut in_window: HashMap<&str, usize> = HashMap::new();
    let mut start = 0;
    let mut peak = 0;

    for m in &ordered {
        *in_window.entry(m.flight_callsign.as_str()).or_default() += 1;

        while m.timestamp - ordered[start].timestamp >= window {
            let leaving = ordered[start].flight_callsign.as_str();
            let remaining = in_window.get_mut(leaving).map(|count| {
                *count -= 1;
                *count
            });
            if remaining == Some(0) {
                in_window.remove(leaving);
            }
            start += 1;
        }

        peak = peak.max(in_window.len());
    }
    peak
}

struct DetailAccumulator {
    first_contact: DateTime<Utc>,
    last_contact: DateTime<Utc>,
    contact_count: u32,
    min_distance_nm: f64,
    confidence_sum: f64,
    frequency_counts: BTreeMap<String, u32>,
}

impl DetailAccumulator {
    fn new(m: &InteractionMatch) -> Self {
        Self {
            first_contact: m.timestamp,
            last_contact: m.timestamp,
            contact_count: 0,
            min_distance_nm: f64::INFINITY,
            confidence_sum: 0.0,
            frequency_counts: BTreeMap::new(),
        }
    }

    fn add(&mut self, m: &InteractionMatch) {
        self.first_contact = self.first_contact.min(m.timestamp);
        self.last_contact = self.last_contact.max(m.timestamp);
        self.contact_count += 1;
        self.min_distance_nm = self.min_distance_nm.min(m.distance_nm);
        self.confidence_sum += m.confidence;
        *self.frequency_counts.entry(mhz_label(m.frequency_hz)).or_default() += 1;
    }

    fn finish(self, callsign: String) -> AircraftDetail {
        // most used frequency, lowest label on ties
        let frequency_mhz = self
            .frequency_counts
            .iter()
            .fold(None::<(&String, u32)>, |best, (label, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((label, *count)),
            })
            .map(|(label, _)| label.clone())
            .unwrap_or_default();

        AircraftDetail {
            callsign,
            first_contact: self.first_contact,
            last_contact: self.last_contact,
            contact_count: self.contact_count,
            frequency_mhz,
            min_distance_nm: self.min_distance_nm,
            mean_confidence: self.confidence_sum / f64::from(self.contact_count.max(1)),
        }
    }
}

/// Builds the durable summary of a merged session from its controller→flight
/// matches.
pub fn aggregate_session(
    session: &MergedSession,
    matches: &[InteractionMatch],
    created_at: DateTime<Utc>,
) -> ControllerSummary {
    let mut flights: BTreeSet<&str> = BTreeSet::new();
    let mut per_hour: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    let mut frequencies: BTreeSet<String> = BTreeSet::new();
    let mut details: HashMap<&str, DetailAccumulator> = HashMap::new();

    for m in matches {
        let flight = m.flight_callsign.as_str();
        flights.insert(flight);
        per_hour.entry(hour_key(&m.timestamp)).or_default().insert(flight);
        frequencies.insert(mhz_label(m.frequency_hz));
        details
            .entry(flight)
            .or_insert_with(|| DetailAccumulator::new(m))
            .add(m);
    }

    let peak_aircraft = peak_in_rolling_minute(matches);

    let mut aircraft_details: Vec<AircraftDetail> = details
        .into_iter()
        .map(|(callsign, acc)| acc.finish(callsign.to_string()))
        .collect();
    aircraft_details.sort_by(|a, b| {
        a.first_contact
            .cmp(&b.first_contact)
            .then_with(|| a.callsign.cmp(&b.callsign))
    });

    ControllerSummary {
        id: Uuid::new_v4().to_string(),
        callsign: session.callsign.clone(),
        cid: session.cid,
        name: session.name.clone(),
        session_start: session.session_start,
        session_end: session.session_end,
        duration_minutes: session.duration_minutes(),
        total_aircraft: flights.len() as u32,
        peak_aircraft: peak_aircraft as u32,
        hourly_breakdown: per_hour
            .into_iter()
            .map(|(hour, set)| (hour, set.len() as u32))
            .collect(),
        frequencies_used: frequencies.into_iter().collect(),
        aircraft_details,
        created_at,
    }
}
