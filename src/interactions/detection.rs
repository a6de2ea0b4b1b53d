//! Database-backed detection in both directions.
//!
//! Each call loads its own side with one bounded query over the entity's
//! active span, then the counterpart side with one query widened by the
//! configured buffer and restricted to the frequencies the entity used. Both
//! queries run in one closure on the store's single connection, under the
//! detection timeout.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};

use crate::controllers::{classify, ControllerCategory};
use crate::db::{
    models::{SampleKind, TransceiverSample},
    repositories::transceivers::{query_counterpart_samples, query_entity_samples},
    Database,
};
use crate::errors::{input_error, EngineError, Result};
use crate::interactions::{
    config::MatchConfig,
    frequency::{frequency_report, FrequencyContact, DEFAULT_TOLERANCE_HZ},
    matcher::{match_samples, InteractionMatch},
    scoring::apply_airport_affinity,
};
use crate::settings::EngineConfig;
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

type Sides = (Vec<TransceiverSample>, Vec<TransceiverSample>);

/// A timed-out detection yields no matches; the caller carries on.
fn settle(
    callsign: &str,
    detected: Result<Vec<InteractionMatch>>,
) -> Result<Vec<InteractionMatch>> {
    match detected {
        Err(EngineError::DetectionTimeout { secs, .. }) => {
            log_warn!("Detection for {callsign} timed out after {secs}s, returning no matches");
            Ok(Vec::new())
        }
        other => other,
    }
}

fn without_observers(samples: Vec<TransceiverSample>) -> Vec<TransceiverSample> {
    samples
        .into_iter()
        .filter(|s| !ControllerCategory::from_callsign(&s.callsign).is_observer())
        .collect()
}

#[derive(Clone)]
pub struct InteractionDetector {
    db: Database,
    config: Arc<EngineConfig>,
}

impl InteractionDetector {
    pub fn new(db: Database, config: Arc<EngineConfig>) -> Self {
        Self { db, config }
    }

    async fn bounded<F>(&self, callsign: &str, load: F) -> Result<Sides>
    where
        F: Future<Output = anyhow::Result<Sides>>,
    {
        match tokio::time::timeout(self.config.detection_timeout(), load).await {
            Ok(result) => result.map_err(EngineError::Detection),
            Err(_) => Err(EngineError::DetectionTimeout {
                callsign: callsign.to_string(),
                secs: self.config.detection_timeout_secs,
            }),
        }
    }

    async fn load_sides(
        &self,
        callsign: &str,
        kind: SampleKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tolerance_hz: i64,
    ) -> Result<Sides> {
        if end < start {
            return Err(input_error!("{callsign}: span ends ({end}) before it starts ({start})"));
        }

        let buffer = self.config.query_buffer();
        let owner = callsign.to_string();
        let load = self.db.execute(move |conn| {
            let own = query_entity_samples(conn, &owner, kind, start, end)?;
            if own.is_empty() {
                return Ok((own, Vec::new()));
            }
            let others = query_counterpart_samples(
                conn,
                &owner,
                kind,
                start,
                end,
                start - buffer,
                end + buffer,
                tolerance_hz,
            )?;
            Ok((own, others))
        });

        self.bounded(callsign, load).await
    }

    /// Flights worked by a controller during `[session_start, session_end]`,
    /// within the radius of the controller's category. A timeout is logged
    /// and yields no matches.
    pub async fn detect_controller_flight_interactions(
        &self,
        controller_callsign: &str,
        session_start: DateTime<Utc>,
        session_end: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        let detected = self
            .try_detect_controller_flight_interactions(
                controller_callsign,
                session_start,
                session_end,
            )
            .await;
        settle(controller_callsign, detected)
    }

    /// Same as `detect_controller_flight_interactions` but reports a timeout
    /// as `DetectionTimeout`, for callers that persist the result and must
    /// retry instead of recording an empty session.
    pub async fn try_detect_controller_flight_interactions(
        &self,
        controller_callsign: &str,
        session_start: DateTime<Utc>,
        session_end: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        let class = classify(controller_callsign, &self.config.radii);
        if class.category.is_observer() {
            return Ok(Vec::new());
        }

        let (own, flights) = self
            .load_sides(
                controller_callsign,
                SampleKind::Controller,
                session_start,
                session_end,
                0,
            )
            .await?;

        let config = MatchConfig::from_engine(&self.config, class.radius_nm);
        let matches = match_samples(&own, &flights, &config);
        log_debug!(
            "{controller_callsign} ({}): {} samples, {} flight samples, {} matches",
            class.category,
            own.len(),
            flights.len(),
            matches.len()
        );
        Ok(matches)
    }

    /// Controllers a flight was in contact with between logon and `end_time`.
    /// Observers are never counted; controllers at the departure or arrival
    /// airport get the affinity bonus. A timeout is logged and yields no
    /// matches.
    pub async fn detect_flight_atc_interactions(
        &self,
        flight_callsign: &str,
        departure: Option<&str>,
        arrival: Option<&str>,
        logon_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        let detected = self
            .try_detect_flight_atc_interactions(
                flight_callsign,
                departure,
                arrival,
                logon_time,
                end_time,
            )
            .await;
        settle(flight_callsign, detected)
    }

    pub async fn try_detect_flight_atc_interactions(
        &self,
        flight_callsign: &str,
        departure: Option<&str>,
        arrival: Option<&str>,
        logon_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        let (own, controllers) = self
            .load_sides(flight_callsign, SampleKind::Flight, logon_time, end_time, 0)
            .await?;
        let controllers = without_observers(controllers);

        let config = MatchConfig::from_engine(&self.config, self.config.flight_distance_nm);
        let mut matches = match_samples(&own, &controllers, &config);

        let airports: Vec<&str> = [departure, arrival].into_iter().flatten().collect();
        for m in &mut matches {
            m.confidence = apply_airport_affinity(
                m.confidence,
                &m.controller_callsign,
                &airports,
                self.config.airport_affinity_bonus,
            );
        }

        log_debug!(
            "{flight_callsign}: {} samples, {} controller samples, {} matches",
            own.len(),
            controllers.len(),
            matches.len()
        );
        Ok(matches)
    }

    /// Frequency-only contacts of a flight over `[start, end]`: controllers
    /// heard within the tolerance and time window, regardless of distance.
    /// Both sides are loaded in one bounded call; a timeout is an error.
    pub async fn frequency_report(
        &self,
        flight_callsign: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FrequencyContact>> {
        let (own, controllers) = self
            .load_sides(flight_callsign, SampleKind::Flight, start, end, DEFAULT_TOLERANCE_HZ)
            .await?;
        let controllers = without_observers(controllers);

        Ok(frequency_report(
            &own,
            &controllers,
            DEFAULT_TOLERANCE_HZ,
            self.config.time_window(),
        ))
    }
}
