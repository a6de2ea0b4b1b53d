use chrono::{DateTime, Utc};

use crate::db::{models::FlightContactSummary, models::FlightRecord, Database};
use crate::errors::{EngineError, Result};
use crate::flights::summary::summarize_flight;
use crate::interactions::InteractionDetector;
use crate::{log_error, log_info};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlightSweepReport {
    pub summarized: usize,
    pub failed: usize,
}

/// Turns completed flights into `flight_summaries` rows.
///
/// Sector state is left alone: the completion signal already closed the
/// flight's occupancy, and the callsign may belong to a newer live flight
/// by the time the sweep runs. A row still open is counted up to the
/// flight's end.
#[derive(Clone)]
pub struct FlightSummarizer {
    db: Database,
    detector: InteractionDetector,
}

impl FlightSummarizer {
    pub fn new(db: Database, detector: InteractionDetector) -> Self {
        Self { db, detector }
    }

    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<FlightSweepReport> {
        let flights = self
            .db
            .list_completed_flights_without_summary()
            .await
            .map_err(EngineError::Persistence)?;

        let mut report = FlightSweepReport::default();
        for flight in flights {
            match self.summarize(&flight, now).await {
                Ok(summary) => {
                    log_info!(
                        "Flight {} summarized: {:.1}% under contact ({:.1}% airborne)",
                        summary.callsign,
                        summary.controller_time_percentage,
                        summary.airborne_controller_time_percentage
                    );
                    report.summarized += 1;
                }
                Err(err) => {
                    log_error!("Failed to summarize flight {}: {err}", flight.callsign);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn summarize(
        &self,
        flight: &FlightRecord,
        now: DateTime<Utc>,
    ) -> Result<FlightContactSummary> {
        let end_time = flight.end_time();
        let matches = self
            .detector
            .try_detect_flight_atc_interactions(
                &flight.callsign,
                flight.departure.as_deref(),
                flight.arrival.as_deref(),
                flight.logon_time,
                end_time,
            )
            .await?;

        let occupancies = self
            .db
            .list_occupancies_between(&flight.callsign, flight.logon_time, end_time)
            .await
            .map_err(EngineError::Persistence)?;

        let summary = summarize_flight(flight, &matches, &occupancies, end_time);
        self.db
            .insert_flight_summary(&summary, now)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(summary)
    }
}
