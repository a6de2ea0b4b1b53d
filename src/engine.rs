//! The engine: one value wiring configuration, the store, the sector catalog,
//! per-flight sector state and the sweep workers, and the inbound API used
//! by the ingestion layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{
    models::{ControllerIdentity, FlightIdentity, FlightRecord, TransceiverSample},
    Database,
};
use crate::errors::{input_error, EngineError, Result};
use crate::flights::{FlightSummarizer, FlightSweepReport};
use crate::geo::Position;
use crate::interactions::{FrequencyContact, InteractionDetector, InteractionMatch};
use crate::occupancy::{OccupancyTracker, PositionSample, SectorStateStore};
use crate::sectors::SectorCatalog;
use crate::sessions::{SessionManager, SweepReport};
use crate::settings::EngineConfig;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// Result of one position batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub writes: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    db: Database,
    catalog: Arc<SectorCatalog>,
    tracker: OccupancyTracker,
    detector: InteractionDetector,
    sessions: SessionManager,
    flights: FlightSummarizer,
}

impl Engine {
    pub fn new(config: EngineConfig, db: Database, catalog: SectorCatalog) -> Self {
        let config = Arc::new(config);
        let catalog = Arc::new(catalog);
        let tracker =
            OccupancyTracker::new(Arc::clone(&catalog), Arc::new(SectorStateStore::new()));
        let detector = InteractionDetector::new(db.clone(), Arc::clone(&config));
        let sessions = SessionManager::new(db.clone(), detector.clone(), Arc::clone(&config));
        let flights = FlightSummarizer::new(db.clone(), detector.clone());

        Self {
            config,
            db,
            catalog,
            tracker,
            detector,
            sessions,
            flights,
        }
    }

    /// Loads the sector catalog and opens the store named in `config`.
    /// Either failing is fatal.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let catalog = SectorCatalog::load(&config.sector_catalog_path)?;
        let db = Database::new(config.database_path.clone()).map_err(EngineError::Persistence)?;
        log_info!(
            "Engine ready: {} sectors, store at {}",
            catalog.len(),
            db.path().display()
        );
        Ok(Self::new(config, db, catalog))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn catalog(&self) -> &SectorCatalog {
        &self.catalog
    }

    pub fn state_store(&self) -> &Arc<SectorStateStore> {
        self.tracker.store()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn flights(&self) -> &FlightSummarizer {
        &self.flights
    }

    /// Stores a batch of transceiver samples. Samples without a callsign are
    /// dropped; an out-of-range position is stored as unknown.
    pub async fn ingest_transceivers(&self, samples: Vec<TransceiverSample>) -> Result<usize> {
        let mut accepted = Vec::with_capacity(samples.len());
        for mut sample in samples {
            if sample.callsign.trim().is_empty() {
                log_warn!("Dropping transceiver sample without callsign at {}", sample.timestamp);
                continue;
            }
            if sample.position.is_some_and(|p| !p.is_valid()) {
                log_warn!("{}: invalid transceiver position, storing as unknown", sample.callsign);
                sample.position = None;
            }
            accepted.push(sample);
        }

        self.db
            .insert_transceivers(&accepted)
            .await
            .map_err(EngineError::Persistence)
    }

    /// Runs a position batch through the occupancy tracker and writes the
    /// resulting occupancy changes in one transaction. On a failed write
    /// nothing is kept, so the batch can be resubmitted as is.
    pub async fn ingest_positions(&self, samples: Vec<PositionSample>) -> Result<IngestReport> {
        let batch = self
            .tracker
            .process_batch(&self.db, samples)
            .await
            .map_err(|err| {
                log_error!("Failed to persist occupancy batch: {err:#}");
                EngineError::Persistence(err)
            })?;

        Ok(IngestReport {
            writes: batch.writes.len(),
            skipped: batch.skipped,
        })
    }

    pub async fn upsert_controller(&self, identity: ControllerIdentity) -> Result<i64> {
        if identity.callsign.trim().is_empty() {
            return Err(input_error!("controller identity without callsign (cid {})", identity.cid));
        }
        if identity.last_seen < identity.logon_time {
            return Err(input_error!(
                "{}: last_seen {} before logon {}",
                identity.callsign,
                identity.last_seen,
                identity.logon_time
            ));
        }
        self.db
            .upsert_controller(&identity)
            .await
            .map_err(EngineError::Persistence)
    }

    pub async fn upsert_flight(&self, identity: FlightIdentity) -> Result<()> {
        if identity.callsign.trim().is_empty() {
            return Err(input_error!("flight identity without callsign (cid {})", identity.cid));
        }
        self.db
            .upsert_flight(&identity)
            .await
            .map_err(EngineError::Persistence)
    }

    /// External completion signal: closes the flight's open occupancy at
    /// `at`, forgets its sector state and marks the flight completed so the
    /// flight sweep summarizes it.
    pub async fn complete_flight(
        &self,
        callsign: &str,
        at: DateTime<Utc>,
        last_position: Option<Position>,
        last_altitude: Option<i64>,
    ) -> Result<Option<FlightRecord>> {
        self.tracker
            .complete(&self.db, callsign, at, last_position, last_altitude)
            .await
            .map_err(EngineError::Persistence)?;

        let completed = self
            .db
            .mark_flight_completed(callsign, at)
            .await
            .map_err(EngineError::Persistence)?;
        if completed.is_none() {
            log_warn!("Completion signal for {callsign} without an active flight record");
        }
        Ok(completed)
    }

    pub async fn detect_controller_flight_interactions(
        &self,
        controller_callsign: &str,
        session_start: DateTime<Utc>,
        session_end: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        self.detector
            .detect_controller_flight_interactions(controller_callsign, session_start, session_end)
            .await
    }

    pub async fn detect_flight_atc_interactions(
        &self,
        flight_callsign: &str,
        departure: Option<&str>,
        arrival: Option<&str>,
        logon_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<InteractionMatch>> {
        self.detector
            .detect_flight_atc_interactions(
                flight_callsign,
                departure,
                arrival,
                logon_time,
                end_time,
            )
            .await
    }

    /// Historical ±100 Hz report of which controllers a flight shared a
    /// frequency with, without the distance check.
    pub async fn frequency_report(
        &self,
        flight_callsign: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FrequencyContact>> {
        self.detector.frequency_report(flight_callsign, start, end).await
    }

    pub async fn run_controller_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.sessions.run_sweep(now).await
    }

    pub async fn run_flight_sweep(&self, now: DateTime<Utc>) -> Result<FlightSweepReport> {
        self.flights.run_sweep(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_support::temp_database;
    use crate::db::models::SampleKind;
    use crate::sectors::SectorDef;
    use chrono::{Duration, TimeZone};

    fn t(m: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(m)
    }

    fn engine() -> (tempfile::TempDir, Engine) {
        let (dir, db) = temp_database();
        let catalog = SectorCatalog::from_defs(vec![SectorDef {
            name: "BOX".into(),
            points: vec![[-35.0, 150.0], [-35.0, 152.0], [-33.0, 152.0], [-33.0, 150.0]],
        }])
        .unwrap();
        (dir, Engine::new(EngineConfig::default(), db, catalog))
    }

    fn position(m: i64, speed: f64) -> PositionSample {
        PositionSample {
            callsign: "QFA1".into(),
            timestamp: t(m),
            position: Position::new(-34.0, 151.0),
            altitude_ft: Some(20_000),
            groundspeed_kt: Some(speed),
        }
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected_or_sanitized() {
        let (_dir, engine) = engine();
        let identity = ControllerIdentity {
            callsign: "SY_APP".into(),
            cid: 1,
            name: None,
            facility_rating: 5,
            logon_time: t(10),
            last_seen: t(5),
        };
        assert!(matches!(
            engine.upsert_controller(identity).await,
            Err(EngineError::InputData(_))
        ));

        let stored = engine
            .ingest_transceivers(vec![
                TransceiverSample::new("", SampleKind::Flight, 118_500_000, t(0), None),
                TransceiverSample::new(
                    "QFA1",
                    SampleKind::Flight,
                    118_500_000,
                    t(0),
                    Some(Position::new(123.0, 0.0)),
                ),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 1);
        let loaded = engine
            .db()
            .load_samples("QFA1", SampleKind::Flight, t(-1), t(1))
            .await
            .unwrap();
        assert_eq!(loaded[0].position, None);
    }

    #[tokio::test]
    async fn completion_closes_occupancy_and_drops_state() {
        let (_dir, engine) = engine();
        engine
            .upsert_flight(FlightIdentity {
                callsign: "QFA1".into(),
                cid: 9,
                departure: None,
                arrival: None,
                logon_time: t(0),
                last_seen: t(5),
            })
            .await
            .unwrap();

        let report = engine
            .ingest_positions(vec![position(1, 250.0), position(2, 250.0)])
            .await
            .unwrap();
        assert_eq!(report, IngestReport { writes: 1, skipped: 0 });
        assert_eq!(engine.db().count_open_occupancies("QFA1").await.unwrap(), 1);

        let completed = engine
            .complete_flight("QFA1", t(30), Some(Position::new(-34.5, 151.5)), Some(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.completed_at, Some(t(30)));
        assert_eq!(engine.db().count_open_occupancies("QFA1").await.unwrap(), 0);
        assert!(engine.state_store().get("QFA1").await.is_none());

        let rows = engine.db().list_occupancies("QFA1").await.unwrap();
        assert_eq!(rows[0].duration_seconds, Some(29 * 60));

        let sweep = engine.run_flight_sweep(t(40)).await.unwrap();
        assert_eq!(sweep.summarized, 1);
        let summary = engine.db().get_flight_summary("QFA1", t(0)).await.unwrap().unwrap();
        assert_eq!(summary.total_minutes, 30);
        assert_eq!(summary.airborne_minutes, 29);
        assert_eq!(summary.contact_minutes, 0);
    }

    #[tokio::test]
    async fn frequency_report_reads_stored_samples() {
        let (_dir, engine) = engine();
        let here = Some(Position::new(-34.0, 151.0));
        engine
            .ingest_transceivers(vec![
                TransceiverSample::new("QFA1", SampleKind::Flight, 121_000_000, t(0), here),
                TransceiverSample::new("QFA1", SampleKind::Flight, 121_000_000, t(1), here),
                TransceiverSample::new("SY_GND", SampleKind::Controller, 121_000_040, t(1), None),
            ])
            .await
            .unwrap();

        let report = engine.frequency_report("QFA1", t(0), t(5)).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].controller_callsign, "SY_GND");
        assert_eq!(report[0].frequency_label, "121.0");
        assert_eq!(report[0].samples, 2);

        assert!(matches!(
            engine.frequency_report("QFA1", t(5), t(0)).await,
            Err(EngineError::InputData(_))
        ));
    }

    #[tokio::test]
    async fn flight_sweep_leaves_a_reused_callsign_alone() {
        let (_dir, engine) = engine();
        let flight = |cid: i64, logon: i64| FlightIdentity {
            callsign: "QFA1".into(),
            cid,
            departure: None,
            arrival: None,
            logon_time: t(logon),
            last_seen: t(logon + 5),
        };

        engine.upsert_flight(flight(1, 0)).await.unwrap();
        engine.ingest_positions(vec![position(1, 250.0)]).await.unwrap();
        engine.complete_flight("QFA1", t(60), None, None).await.unwrap();

        // same callsign, new pilot, already inside the box
        engine.upsert_flight(flight(2, 130)).await.unwrap();
        engine
            .ingest_positions(vec![position(130, 250.0), position(131, 250.0)])
            .await
            .unwrap();

        let sweep = engine.run_flight_sweep(t(150)).await.unwrap();
        assert_eq!(sweep.summarized, 1);

        let live = engine.db().open_occupancy("QFA1").await.unwrap().unwrap();
        assert_eq!(live.entry_time, t(130));
        assert_eq!(
            engine.state_store().get("QFA1").await.unwrap().current_sector(),
            Some("BOX")
        );

        let summary = engine.db().get_flight_summary("QFA1", t(0)).await.unwrap().unwrap();
        assert_eq!(summary.airborne_minutes, 59);
    }

    #[tokio::test]
    async fn failed_occupancy_write_can_be_resubmitted() {
        let (_dir, engine) = engine();
        let set_trigger = |create: bool| {
            engine.db().execute(move |conn| {
                conn.execute_batch(if create {
                    "CREATE TRIGGER reject_occupancy BEFORE INSERT ON flight_sector_occupancy
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
                } else {
                    "DROP TRIGGER reject_occupancy;"
                })?;
                Ok(())
            })
        };

        set_trigger(true).await.unwrap();
        let batch = vec![position(1, 250.0), position(2, 250.0)];
        assert!(matches!(
            engine.ingest_positions(batch.clone()).await,
            Err(EngineError::Persistence(_))
        ));
        assert!(engine.state_store().get("QFA1").await.is_none());

        set_trigger(false).await.unwrap();
        let report = engine.ingest_positions(batch).await.unwrap();
        assert_eq!(report, IngestReport { writes: 1, skipped: 0 });

        // later samples inside the box keep the row open rather than losing it
        let more: Vec<_> = (3..30).map(|m| position(m, 250.0)).collect();
        engine.ingest_positions(more).await.unwrap();
        assert_eq!(engine.db().list_occupancies("QFA1").await.unwrap().len(), 1);
        assert_eq!(engine.db().count_open_occupancies("QFA1").await.unwrap(), 1);
    }
}
