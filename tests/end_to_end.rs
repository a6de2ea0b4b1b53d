use atc_contact::{
    db::{
        models::{ControllerIdentity, FlightIdentity, SampleKind, TransceiverSample},
        Database,
    },
    geo::Position,
    occupancy::PositionSample,
    sectors::SectorCatalog,
    Engine, EngineConfig,
};
use chrono::{DateTime, TimeZone, Utc};

const WOL: &str = r#"[
    {"name": "WOL", "points": [[-34.0, 150.5], [-34.0, 151.5], [-35.0, 151.5], [-35.0, 150.5], [-34.0, 150.5]]}
]"#;

const TOWER_FREQ: i64 = 118_500_000;

fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
}

fn flight_pos() -> Position {
    Position::new(-34.4, 150.9)
}

fn sydney() -> Position {
    Position::new(-33.95, 151.18)
}

fn engine(dir: &tempfile::TempDir) -> Engine {
    let db = Database::new(dir.path().join("e2e.sqlite3")).unwrap();
    let catalog = SectorCatalog::from_json(WOL).unwrap();
    Engine::new(EngineConfig::default(), db, catalog)
}

#[tokio::test]
async fn qfa123_over_wollongong_with_sydney_centre() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    engine
        .upsert_flight(FlightIdentity {
            callsign: "QFA123".into(),
            cid: 1_000_001,
            departure: Some("YSSY".into()),
            arrival: Some("YMML".into()),
            logon_time: t(8, 0),
            last_seen: t(8, 47),
        })
        .await
        .unwrap();
    engine
        .upsert_controller(ControllerIdentity {
            callsign: "SY_CTR".into(),
            cid: 1_000_002,
            name: Some("Sydney Centre".into()),
            facility_rating: 5,
            logon_time: t(7, 30),
            last_seen: t(9, 0),
        })
        .await
        .unwrap();

    // cruising through WOL from 08:01, slowing below 30 kt at 08:46
    let mut positions: Vec<PositionSample> = (1..=45)
        .map(|m| PositionSample {
            callsign: "QFA123".into(),
            timestamp: t(8, m),
            position: flight_pos(),
            altitude_ft: Some(24_000),
            groundspeed_kt: Some(300.0),
        })
        .collect();
    for m in [46, 47] {
        positions.push(PositionSample {
            callsign: "QFA123".into(),
            timestamp: t(8, m),
            position: flight_pos(),
            altitude_ft: Some(0),
            groundspeed_kt: Some(25.0),
        });
    }
    let report = engine.ingest_positions(positions).await.unwrap();
    assert_eq!(report.skipped, 0);

    let mut radio = Vec::new();
    for m in 5..=45 {
        let at = t(8, m);
        radio.push(TransceiverSample::new(
            "QFA123",
            SampleKind::Flight,
            TOWER_FREQ,
            at,
            Some(flight_pos()),
        ));
        radio.push(TransceiverSample::new(
            "SY_CTR",
            SampleKind::Controller,
            TOWER_FREQ,
            at,
            Some(sydney()),
        ));
    }
    engine.ingest_transceivers(radio).await.unwrap();

    let occupancies = engine.db().list_occupancies("QFA123").await.unwrap();
    assert_eq!(occupancies.len(), 1);
    assert_eq!(occupancies[0].sector_name, "WOL");
    assert_eq!(occupancies[0].entry_time, t(8, 1));
    assert_eq!(occupancies[0].exit_time, Some(t(8, 47)));
    assert_eq!(occupancies[0].duration_seconds, Some(2760));
    assert_eq!(engine.db().count_open_occupancies("QFA123").await.unwrap(), 0);

    let live = engine
        .detect_flight_atc_interactions("QFA123", Some("YSSY"), Some("YMML"), t(8, 0), t(8, 50))
        .await
        .unwrap();
    assert_eq!(live.len(), 41);
    assert!(live.iter().all(|m| m.controller_callsign == "SY_CTR" && m.distance_nm < 60.0));

    engine
        .complete_flight("QFA123", t(8, 50), Some(flight_pos()), Some(0))
        .await
        .unwrap()
        .unwrap();

    let flights = engine.run_flight_sweep(t(9, 0)).await.unwrap();
    assert_eq!(flights.summarized, 1);
    assert_eq!(flights.failed, 0);

    let summary = engine
        .db()
        .get_flight_summary("QFA123", t(8, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.total_minutes, 50);
    assert_eq!(summary.contact_minutes, 41);
    assert!(summary.controller_time_percentage > 0.0);
    assert!((summary.controller_time_percentage - 82.0).abs() < 1e-9);
    assert_eq!(summary.airborne_minutes, 46);
    assert_eq!(summary.airborne_contact_minutes, 41);
    assert_eq!(summary.controllers.len(), 1);
    assert_eq!(summary.controllers[0].callsign, "SY_CTR");
    assert_eq!(summary.controllers[0].frequencies, vec!["118.5".to_string()]);

    // a second sweep finds nothing left to do
    assert_eq!(engine.run_flight_sweep(t(9, 30)).await.unwrap().summarized, 0);

    let controllers = engine.run_controller_sweep(t(10, 0)).await.unwrap();
    assert_eq!(controllers.summarized, 1);
    assert_eq!(controllers.archived, 1);

    let summaries = engine.db().list_controller_summaries("SY_CTR").await.unwrap();
    assert_eq!(summaries.len(), 1);
    let ctr = &summaries[0];
    assert_eq!(ctr.session_start, t(7, 30));
    assert_eq!(ctr.session_end, t(9, 0));
    assert_eq!(ctr.duration_minutes, 90);
    assert_eq!(ctr.total_aircraft, 1);
    assert_eq!(ctr.peak_aircraft, 1);
    assert_eq!(ctr.hourly_breakdown.get("2024-03-01T08:00Z"), Some(&1));
    assert_eq!(ctr.frequencies_used, vec!["118.5".to_string()]);
    assert_eq!(ctr.aircraft_details.len(), 1);
    assert_eq!(ctr.aircraft_details[0].callsign, "QFA123");
    assert_eq!(ctr.aircraft_details[0].contact_count, 41);
    assert_eq!(ctr.aircraft_details[0].first_contact, t(8, 5));
    assert_eq!(ctr.aircraft_details[0].last_contact, t(8, 45));

    assert!(engine
        .db()
        .list_controller_sessions("SY_CTR", 1_000_002)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(engine.db().count_archived_controllers("SY_CTR").await.unwrap(), 1);

    // state for the completed flight is gone
    assert!(engine.state_store().get("QFA123").await.is_none());
}
