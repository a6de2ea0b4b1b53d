use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_flight_status, parse_optional_datetime},
    models::{FlightIdentity, FlightRecord},
};

const FLIGHT_COLUMNS: &str = "f.callsign AS callsign, f.cid AS cid, f.departure AS departure,
    f.arrival AS arrival, f.logon_time AS logon_time, f.last_seen AS last_seen,
    f.status AS status, f.completed_at AS completed_at";

fn row_to_flight(row: &Row) -> Result<FlightRecord> {
    let logon_time: String = row.get("logon_time")?;
    let last_seen: String = row.get("last_seen")?;
    let status: String = row.get("status")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(FlightRecord {
        callsign: row.get("callsign")?,
        cid: row.get("cid")?,
        departure: row.get("departure")?,
        arrival: row.get("arrival")?,
        logon_time: parse_datetime(&logon_time, "logon_time")?,
        last_seen: parse_datetime(&last_seen, "last_seen")?,
        status: parse_flight_status(&status)?,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
    })
}

impl Database {
    pub async fn upsert_flight(&self, identity: &FlightIdentity) -> Result<()> {
        let record = identity.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO flights (callsign, cid, departure, arrival, logon_time, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (callsign, cid, logon_time) DO UPDATE SET
                    departure = COALESCE(excluded.departure, departure),
                    arrival = COALESCE(excluded.arrival, arrival),
                    last_seen = MAX(last_seen, excluded.last_seen)",
                params![
                    record.callsign,
                    record.cid,
                    record.departure,
                    record.arrival,
                    format_datetime(&record.logon_time),
                    format_datetime(&record.last_seen),
                ],
            )
            .context("failed to upsert flight")?;
            Ok(())
        })
        .await
    }

    /// Marks the most recent active flight under `callsign` as completed.
    /// Returns the completed record, if there was one.
    pub async fn mark_flight_completed(
        &self,
        callsign: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<FlightRecord>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let key: Option<(i64, String)> = tx
                .query_row(
                    "SELECT cid, logon_time FROM flights
                     WHERE callsign = ?1 AND status = 'Active'
                     ORDER BY logon_time DESC LIMIT 1",
                    params![callsign],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((cid, logon_time)) = key else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE flights
                 SET status = 'Completed', completed_at = ?4, last_seen = MAX(last_seen, ?4)
                 WHERE callsign = ?1 AND cid = ?2 AND logon_time = ?3",
                params![callsign, cid, logon_time, format_datetime(&completed_at)],
            )
            .context("failed to mark flight completed")?;

            let sql = format!(
                "SELECT {FLIGHT_COLUMNS} FROM flights f
                 WHERE f.callsign = ?1 AND f.cid = ?2 AND f.logon_time = ?3"
            );
            let record = tx.query_row(&sql, params![callsign, cid, logon_time], |row| {
                Ok(row_to_flight(row))
            })??;
            tx.commit()?;
            Ok(Some(record))
        })
        .await
    }

    pub async fn get_flight(
        &self,
        callsign: &str,
        cid: i64,
        logon_time: DateTime<Utc>,
    ) -> Result<Option<FlightRecord>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {FLIGHT_COLUMNS} FROM flights f
                 WHERE f.callsign = ?1 AND f.cid = ?2 AND f.logon_time = ?3"
            );
            let record = conn
                .query_row(
                    &sql,
                    params![callsign, cid, format_datetime(&logon_time)],
                    |row| Ok(row_to_flight(row)),
                )
                .optional()?;
            record.transpose()
        })
        .await
    }

    /// Completed flights that have no row in `flight_summaries` yet.
    pub async fn list_completed_flights_without_summary(&self) -> Result<Vec<FlightRecord>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {FLIGHT_COLUMNS} FROM flights f
                 LEFT JOIN flight_summaries s
                    ON s.callsign = f.callsign AND s.logon_time = f.logon_time
                 WHERE f.status = 'Completed' AND s.callsign IS NULL
                 ORDER BY f.completed_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut flights = Vec::new();
            while let Some(row) = rows.next()? {
                flights.push(row_to_flight(row)?);
            }
            Ok(flights)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_support::temp_database;
    use crate::db::models::{FlightContactSummary, FlightStatus};
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn identity(last_seen: DateTime<Utc>) -> FlightIdentity {
        FlightIdentity {
            callsign: "QFA1".into(),
            cid: 99,
            departure: Some("YSSY".into()),
            arrival: Some("YMML".into()),
            logon_time: t(8, 0),
            last_seen,
        }
    }

    #[tokio::test]
    async fn completion_lifecycle() {
        let (_dir, db) = temp_database();
        db.upsert_flight(&identity(t(8, 5))).await.unwrap();
        db.upsert_flight(&identity(t(9, 0))).await.unwrap();

        let active = db.get_flight("QFA1", 99, t(8, 0)).await.unwrap().unwrap();
        assert_eq!(active.status, FlightStatus::Active);
        assert_eq!(active.last_seen, t(9, 0));
        assert!(db.list_completed_flights_without_summary().await.unwrap().is_empty());

        let completed = db.mark_flight_completed("QFA1", t(9, 30)).await.unwrap().unwrap();
        assert_eq!(completed.status, FlightStatus::Completed);
        assert_eq!(completed.end_time(), t(9, 30));
        assert!(db.mark_flight_completed("QFA1", t(9, 40)).await.unwrap().is_none());

        let pending = db.list_completed_flights_without_summary().await.unwrap();
        assert_eq!(pending.len(), 1);

        let summary = FlightContactSummary {
            callsign: "QFA1".into(),
            departure: None,
            arrival: None,
            logon_time: t(8, 0),
            end_time: t(9, 30),
            total_minutes: 90,
            contact_minutes: 0,
            airborne_minutes: 0,
            airborne_contact_minutes: 0,
            controller_time_percentage: 0.0,
            airborne_controller_time_percentage: 0.0,
            controllers: Vec::new(),
        };
        db.insert_flight_summary(&summary, t(10, 0)).await.unwrap();
        assert!(db.list_completed_flights_without_summary().await.unwrap().is_empty());
    }
}
