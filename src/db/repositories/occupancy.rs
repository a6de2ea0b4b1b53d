use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime},
    models::SectorOccupancy,
};
use crate::geo::Position;

const OCCUPANCY_COLUMNS: &str = "id, callsign, sector_name, entry_timestamp, exit_timestamp,
    duration_seconds, entry_lat, entry_lon, exit_lat, exit_lon, entry_altitude, exit_altitude";

/// A single change to the occupancy table produced by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum OccupancyWrite {
    Open(SectorOccupancy),
    Close {
        callsign: String,
        sector_name: String,
        exit_time: DateTime<Utc>,
        exit_pos: Position,
        exit_altitude: Option<i64>,
        duration_seconds: i64,
    },
}

fn row_to_occupancy(row: &Row) -> Result<SectorOccupancy> {
    let entry: String = row.get("entry_timestamp")?;
    let exit: Option<String> = row.get("exit_timestamp")?;
    let exit_lat: Option<f64> = row.get("exit_lat")?;
    let exit_lon: Option<f64> = row.get("exit_lon")?;

    Ok(SectorOccupancy {
        id: row.get("id")?,
        callsign: row.get("callsign")?,
        sector_name: row.get("sector_name")?,
        entry_time: parse_datetime(&entry, "entry_timestamp")?,
        exit_time: parse_optional_datetime(exit, "exit_timestamp")?,
        entry_pos: Position::new(row.get("entry_lat")?, row.get("entry_lon")?),
        exit_pos: match (exit_lat, exit_lon) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
            _ => None,
        },
        entry_altitude: row.get("entry_altitude")?,
        exit_altitude: row.get("exit_altitude")?,
        duration_seconds: row.get("duration_seconds")?,
    })
}

/// Closes a row left open by a previous run at the entry point of the new
/// occupancy. Returns the number of rows closed.
fn close_stale_open(tx: &Transaction<'_>, occupancy: &SectorOccupancy) -> Result<usize> {
    let entry = format_datetime(&occupancy.entry_time);
    let closed = tx
        .execute(
            "UPDATE flight_sector_occupancy
             SET exit_timestamp = MAX(entry_timestamp, ?2),
                 exit_lat = ?3,
                 exit_lon = ?4,
                 exit_altitude = ?5,
                 duration_seconds = MAX(0, CAST(ROUND(
                     (julianday(?2) - julianday(entry_timestamp)) * 86400) AS INTEGER))
             WHERE callsign = ?1 AND exit_timestamp IS NULL",
            params![
                occupancy.callsign,
                entry,
                occupancy.entry_pos.lat,
                occupancy.entry_pos.lon,
                occupancy.entry_altitude,
            ],
        )
        .context("failed to close stale open occupancy")?;
    Ok(closed)
}

fn apply_write(tx: &Transaction<'_>, write: &OccupancyWrite) -> Result<()> {
    match write {
        OccupancyWrite::Open(occupancy) => {
            if close_stale_open(tx, occupancy)? > 0 {
                warn!(
                    "Closed stale open occupancy for {} before opening {}",
                    occupancy.callsign, occupancy.sector_name
                );
            }
            tx.execute(
                "INSERT INTO flight_sector_occupancy (callsign, sector_name, entry_timestamp,
                    entry_lat, entry_lon, entry_altitude)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    occupancy.callsign,
                    occupancy.sector_name,
                    format_datetime(&occupancy.entry_time),
                    occupancy.entry_pos.lat,
                    occupancy.entry_pos.lon,
                    occupancy.entry_altitude,
                ],
            )
            .context("failed to open sector occupancy")?;
        }
        OccupancyWrite::Close {
            callsign,
            sector_name,
            exit_time,
            exit_pos,
            exit_altitude,
            duration_seconds,
        } => {
            let updated = tx
                .execute(
                    "UPDATE flight_sector_occupancy
                     SET exit_timestamp = ?3, exit_lat = ?4, exit_lon = ?5,
                         exit_altitude = ?6, duration_seconds = ?7
                     WHERE callsign = ?1 AND sector_name = ?2 AND exit_timestamp IS NULL",
                    params![
                        callsign,
                        sector_name,
                        format_datetime(exit_time),
                        exit_pos.lat,
                        exit_pos.lon,
                        exit_altitude,
                        duration_seconds,
                    ],
                )
                .context("failed to close sector occupancy")?;
            if updated == 0 {
                warn!("No open occupancy of {sector_name} for {callsign} to close");
            }
        }
    }
    Ok(())
}

impl Database {
    /// Applies a batch of tracker writes in order, in one transaction.
    pub async fn apply_occupancy_writes(&self, writes: Vec<OccupancyWrite>) -> Result<usize> {
        if writes.is_empty() {
            return Ok(0);
        }
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for write in &writes {
                apply_write(&tx, write)?;
            }
            tx.commit().context("failed to commit occupancy writes")?;
            Ok(writes.len())
        })
        .await
    }

    pub async fn list_occupancies(&self, callsign: &str) -> Result<Vec<SectorOccupancy>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {OCCUPANCY_COLUMNS} FROM flight_sector_occupancy
                 WHERE callsign = ?1
                 ORDER BY entry_timestamp, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![callsign])?;
            let mut occupancies = Vec::new();
            while let Some(row) = rows.next()? {
                occupancies.push(row_to_occupancy(row)?);
            }
            Ok(occupancies)
        })
        .await
    }

    /// Occupancies of one flight overlapping `[start, end]`.
    pub async fn list_occupancies_between(
        &self,
        callsign: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SectorOccupancy>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {OCCUPANCY_COLUMNS} FROM flight_sector_occupancy
                 WHERE callsign = ?1
                   AND entry_timestamp <= ?3
                   AND (exit_timestamp IS NULL OR exit_timestamp >= ?2)
                 ORDER BY entry_timestamp, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![
                callsign,
                format_datetime(&start),
                format_datetime(&end)
            ])?;
            let mut occupancies = Vec::new();
            while let Some(row) = rows.next()? {
                occupancies.push(row_to_occupancy(row)?);
            }
            Ok(occupancies)
        })
        .await
    }

    pub async fn open_occupancy(&self, callsign: &str) -> Result<Option<SectorOccupancy>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {OCCUPANCY_COLUMNS} FROM flight_sector_occupancy
                 WHERE callsign = ?1 AND exit_timestamp IS NULL"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![callsign])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_occupancy(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn count_open_occupancies(&self, callsign: &str) -> Result<usize> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM flight_sector_occupancy
                 WHERE callsign = ?1 AND exit_timestamp IS NULL",
                params![callsign],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_support::temp_database;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn open(sector: &str, at: DateTime<Utc>) -> OccupancyWrite {
        OccupancyWrite::Open(SectorOccupancy {
            id: None,
            callsign: "QFA1".into(),
            sector_name: sector.into(),
            entry_time: at,
            exit_time: None,
            entry_pos: Position::new(-34.0, 151.0),
            exit_pos: None,
            entry_altitude: Some(35_000),
            exit_altitude: None,
            duration_seconds: None,
        })
    }

    fn close(sector: &str, at: DateTime<Utc>, duration: i64) -> OccupancyWrite {
        OccupancyWrite::Close {
            callsign: "QFA1".into(),
            sector_name: sector.into(),
            exit_time: at,
            exit_pos: Position::new(-35.0, 150.0),
            exit_altitude: Some(34_000),
            duration_seconds: duration,
        }
    }

    #[tokio::test]
    async fn close_then_open_keeps_one_open_row() {
        let (_dir, db) = temp_database();
        db.apply_occupancy_writes(vec![open("WOL", t(8, 0))]).await.unwrap();
        db.apply_occupancy_writes(vec![close("WOL", t(8, 30), 1800), open("BIK", t(8, 30))])
            .await
            .unwrap();

        assert_eq!(db.count_open_occupancies("QFA1").await.unwrap(), 1);
        let rows = db.list_occupancies("QFA1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sector_name, "WOL");
        assert_eq!(rows[0].exit_time, Some(t(8, 30)));
        assert_eq!(rows[0].duration_seconds, Some(1800));
        assert_eq!(rows[0].exit_altitude, Some(34_000));
        assert_eq!(db.open_occupancy("QFA1").await.unwrap().unwrap().sector_name, "BIK");
    }

    #[tokio::test]
    async fn open_closes_row_left_open_by_previous_run() {
        let (_dir, db) = temp_database();
        db.apply_occupancy_writes(vec![open("WOL", t(8, 0))]).await.unwrap();
        // no close for WOL: state was lost
        db.apply_occupancy_writes(vec![open("BIK", t(8, 10))]).await.unwrap();

        let rows = db.list_occupancies("QFA1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].exit_time, Some(t(8, 10)));
        assert_eq!(rows[0].duration_seconds, Some(600));
        assert_eq!(db.count_open_occupancies("QFA1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn range_query_includes_open_rows() {
        let (_dir, db) = temp_database();
        db.apply_occupancy_writes(vec![
            open("WOL", t(8, 0)),
            close("WOL", t(8, 20), 1200),
            open("BIK", t(9, 0)),
        ])
        .await
        .unwrap();

        let hits = db.list_occupancies_between("QFA1", t(8, 30), t(9, 30)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sector_name, "BIK");
        assert!(hits[0].is_open());
    }
}
