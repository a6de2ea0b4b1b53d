use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::{ControllerIdentity, ControllerSession},
};

const CONTROLLER_COLUMNS: &str =
    "id, callsign, cid, name, facility_rating, logon_time, last_seen, is_finalized";

fn row_to_controller(row: &Row) -> Result<ControllerSession> {
    let logon_time: String = row.get("logon_time")?;
    let last_seen: String = row.get("last_seen")?;

    Ok(ControllerSession {
        id: row.get("id")?,
        callsign: row.get("callsign")?,
        cid: row.get("cid")?,
        name: row.get("name")?,
        facility_rating: row.get("facility_rating")?,
        logon_time: parse_datetime(&logon_time, "logon_time")?,
        last_seen: parse_datetime(&last_seen, "last_seen")?,
        is_finalized: row.get::<_, i64>("is_finalized")? != 0,
    })
}

impl Database {
    /// Creates the raw session on first sighting, otherwise bumps `last_seen`.
    /// Returns the row id.
    pub async fn upsert_controller(&self, identity: &ControllerIdentity) -> Result<i64> {
        let record = identity.clone();
        self.execute(move |conn| {
            let logon = format_datetime(&record.logon_time);
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM controllers
                     WHERE callsign = ?1 AND cid = ?2 AND logon_time = ?3",
                    params![record.callsign, record.cid, logon],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE controllers
                         SET last_seen = MAX(last_seen, ?1),
                             name = COALESCE(?2, name),
                             facility_rating = ?3
                         WHERE id = ?4",
                        params![
                            format_datetime(&record.last_seen),
                            record.name,
                            record.facility_rating,
                            id,
                        ],
                    )
                    .context("failed to refresh controller session")?;
                    Ok(id)
                }
                None => {
                    conn.execute(
                        "INSERT INTO controllers (callsign, cid, name, facility_rating, logon_time, last_seen)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            record.callsign,
                            record.cid,
                            record.name,
                            record.facility_rating,
                            logon,
                            format_datetime(&record.last_seen),
                        ],
                    )
                    .context("failed to insert controller session")?;
                    Ok(conn.last_insert_rowid())
                }
            }
        })
        .await
    }

    /// Raw sessions not seen since `cutoff`.
    pub async fn list_stale_controllers(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ControllerSession>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {CONTROLLER_COLUMNS} FROM controllers
                 WHERE last_seen < ?1 AND is_finalized = 0
                 ORDER BY callsign, logon_time"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![format_datetime(&cutoff)])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_controller(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Every raw session for a callsign/cid pair, oldest first.
    pub async fn list_controller_sessions(
        &self,
        callsign: &str,
        cid: i64,
    ) -> Result<Vec<ControllerSession>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {CONTROLLER_COLUMNS} FROM controllers
                 WHERE callsign = ?1 AND cid = ?2
                 ORDER BY logon_time"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![callsign, cid])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_controller(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Raw sessions already covered by a committed summary but not yet
    /// archived (a previous sweep stopped between the two steps).
    pub async fn list_finalized_controllers(&self) -> Result<Vec<ControllerSession>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {CONTROLLER_COLUMNS} FROM controllers
                 WHERE is_finalized = 1
                 ORDER BY callsign, logon_time"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_controller(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn finalized_summary_id(&self, controller_id: i64) -> Result<Option<String>> {
        self.execute(move |conn| {
            let summary_id: Option<Option<String>> = conn
                .query_row(
                    "SELECT summary_id FROM controllers WHERE id = ?1 AND is_finalized = 1",
                    params![controller_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(summary_id.flatten())
        })
        .await
    }

    /// Copies every raw row finalized under `summary_id` to the archive and
    /// deletes it, in one transaction. Rows that were never marked finalized
    /// are not touched.
    pub async fn archive_controller_sessions(
        &self,
        summary_id: &str,
        archived_at: DateTime<Utc>,
    ) -> Result<usize> {
        let summary_id = summary_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO controllers_archive
                    (id, callsign, cid, name, facility_rating, logon_time, last_seen, summary_id, archived_at)
                 SELECT id, callsign, cid, name, facility_rating, logon_time, last_seen, summary_id, ?2
                 FROM controllers WHERE summary_id = ?1 AND is_finalized = 1",
                params![summary_id, format_datetime(&archived_at)],
            )
            .context("failed to archive controller sessions")?;

            let removed = tx
                .execute(
                    "DELETE FROM controllers WHERE summary_id = ?1 AND is_finalized = 1",
                    params![summary_id],
                )
                .context("failed to delete archived controller sessions")?;

            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    pub async fn count_archived_controllers(&self, callsign: &str) -> Result<usize> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM controllers_archive WHERE callsign = ?1",
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

    fn identity(logon: DateTime<Utc>, last_seen: DateTime<Utc>) -> ControllerIdentity {
        ControllerIdentity {
            callsign: "SY_CTR".into(),
            cid: 1234567,
            name: Some("Jane Citizen".into()),
            facility_rating: 6,
            logon_time: logon,
            last_seen,
        }
    }

    #[tokio::test]
    async fn upsert_bumps_last_seen_without_duplicating() {
        let (_dir, db) = temp_database();
        let first = db.upsert_controller(&identity(t(10, 0), t(10, 1))).await.unwrap();
        let second = db.upsert_controller(&identity(t(10, 0), t(10, 20))).await.unwrap();
        // out-of-order poll never moves last_seen backwards
        db.upsert_controller(&identity(t(10, 0), t(10, 5))).await.unwrap();
        assert_eq!(first, second);

        let sessions = db.list_controller_sessions("SY_CTR", 1234567).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].last_seen, t(10, 20));
    }

    #[tokio::test]
    async fn stale_listing_and_archive() {
        let (_dir, db) = temp_database();
        let id = db.upsert_controller(&identity(t(10, 0), t(10, 30))).await.unwrap();
        db.upsert_controller(&identity(t(12, 0), t(12, 30))).await.unwrap();

        let stale = db.list_stale_controllers(t(11, 0)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, id);

        // mark as finalized the way a summary commit does
        db.execute(move |conn| {
            conn.execute(
                "INSERT INTO controller_summaries (id, callsign, cid, session_start_time, session_end_time,
                    session_duration_minutes, total_aircraft_handled, peak_aircraft_count,
                    hourly_aircraft_breakdown, frequencies_used, aircraft_details, created_at)
                 VALUES ('s1', 'SY_CTR', 1234567, 'a', 'b', 30, 0, 0, '{}', '[]', '[]', 'c')",
                [],
            )?;
            conn.execute(
                "UPDATE controllers SET is_finalized = 1, summary_id = 's1' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(db.list_stale_controllers(t(11, 0)).await.unwrap().is_empty());
        assert_eq!(db.list_finalized_controllers().await.unwrap().len(), 1);
        assert_eq!(db.finalized_summary_id(id).await.unwrap().as_deref(), Some("s1"));

        let removed = db.archive_controller_sessions("s1", t(11, 0)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.count_archived_controllers("SY_CTR").await.unwrap(), 1);
        assert_eq!(db.list_controller_sessions("SY_CTR", 1234567).await.unwrap().len(), 1);
    }
}
