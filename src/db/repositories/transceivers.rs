//! Transceiver sample storage.
//!
//! The `query_*` functions take a borrowed connection instead of going
//! through `Database::execute`, so one detection call can run both of its
//! bounded queries inside a single closure on the single connection.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_sample_kind},
    models::{SampleKind, TransceiverSample},
};
use crate::geo::Position;

const SAMPLE_COLUMNS: &str = "callsign, kind, frequency_hz, timestamp, lat, lon";

fn row_to_sample(row: &Row) -> Result<TransceiverSample> {
    let kind: String = row.get("kind")?;
    let timestamp: String = row.get("timestamp")?;
    let lat: Option<f64> = row.get("lat")?;
    let lon: Option<f64> = row.get("lon")?;

    Ok(TransceiverSample {
        callsign: row.get("callsign")?,
        kind: parse_sample_kind(&kind)?,
        frequency_hz: row.get("frequency_hz")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        position: match (lat, lon) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
            _ => None,
        },
    })
}

fn collect_samples(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<TransceiverSample>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params)?;
    let mut samples = Vec::new();
    while let Some(row) = rows.next()? {
        samples.push(row_to_sample(row)?);
    }
    Ok(samples)
}

/// Samples of one entity within `[start, end]`.
pub fn query_entity_samples(
    conn: &Connection,
    callsign: &str,
    kind: SampleKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TransceiverSample>> {
    let sql = format!(
        "SELECT {SAMPLE_COLUMNS} FROM transceivers
         WHERE callsign = ?1 AND kind = ?2 AND timestamp BETWEEN ?3 AND ?4
         ORDER BY timestamp"
    );
    collect_samples(
        conn,
        &sql,
        params![callsign, kind.as_str(), format_datetime(&start), format_datetime(&end)],
    )
    .with_context(|| format!("failed to load {} samples for {callsign}", kind.as_str()))
}

/// Samples of the opposite kind within `[start, end]`, restricted to
/// frequencies within `tolerance_hz` of one `callsign` itself used within
/// `[own_start, own_end]`. A zero tolerance means the exact frequency.
#[allow(clippy::too_many_arguments)]
pub fn query_counterpart_samples(
    conn: &Connection,
    callsign: &str,
    own_kind: SampleKind,
    own_start: DateTime<Utc>,
    own_end: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tolerance_hz: i64,
) -> Result<Vec<TransceiverSample>> {
    let other_kind = match own_kind {
        SampleKind::Flight => SampleKind::Controller,
        SampleKind::Controller => SampleKind::Flight,
    };
    let sql = format!(
        "SELECT {SAMPLE_COLUMNS} FROM transceivers c
         WHERE c.kind = ?1
           AND c.timestamp BETWEEN ?2 AND ?3
           AND c.callsign <> ?4
           AND EXISTS (
               SELECT 1 FROM transceivers o
               WHERE o.callsign = ?4 AND o.kind = ?5 AND o.timestamp BETWEEN ?6 AND ?7
                 AND ABS(o.frequency_hz - c.frequency_hz) <= ?8
           )
         ORDER BY c.timestamp"
    );
    collect_samples(
        conn,
        &sql,
        params![
            other_kind.as_str(),
            format_datetime(&start),
            format_datetime(&end),
            callsign,
            own_kind.as_str(),
            format_datetime(&own_start),
            format_datetime(&own_end),
            tolerance_hz.max(0),
        ],
    )
    .with_context(|| format!("failed to load counterpart samples for {callsign}"))
}

impl Database {
    pub async fn insert_transceivers(&self, samples: &[TransceiverSample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let records = samples.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO transceivers (callsign, kind, frequency_hz, timestamp, lat, lon)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.callsign,
                        record.kind.as_str(),
                        record.frequency_hz,
                        format_datetime(&record.timestamp),
                        record.position.map(|p| p.lat),
                        record.position.map(|p| p.lon),
                    ])?;
                }
            }
            tx.commit().context("failed to commit transceiver batch")?;
            Ok(records.len())
        })
        .await
    }

    pub async fn load_samples(
        &self,
        callsign: &str,
        kind: SampleKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TransceiverSample>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| query_entity_samples(conn, &callsign, kind, start, end))
            .await
    }

    /// Drops samples older than `before`; returns the number removed.
    pub async fn prune_transceivers(&self, before: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM transceivers WHERE timestamp < ?1",
                    params![format_datetime(&before)],
                )
                .context("failed to prune transceivers")?;
            Ok(removed)
        })
        .await
    }
}
