use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, placeholders, to_u32},
    models::{ControllerSummary, FlightContactSummary},
};

const SUMMARY_COLUMNS: &str = "id, callsign, cid, name, session_start_time, session_end_time,
    session_duration_minutes, total_aircraft_handled, peak_aircraft_count,
    hourly_aircraft_breakdown, frequencies_used, aircraft_details, created_at";

const FLIGHT_SUMMARY_COLUMNS: &str = "callsign, departure, arrival, logon_time, end_time,
    total_minutes, contact_minutes, airborne_minutes, airborne_contact_minutes,
    controller_time_percentage, airborne_controller_time_percentage, controllers";

fn row_to_summary(row: &Row) -> Result<ControllerSummary> {
    let session_start: String = row.get("session_start_time")?;
    let session_end: String = row.get("session_end_time")?;
    let created_at: String = row.get("created_at")?;
    let hourly: String = row.get("hourly_aircraft_breakdown")?;
    let frequencies: String = row.get("frequencies_used")?;
    let details: String = row.get("aircraft_details")?;

    Ok(ControllerSummary {
        id: row.get("id")?,
        callsign: row.get("callsign")?,
        cid: row.get("cid")?,
        name: row.get("name")?,
        session_start: parse_datetime(&session_start, "session_start_time")?,
        session_end: parse_datetime(&session_end, "session_end_time")?,
        duration_minutes: row.get("session_duration_minutes")?,
        total_aircraft: to_u32(row.get("total_aircraft_handled")?, "total_aircraft_handled")?,
        peak_aircraft: to_u32(row.get("peak_aircraft_count")?, "peak_aircraft_count")?,
        hourly_breakdown: serde_json::from_str(&hourly)
            .context("failed to decode hourly_aircraft_breakdown")?,
        frequencies_used: serde_json::from_str(&frequencies)
            .context("failed to decode frequencies_used")?,
        aircraft_details: serde_json::from_str(&details)
            .context("failed to decode aircraft_details")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn row_to_flight_summary(row: &Row) -> Result<FlightContactSummary> {
    let logon_time: String = row.get("logon_time")?;
    let end_time: String = row.get("end_time")?;
    let controllers: String = row.get("controllers")?;

    Ok(FlightContactSummary {
        callsign: row.get("callsign")?,
        departure: row.get("departure")?,
        arrival: row.get("arrival")?,
        logon_time: parse_datetime(&logon_time, "logon_time")?,
        end_time: parse_datetime(&end_time, "end_time")?,
        total_minutes: to_u32(row.get("total_minutes")?, "total_minutes")?,
        contact_minutes: to_u32(row.get("contact_minutes")?, "contact_minutes")?,
        airborne_minutes: to_u32(row.get("airborne_minutes")?, "airborne_minutes")?,
        airborne_contact_minutes: to_u32(
            row.get("airborne_contact_minutes")?,
            "airborne_contact_minutes",
        )?,
        controller_time_percentage: row.get("controller_time_percentage")?,
        airborne_controller_time_percentage: row.get("airborne_controller_time_percentage")?,
        controllers: serde_json::from_str(&controllers).context("failed to decode controllers")?,
    })
}

fn mark_finalized(tx: &Transaction<'_>, summary_id: &str, raw_ids: &[i64]) -> Result<usize> {
    if raw_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE controllers SET is_finalized = 1, summary_id = ?1
         WHERE id IN ({})",
        placeholders(2, raw_ids.len())
    );
    let mut values = vec![Value::Text(summary_id.to_string())];
    values.extend(raw_ids.iter().map(|id| Value::Integer(*id)));
    let updated = tx
        .execute(&sql, params_from_iter(values))
        .context("failed to mark controller sessions finalized")?;
    Ok(updated)
}

impl Database {
    /// Writes the summary and marks the raw rows it covers as finalized, in
    /// one transaction. If anything fails the raw rows keep
    /// `is_finalized = 0` and are retried by the next sweep.
    pub async fn commit_controller_summary(
        &self,
        summary: &ControllerSummary,
        raw_ids: &[i64],
    ) -> Result<()> {
        let summary = summary.clone();
        let raw_ids = raw_ids.to_vec();
        self.execute(move |conn| {
            let hourly = serde_json::to_string(&summary.hourly_breakdown)?;
            let frequencies = serde_json::to_string(&summary.frequencies_used)?;
            let details = serde_json::to_string(&summary.aircraft_details)?;

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO controller_summaries (id, callsign, cid, name, session_start_time,
                    session_end_time, session_duration_minutes, total_aircraft_handled,
                    peak_aircraft_count, hourly_aircraft_breakdown, frequencies_used,
                    aircraft_details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    summary.id,
                    summary.callsign,
                    summary.cid,
                    summary.name,
                    format_datetime(&summary.session_start),
                    format_datetime(&summary.session_end),
                    summary.duration_minutes,
                    summary.total_aircraft,
                    summary.peak_aircraft,
                    hourly,
                    frequencies,
                    details,
                    format_datetime(&summary.created_at),
                ],
            )
            .context("failed to insert controller summary")?;

            mark_finalized(&tx, &summary.id, &raw_ids)?;

            tx.commit().context("failed to commit controller summary")?;
            Ok(())
        })
        .await
    }

    /// Marks raw rows as covered by an already committed summary.
    pub async fn attach_to_summary(&self, summary_id: &str, raw_ids: &[i64]) -> Result<usize> {
        let summary_id = summary_id.to_string();
        let raw_ids = raw_ids.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let updated = mark_finalized(&tx, &summary_id, &raw_ids)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    pub async fn get_controller_summary(
        &self,
        callsign: &str,
        cid: i64,
        session_start: DateTime<Utc>,
    ) -> Result<Option<ControllerSummary>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM controller_summaries
                 WHERE callsign = ?1 AND cid = ?2 AND session_start_time = ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![callsign, cid, format_datetime(&session_start)])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_summary(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_controller_summaries(
        &self,
        callsign: &str,
    ) -> Result<Vec<ControllerSummary>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM controller_summaries
                 WHERE callsign = ?1
                 ORDER BY session_start_time"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![callsign])?;
            let mut summaries = Vec::new();
            while let Some(row) = rows.next()? {
                summaries.push(row_to_summary(row)?);
            }
            Ok(summaries)
        })
        .await
    }

    /// Inserts a flight summary. Returns false if one already exists for
    /// the same flight.
    pub async fn insert_flight_summary(
        &self,
        summary: &FlightContactSummary,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        let summary = summary.clone();
        self.execute(move |conn| {
            let controllers = serde_json::to_string(&summary.controllers)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO flight_summaries (callsign, departure, arrival,
                        logon_time, end_time, total_minutes, contact_minutes, airborne_minutes,
                        airborne_contact_minutes, controller_time_percentage,
                        airborne_controller_time_percentage, controllers, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        summary.callsign,
                        summary.departure,
                        summary.arrival,
                        format_datetime(&summary.logon_time),
                        format_datetime(&summary.end_time),
                        summary.total_minutes,
                        summary.contact_minutes,
                        summary.airborne_minutes,
                        summary.airborne_contact_minutes,
                        summary.controller_time_percentage,
                        summary.airborne_controller_time_percentage,
                        controllers,
                        format_datetime(&created_at),
                    ],
                )
                .context("failed to insert flight summary")?;
            Ok(inserted > 0)
        })
        .await
    }

    pub async fn get_flight_summary(
        &self,
        callsign: &str,
        logon_time: DateTime<Utc>,
    ) -> Result<Option<FlightContactSummary>> {
        let callsign = callsign.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {FLIGHT_SUMMARY_COLUMNS} FROM flight_summaries
                 WHERE callsign = ?1 AND logon_time = ?2"
            );
            let summary = conn
                .query_row(&sql, params![callsign, format_datetime(&logon_time)], |row| {
                    Ok(row_to_flight_summary(row))
                })
                .optional()?;
            summary.transpose()
        })
        .await
    }
}
