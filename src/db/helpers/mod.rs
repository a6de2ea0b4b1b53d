use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::{FlightStatus, SampleKind};

/// Fixed-width RFC 3339 at second precision, so stored timestamps compare
/// correctly as text in range queries.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_flight_status(value: &str) -> Result<FlightStatus> {
    match value {
        "Active" => Ok(FlightStatus::Active),
        "Completed" => Ok(FlightStatus::Completed),
        other => Err(anyhow!("unknown flight status {other}")),
    }
}

pub fn parse_sample_kind(value: &str) -> Result<SampleKind> {
    match value {
        "Flight" => Ok(SampleKind::Flight),
        "Controller" => Ok(SampleKind::Controller),
        other => Err(anyhow!("unknown sample kind {other}")),
    }
}

/// `?1, ?2, ...` placeholder list for dynamically sized IN clauses.
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
