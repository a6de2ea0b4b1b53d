//! Speed-gated sector entry/exit.
//!
//! Per sample:
//! - at or above `ENTRY_SPEED_KT` the candidate is the geographic sector;
//! - below it, or with unknown speed, the candidate is the sector already
//!   open (a slow flight never opens a new one);
//! - each sample below `EXIT_SPEED_KT` bumps the exit counter, faster
//!   samples reset it, unknown speed leaves it alone;
//! - `FORCE_EXIT_SAMPLES` slow samples in a row close the open sector even
//!   though the candidate did not change, and it is not reopened until the
//!   candidate changes.
//!
//! Closes are always emitted before the open that replaces them.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::db::{models::SectorOccupancy, Database, OccupancyWrite};
use crate::errors::{input_error, Result};
use crate::geo::Position;
use crate::occupancy::{
    state::{FlightSectorState, OpenSector, SectorStateStore},
    PositionSample,
};
use crate::sectors::SectorCatalog;
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

pub const ENTRY_SPEED_KT: f64 = 60.0;
pub const EXIT_SPEED_KT: f64 = 30.0;
pub const FORCE_EXIT_SAMPLES: u32 = 2;

/// Writes produced by one ingestion batch plus the samples that were dropped.
#[derive(Debug, Default)]
pub struct TrackerBatch {
    pub writes: Vec<OccupancyWrite>,
    pub skipped: usize,
}

fn close_write(
    callsign: &str,
    open: OpenSector,
    exit_time: DateTime<Utc>,
    exit_pos: Position,
    exit_altitude: Option<i64>,
) -> OccupancyWrite {
    let duration_seconds = (exit_time - open.entry_time).num_seconds().max(0);
    OccupancyWrite::Close {
        callsign: callsign.to_string(),
        sector_name: open.name,
        exit_time,
        exit_pos,
        exit_altitude,
        duration_seconds,
    }
}

/// Advances one flight's state by one sample, appending any writes.
pub fn step(
    catalog: &SectorCatalog,
    state: &mut FlightSectorState,
    sample: &PositionSample,
    writes: &mut Vec<OccupancyWrite>,
) -> Result<()> {
    if !sample.position.is_valid() {
        return Err(input_error!(
            "{} has invalid position {:?}",
            sample.callsign,
            sample.position
        ));
    }
    if let Some(speed) = sample.groundspeed_kt {
        if !speed.is_finite() || speed < 0.0 {
            return Err(input_error!("{} has invalid groundspeed {speed}", sample.callsign));
        }
    }
    if let Some(last) = state.last_timestamp {
        if sample.timestamp < last {
            return Err(input_error!(
                "{} sample at {} is older than {last}",
                sample.callsign,
                sample.timestamp
            ));
        }
    }

    let previous = state.current_sector().map(str::to_string);
    // Between EXIT_SPEED_KT and ENTRY_SPEED_KT an already open sector is
    // held indefinitely (holding patterns, slow climbs); it only ends on a
    // faster sample elsewhere, two slow samples, or the completion signal.
    let candidate = match sample.groundspeed_kt {
        Some(speed) if speed >= ENTRY_SPEED_KT => catalog
            .sector_at(&sample.position)
            .map(|sector| sector.name.clone()),
        _ => previous.clone(),
    };

    match sample.groundspeed_kt {
        Some(speed) if speed < EXIT_SPEED_KT => state.exit_counter += 1,
        Some(_) => state.exit_counter = 0,
        None => {}
    }
    let should_force_exit = state.exit_counter >= FORCE_EXIT_SAMPLES;

    if candidate != previous || should_force_exit {
        let closed = state.current.take().map(|open| {
            let name = open.name.clone();
            writes.push(close_write(
                &sample.callsign,
                open,
                sample.timestamp,
                sample.position,
                sample.altitude_ft,
            ));
            name
        });

        if let Some(name) = candidate {
            if closed.as_deref() != Some(name.as_str()) {
                let open = OpenSector {
                    name,
                    entry_time: sample.timestamp,
                    entry_pos: sample.position,
                    entry_altitude: sample.altitude_ft,
                };
                writes.push(OccupancyWrite::Open(SectorOccupancy {
                    id: None,
                    callsign: sample.callsign.clone(),
                    sector_name: open.name.clone(),
                    entry_time: open.entry_time,
                    exit_time: None,
                    entry_pos: open.entry_pos,
                    exit_pos: None,
                    entry_altitude: open.entry_altitude,
                    exit_altitude: None,
                    duration_seconds: None,
                }));
                state.current = Some(open);
            }
        }
    }

    if sample.groundspeed_kt.is_some() {
        state.last_speed = sample.groundspeed_kt;
    }
    state.last_timestamp = Some(sample.timestamp);
    Ok(())
}

#[derive(Clone)]
pub struct OccupancyTracker {
    catalog: Arc<SectorCatalog>,
    store: Arc<SectorStateStore>,
}

impl OccupancyTracker {
    pub fn new(catalog: Arc<SectorCatalog>, store: Arc<SectorStateStore>) -> Self {
        Self { catalog, store }
    }

    pub fn store(&self) -> &Arc<SectorStateStore> {
        &self.store
    }

    /// Runs a batch through the state machine and persists the resulting
    /// writes in one transaction. Samples are grouped by callsign and
    /// processed in timestamp order; bad samples are skipped.
    ///
    /// Steps run on copies of the touched flights' state. The copies replace
    /// the stored state only once the writes are committed, so a failed
    /// write leaves both the table and the store as they were and the same
    /// samples can be replayed.
    pub async fn process_batch(
        &self,
        db: &Database,
        samples: Vec<PositionSample>,
    ) -> anyhow::Result<TrackerBatch> {
        let mut by_flight: BTreeMap<String, Vec<PositionSample>> = BTreeMap::new();
        for sample in samples {
            by_flight.entry(sample.callsign.clone()).or_default().push(sample);
        }

        let mut batch = TrackerBatch::default();
        let mut flights = self.store.lock().await;
        let mut staged: Vec<(String, FlightSectorState)> = Vec::with_capacity(by_flight.len());

        for (callsign, mut samples) in by_flight {
            samples.sort_by_key(|s| s.timestamp);
            let mut state = flights.get(&callsign).cloned().unwrap_or_default();
            for sample in &samples {
                if let Err(err) = step(&self.catalog, &mut state, sample, &mut batch.writes) {
                    log_warn!("Skipping position sample: {err}");
                    batch.skipped += 1;
                }
            }
            staged.push((callsign, state));
        }

        // the map stays locked until the commit so no other batch sees staged state
        db.apply_occupancy_writes(batch.writes.clone()).await?;
        flights.extend(staged);

        log_debug!(
            "Occupancy batch: {} writes, {} skipped samples",
            batch.writes.len(),
            batch.skipped
        );
        Ok(batch)
    }

    /// Force-closes the flight's open occupancy (if any) and forgets its
    /// state. The state is kept when the close cannot be written.
    pub async fn complete(
        &self,
        db: &Database,
        callsign: &str,
        at: DateTime<Utc>,
        last_position: Option<Position>,
        last_altitude: Option<i64>,
    ) -> anyhow::Result<Option<OccupancyWrite>> {
        let mut flights = self.store.lock().await;
        let close = flights
            .get(callsign)
            .and_then(|state| state.current.clone())
            .map(|open| {
                let exit_pos = last_position.unwrap_or(open.entry_pos);
                let exit_time = at.max(open.entry_time);
                close_write(callsign, open, exit_time, exit_pos, last_altitude)
            });

        if let Some(close) = &close {
            db.apply_occupancy_writes(vec![close.clone()]).await?;
        }
        flights.remove(callsign);
        Ok(close)
    }
}
