//! Controller session lifecycle: completion detection, reconnection merge,
//! aggregation and the summary-then-archive persistence order.
//!
//! Raw rows move `Active -> CompletionEligible -> Finalizing -> Archived`.
//! The summary insert and the `is_finalized` flag on the raw rows commit in
//! one transaction; archival runs afterwards and is keyed on the summary id,
//! so a crash between the two steps is completed by the next sweep.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};

use crate::db::{models::ControllerSummary, Database};
use crate::errors::{EngineError, Result};
use crate::interactions::InteractionDetector;
use crate::sessions::{
    aggregate::aggregate_session,
    merge::{merge_reconnections, MergedSession},
};
use crate::settings::EngineConfig;
use crate::{log_debug, log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub summarized: usize,
    /// Groups that found their summary already committed by an earlier run.
    pub resumed: usize,
    pub archived: usize,
    /// Groups with a member still inside the completion threshold.
    pub waiting: usize,
    pub failed: usize,
    pub pruned_samples: usize,
}

/// Outcome of finalizing one merged session.
#[derive(Debug, Clone, PartialEq)]
pub enum Finalized {
    Summarized(ControllerSummary),
    Resumed { summary_id: String },
}

/// Removes the callsign from the in-flight set when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    callsign: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.callsign);
    }
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    detector: InteractionDetector,
    config: Arc<EngineConfig>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SessionManager {
    pub fn new(db: Database, detector: InteractionDetector, config: Arc<EngineConfig>) -> Self {
        Self {
            db,
            detector,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn acquire(&self, callsign: &str) -> Result<InFlightGuard> {
        let mut set = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(callsign.to_string()) {
            return Err(EngineError::ConcurrencyViolation(callsign.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            callsign: callsign.to_string(),
        })
    }

    /// One controller sweep at `now`.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport {
            archived: self.recover_unarchived(now).await,
            ..SweepReport::default()
        };

        let cutoff = now - self.config.completion_threshold();
        let stale = self
            .db
            .list_stale_controllers(cutoff)
            .await
            .map_err(EngineError::Persistence)?;

        let identities: BTreeSet<(String, i64)> =
            stale.into_iter().map(|s| (s.callsign, s.cid)).collect();
        log_debug!(
            "Controller sweep: {} identities past the completion threshold",
            identities.len()
        );

        for (callsign, cid) in identities {
            let sessions = match self.db.list_controller_sessions(&callsign, cid).await {
                Ok(sessions) => sessions,
                Err(err) => {
                    log_error!("Failed to load sessions for {callsign}: {err:#}");
                    report.failed += 1;
                    continue;
                }
            };
            let pending: Vec<_> = sessions.into_iter().filter(|s| !s.is_finalized).collect();

            for group in merge_reconnections(pending, self.config.reconnection_threshold()) {
                if !group.is_completion_eligible(now, self.config.completion_threshold()) {
                    report.waiting += 1;
                    continue;
                }
                match self.finalize(&group, now).await {
                    Ok(Finalized::Summarized(summary)) => {
                        log_info!(
                            "Summarized {} ({} - {}): {} aircraft, peak {}",
                            summary.callsign,
                            summary.session_start,
                            summary.session_end,
                            summary.total_aircraft,
                            summary.peak_aircraft
                        );
                        report.summarized += 1;
                        report.archived += group.members.len();
                    }
                    Ok(Finalized::Resumed { summary_id }) => {
                        log_info!("Completed archival of {callsign} under summary {summary_id}");
                        report.resumed += 1;
                        report.archived += group.members.len();
                    }
                    Err(err) => {
                        let retry = if err.is_retryable() { ", will retry" } else { "" };
                        log_error!("Failed to finalize {callsign}{retry}: {err}");
                        report.failed += 1;
                    }
                }
            }
        }

        match self
            .db
            .prune_transceivers(now - self.config.transceiver_retention())
            .await
        {
            Ok(pruned) => report.pruned_samples = pruned,
            Err(err) => log_warn!("Failed to prune transceivers: {err:#}"),
        }

        Ok(report)
    }

    /// Summarizes and archives one merged session.
    ///
    /// The raw rows are only touched after the summary commit succeeded. A
    /// failing archive step is logged and left to the next sweep's recovery.
    pub async fn finalize(&self, group: &MergedSession, now: DateTime<Utc>) -> Result<Finalized> {
        let _guard = self.acquire(&group.callsign)?;
        let raw_ids = group.raw_ids();

        let existing = self
            .db
            .get_controller_summary(&group.callsign, group.cid, group.session_start)
            .await
            .map_err(EngineError::Persistence)?;

        let outcome = match existing {
            Some(summary) => {
                self.db
                    .attach_to_summary(&summary.id, &raw_ids)
                    .await
                    .map_err(EngineError::Persistence)?;
                Finalized::Resumed { summary_id: summary.id }
            }
            None => {
                let matches = self
                    .detector
                    .try_detect_controller_flight_interactions(
                        &group.callsign,
                        group.session_start,
                        group.session_end,
                    )
                    .await?;
                let summary = aggregate_session(group, &matches, now);
                self.db
                    .commit_controller_summary(&summary, &raw_ids)
                    .await
                    .map_err(EngineError::Persistence)?;
                Finalized::Summarized(summary)
            }
        };

        let summary_id = match &outcome {
            Finalized::Summarized(summary) => summary.id.as_str(),
            Finalized::Resumed { summary_id } => summary_id.as_str(),
        };
        if let Err(err) = self.db.archive_controller_sessions(summary_id, now).await {
            log_warn!(
                "Summary {summary_id} committed but archiving {} failed: {err:#}",
                group.callsign
            );
        }

        Ok(outcome)
    }

    /// Archives raw rows that are already covered by a committed summary.
    async fn recover_unarchived(&self, now: DateTime<Utc>) -> usize {
        let finalized = match self.db.list_finalized_controllers().await {
            Ok(rows) => rows,
            Err(err) => {
                log_error!("Failed to list finalized controller rows: {err:#}");
                return 0;
            }
        };

        let mut summary_ids = BTreeSet::new();
        for row in &finalized {
            match self.db.finalized_summary_id(row.id).await {
                Ok(Some(id)) => {
                    summary_ids.insert(id);
                }
                Ok(None) => {
                    log_warn!("Finalized row {} for {} has no summary id", row.id, row.callsign)
                }
                Err(err) => log_error!("Failed to read summary id of row {}: {err:#}", row.id),
            }
        }

        let mut archived = 0;
        for summary_id in summary_ids {
            match self.db.archive_controller_sessions(&summary_id, now).await {
                Ok(count) => {
                    log_info!("Recovered archival of {count} rows for summary {summary_id}");
                    archived += count;
                }
                Err(err) => log_error!("Failed to archive rows of summary {summary_id}: {err:#}"),
            }
        }
        archived
    }
}
