use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::db::models::ControllerSession;

/// One logical controller session built from one or more raw sessions that
/// were reconnections of each other.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSession {
    pub callsign: String,
    pub cid: i64,
    pub name: Option<String>,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub members: Vec<ControllerSession>,
}

impl MergedSession {
    fn start(session: ControllerSession) -> Self {
        Self {
            callsign: session.callsign.clone(),
            cid: session.cid,
            name: session.name.clone(),
            session_start: session.logon_time,
            session_end: session.last_seen.max(session.logon_time),
            members: vec![session],
        }
    }

    fn absorb(&mut self, session: ControllerSession) {
        self.session_start = self.session_start.min(session.logon_time);
        self.session_end = self.session_end.max(session.last_seen);
        if session.name.is_some() {
            self.name = session.name.clone();
        }
        self.members.push(session);
    }

    pub fn raw_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.session_end - self.session_start).num_minutes()
    }

    /// Only a group whose every member has gone quiet may be finalized; a
    /// member still being seen means the controller may reconnect again.
    pub fn is_completion_eligible(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.members
            .iter()
            .all(|m| m.is_completion_eligible(now, threshold))
    }
}

/// Chains raw sessions of the same callsign and cid whose logon falls within
/// `threshold` after the previous session's last sighting.
///
/// Input order does not matter. Output is ordered by callsign, cid, start.
pub fn merge_reconnections(
    sessions: Vec<ControllerSession>,
    threshold: Duration,
) -> Vec<MergedSession> {
    let mut by_identity: BTreeMap<(String, i64), Vec<ControllerSession>> = BTreeMap::new();
    for session in sessions {
        by_identity
            .entry((session.callsign.clone(), session.cid))
            .or_default()
            .push(session);
    }

    let mut merged = Vec::new();
    for (_, mut group) in by_identity {
        group.sort_by_key(|s| (s.logon_time, s.id));

        let mut current: Option<MergedSession> = None;
        for session in group {
            current = match current.take() {
                Some(mut open) if session.logon_time - open.session_end <= threshold => {
                    open.absorb(session);
                    Some(open)
                }
                Some(done) => {
                    merged.push(done);
                    Some(MergedSession::start(session))
                }
                None => Some(MergedSession::start(session)),
            };
        }
        if let Some(done) = current {
            merged.push(done);
        }
    }

    merged
}
