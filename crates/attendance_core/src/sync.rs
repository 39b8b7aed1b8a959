//! crates/attendance_core/src/sync.rs
//!
//! Full replace-all refresh of the roster from the remote system of record.

use crate::domain::{ClassData, RosterSnapshot, Student, Teacher};
use crate::ports::{within, PortError, RosterService};
use crate::roster::RosterIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Network error while syncing: {0}")]
    NetworkError(String),
    #[error("The sync key was rejected: {0}")]
    AuthError(String),
    #[error("The roster response could not be read: {0}")]
    MalformedResponse(String),
}

impl From<PortError> for SyncError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Network(_) | PortError::Timeout(_) => Self::NetworkError(err.to_string()),
            PortError::Malformed(_) => Self::MalformedResponse(err.to_string()),
            // Every other failure comes back as a non-success HTTP status.
            PortError::Unauthorized
            | PortError::NotFound(_)
            | PortError::Conflict(_)
            | PortError::Unexpected(_) => Self::AuthError(err.to_string()),
        }
    }
}

/// Performs one fetch. Nothing is applied here; see [`RosterState::apply`].
pub async fn sync(
    remote: &dyn RosterService,
    sync_key: Option<&str>,
    timeout: Duration,
) -> Result<RosterSnapshot, SyncError> {
    let key = sync_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| SyncError::AuthError("no sync key is configured".to_string()))?;

    let snapshot = within(timeout, remote.fetch_roster(key)).await.map_err(|e| {
        warn!("Roster sync failed: {}", e);
        SyncError::from(e)
    })?;

    info!(
        "Fetched roster: {} students, {} teachers, {} classes",
        snapshot.students.len(),
        snapshot.teachers.len(),
        snapshot.classes.len()
    );
    Ok(snapshot)
}

/// The roster collections currently held by a session, together with their index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterState {
    snapshot: RosterSnapshot,
    index: RosterIndex,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Counts returned to the operator after a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub students: usize,
    pub teachers: usize,
    pub classes: usize,
    pub synced_at: DateTime<Utc>,
}

impl RosterState {
    /// Replaces all three collections and rebuilds the index in one step.
    pub fn apply(&mut self, snapshot: RosterSnapshot, synced_at: DateTime<Utc>) -> SyncSummary {
        let index = RosterIndex::rebuild(&snapshot.students, &snapshot.teachers);
        let summary = SyncSummary {
            students: snapshot.students.len(),
            teachers: snapshot.teachers.len(),
            classes: snapshot.classes.len(),
            synced_at,
        };
        *self = Self {
            snapshot,
            index,
            last_synced_at: Some(synced_at),
        };
        summary
    }

    pub fn index(&self) -> &RosterIndex {
        &self.index
    }

    pub fn students(&self) -> &[Student] {
        &self.snapshot.students
    }

    pub fn teachers(&self) -> &[Teacher] {
        &self.snapshot.teachers
    }

    pub fn classes(&self) -> &[ClassData] {
        &self.snapshot.classes
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Reflects a class created through the remote API without a full re-sync.
    pub fn upsert_class(&mut self, class: ClassData) {
        match self.snapshot.classes.iter_mut().find(|c| c.id == class.id) {
            Some(existing) => *existing = class,
            None => self.snapshot.classes.push(class),
        }
    }

    pub fn remove_class(&mut self, class_id: &str) {
        self.snapshot.classes.retain(|c| c.id != class_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{student, teacher, Failure, FakeRoster};

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn class(id: &str) -> ClassData {
        ClassData {
            id: id.to_string(),
            class_name: format!("Grade {id}"),
            class_numeric: None,
            class_capacity: Some(30),
            sections: vec!["A".into()],
        }
    }

    #[tokio::test]
    async fn successful_sync_replaces_everything() {
        let remote = FakeRoster::with_roster(vec![student("S1", "Asha")], vec![teacher("T1", "Mrs. Rao")]);
        let mut state = RosterState::default();
        let snapshot = sync(&remote, Some("secret"), TIMEOUT).await.unwrap();
        let summary = state.apply(snapshot, Utc::now());

        assert_eq!((summary.students, summary.teachers, summary.classes), (1, 1, 0));
        assert!(state.index().student("S1").is_some());
        assert!(state.last_synced_at().is_some());

        // A second sync is a full replace, never a merge.
        remote.set_snapshot(RosterSnapshot {
            students: vec![student("S2", "Ben")],
            teachers: vec![],
            classes: vec![class("1")],
        });
        let snapshot = sync(&remote, Some("secret"), TIMEOUT).await.unwrap();
        state.apply(snapshot, Utc::now());
        assert!(state.index().student("S1").is_none());
        assert!(state.index().student("S2").is_some());
        assert!(state.index().teacher("T1").is_none());
        assert_eq!(state.classes().len(), 1);
    }

    #[tokio::test]
    async fn failed_sync_maps_each_failure_kind() {
        let remote = FakeRoster::default();
        let cases = [
            (Failure::Unauthorized, "auth"),
            (Failure::Network, "network"),
            (Failure::Malformed, "malformed"),
            (Failure::Hang, "network"),
        ];
        for (failure, expected) in cases {
            remote.fail_fetch(Some(failure));
            let err = sync(&remote, Some("secret"), TIMEOUT).await.unwrap_err();
            let kind = match err {
                SyncError::AuthError(_) => "auth",
                SyncError::NetworkError(_) => "network",
                SyncError::MalformedResponse(_) => "malformed",
            };
            assert_eq!(kind, expected, "{failure:?}");
        }
    }

    #[tokio::test]
    async fn failed_sync_leaves_prior_state_untouched() {
        let remote = FakeRoster::with_roster(vec![student("S1", "Asha")], vec![teacher("T1", "Mrs. Rao")]);
        let mut state = RosterState::default();
        state.apply(sync(&remote, Some("secret"), TIMEOUT).await.unwrap(), Utc::now());
        let before = state.clone();

        remote.fail_fetch(Some(Failure::Network));
        let result = sync(&remote, Some("secret"), TIMEOUT).await;
        if let Ok(snapshot) = result {
            state.apply(snapshot, Utc::now());
        }
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn missing_key_is_an_auth_error_without_a_request() {
        let remote = FakeRoster::default();
        for key in [None, Some("  ")] {
            let err = sync(&remote, key, TIMEOUT).await.unwrap_err();
            assert!(matches!(err, SyncError::AuthError(_)));
        }
        assert!(remote.keys_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn class_upsert_and_remove_touch_only_classes() {
        let mut state = RosterState::default();
        state.apply(
            RosterSnapshot {
                students: vec![student("S1", "Asha")],
                teachers: vec![],
                classes: vec![class("1")],
            },
            Utc::now(),
        );
        let mut renamed = class("1");
        renamed.class_name = "Grade 1 (renamed)".into();
        state.upsert_class(renamed);
        state.upsert_class(class("2"));
        assert_eq!(state.classes().len(), 2);
        assert_eq!(state.classes()[0].class_name, "Grade 1 (renamed)");

        state.remove_class("1");
        assert_eq!(state.classes().len(), 1);
        assert_eq!(state.students().len(), 1);
    }
}
