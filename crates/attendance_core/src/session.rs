//! crates/attendance_core/src/session.rs
//!
//! The per-operator attendance session: the held roster, both teacher
//! structures, and the student ledger, owned in one value and passed
//! explicitly to every operation.

use crate::domain::{AttendanceStatus, TeacherAttendanceRecord, TeacherStatusEntry};
use crate::ledger::{StudentLedger, TeacherScanLog, TeacherStatusMap};
use crate::ports::{within, Clock, PortError, RosterService};
use crate::scan::{process_scan, ScanContext, ScanError, ScanOutcome, TeacherScanPolicy};
use crate::sync::{sync, RosterState, SyncError, SyncSummary};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings that stay fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub teacher_policy: TeacherScanPolicy,
    /// Deadline applied to every remote call.
    pub request_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            teacher_policy: TeacherScanPolicy::LocalOnly,
            request_timeout: Duration::from_secs(15),
        }
    }
}

pub struct AttendanceSession {
    remote: Arc<dyn RosterService>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    roster: RosterState,
    students: StudentLedger,
    teacher_log: TeacherScanLog,
    teacher_status: TeacherStatusMap,
}

impl AttendanceSession {
    pub fn new(remote: Arc<dyn RosterService>, clock: Arc<dyn Clock>, settings: SessionSettings) -> Self {
        Self {
            remote,
            clock,
            settings,
            roster: RosterState::default(),
            students: StudentLedger::new(),
            teacher_log: TeacherScanLog::new(),
            teacher_status: TeacherStatusMap::new(),
        }
    }

    /// Fetches the roster and replaces the held collections. On failure the
    /// previously held roster stays in place and remains usable for scanning.
    pub async fn sync(&mut self, sync_key: Option<&str>) -> Result<SyncSummary, SyncError> {
        let snapshot = sync(self.remote.as_ref(), sync_key, self.settings.request_timeout).await?;
        Ok(self.roster.apply(snapshot, self.clock.now().with_timezone(&Utc)))
    }

    pub async fn scan(&mut self, decoded_text: &str, sync_key: Option<&str>) -> Result<ScanOutcome, ScanError> {
        let ctx = ScanContext {
            index: self.roster.index(),
            students: &mut self.students,
            teacher_log: &mut self.teacher_log,
            teacher_status: &mut self.teacher_status,
            remote: self.remote.as_ref(),
            sync_key,
            policy: self.settings.teacher_policy,
            timeout: self.settings.request_timeout,
        };
        process_scan(decoded_text, self.clock.now(), ctx).await
    }

    /// Manual edit from the end-of-day grid.
    pub fn set_teacher_status(
        &mut self,
        teacher_id: &str,
        status: AttendanceStatus,
        comment: &str,
    ) -> Result<TeacherStatusEntry, ScanError> {
        if self.roster.index().teacher(teacher_id).is_none() {
            return Err(ScanError::NotFound(teacher_id.to_string()));
        }
        self.teacher_status.upsert(teacher_id, status, comment);
        Ok(self.teacher_status.get_or_default(teacher_id))
    }

    /// The full roster projected for submission; untouched teachers default to present.
    pub fn teacher_submission(&self, date: NaiveDate) -> Vec<TeacherAttendanceRecord> {
        self.teacher_status.to_submission_list(self.roster.teachers(), date)
    }

    /// Sends the projected list for `date` in one request.
    pub async fn submit_teachers(
        &self,
        sync_key: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<TeacherAttendanceRecord>, PortError> {
        let key = sync_key.ok_or(PortError::Unauthorized)?;
        let records = self.teacher_submission(date);
        within(
            self.settings.request_timeout,
            self.remote.submit_teacher_attendance(key, &records),
        )
        .await?;
        info!("Submitted attendance for {} teachers on {}", records.len(), date);
        Ok(records)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    pub fn roster(&self) -> &RosterState {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut RosterState {
        &mut self.roster
    }

    pub fn students(&self) -> &StudentLedger {
        &self.students
    }

    pub fn teacher_log(&self) -> &TeacherScanLog {
        &self.teacher_log
    }

    pub fn teacher_status(&self) -> &TeacherStatusMap {
        &self.teacher_status
    }

    /// Logout: drops both ledgers and the status map.
    pub fn clear(&mut self) {
        self.students.clear();
        self.teacher_log.clear();
        self.teacher_status.clear();
    }
}
