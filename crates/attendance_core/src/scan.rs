//! crates/attendance_core/src/scan.rs
//!
//! Interprets decoded QR payloads and reconciles them against the roster and
//! the session ledgers.
//!
//! The two person kinds check their preconditions in different orders:
//! students are checked for a duplicate before roster membership, teachers for
//! roster membership before a duplicate. Both orderings are part of the
//! contract because they decide which message the operator sees when a badge
//! is both unknown and already scanned.

use crate::domain::{
    AttendanceStatus, PersonKind, ScanEvent, StudentAttendanceRecord, StudentMark,
    TeacherAttendanceRecord, TeacherScanRecord,
};
use crate::ledger::{StudentLedger, TeacherScanLog, TeacherStatusMap};
use crate::ports::{within, RosterService};
use crate::roster::RosterIndex;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

//=========================================================================================
// Errors and outcomes
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid QR code format")]
    InvalidFormat,
    #[error("ID {0} was not found in the current roster. Please sync data and try again.")]
    NotFound(String),
    #[error("{0} has already been marked present")]
    Duplicate(String),
    #[error("Failed to upload attendance: {0}")]
    UploadFailed(String),
}

/// What a successful scan produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanOutcome {
    Student(StudentAttendanceRecord),
    Teacher(TeacherScanRecord),
}

impl ScanOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Student(record) => &record.name,
            Self::Teacher(record) => &record.teacher_name,
        }
    }
}

/// Whether a teacher scan is written to the remote store immediately, or only
/// recorded locally until the end-of-day submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeacherScanPolicy {
    #[default]
    LocalOnly,
    WriteThrough,
}

impl std::str::FromStr for TeacherScanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local-only" | "local" => Ok(Self::LocalOnly),
            "write-through" => Ok(Self::WriteThrough),
            other => Err(format!("'{other}' is not a teacher scan policy")),
        }
    }
}

//=========================================================================================
// Payload parsing
//=========================================================================================

#[derive(Deserialize)]
struct QrPayload {
    // Badges printed from numeric roster keys carry a JSON number.
    #[serde(default, deserialize_with = "crate::domain::optional_opaque_id")]
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<PersonKind>,
}

impl ScanEvent {
    /// Parses `{id, name, type?}`. `id` may be a string or a number. A missing
    /// `type` means student; blank or missing `id`/`name` is rejected like
    /// malformed JSON.
    pub fn parse(decoded_text: &str, timestamp: DateTime<Utc>) -> Result<Self, ScanError> {
        let payload: QrPayload = serde_json::from_str(decoded_text).map_err(|e| {
            debug!("Rejected QR payload: {}", e);
            ScanError::InvalidFormat
        })?;

        let id = payload.id.map(|s| s.trim().to_string()).unwrap_or_default();
        let name = payload.name.map(|s| s.trim().to_string()).unwrap_or_default();
        if id.is_empty() || name.is_empty() {
            return Err(ScanError::InvalidFormat);
        }

        Ok(Self {
            id,
            name,
            kind: payload.kind.unwrap_or_default(),
            timestamp,
        })
    }
}

//=========================================================================================
// Processor
//=========================================================================================

/// Everything one scan reads or mutates. Only the ledgers are borrowed mutably;
/// the roster index is never written by a scan.
pub struct ScanContext<'a> {
    pub index: &'a RosterIndex,
    pub students: &'a mut StudentLedger,
    pub teacher_log: &'a mut TeacherScanLog,
    pub teacher_status: &'a mut TeacherStatusMap,
    pub remote: &'a dyn RosterService,
    pub sync_key: Option<&'a str>,
    pub policy: TeacherScanPolicy,
    pub timeout: Duration,
}

/// Processes one decoded QR payload captured at `now`.
///
/// Student scans perform one awaited remote write and only touch the ledger
/// once it succeeds. Teacher scans are local unless the policy is
/// `WriteThrough`. Every rejection leaves all state as it was.
pub async fn process_scan(
    decoded_text: &str,
    now: DateTime<Local>,
    ctx: ScanContext<'_>,
) -> Result<ScanOutcome, ScanError> {
    let event = ScanEvent::parse(decoded_text, now.with_timezone(&Utc))?;

    match event.kind {
        PersonKind::Teacher => process_teacher(event, now, ctx).await,
        PersonKind::Student => process_student(event, ctx).await,
    }
}

async fn process_teacher(
    event: ScanEvent,
    now: DateTime<Local>,
    ctx: ScanContext<'_>,
) -> Result<ScanOutcome, ScanError> {
    if ctx.index.teacher(&event.id).is_none() {
        warn!("Teacher {} is not in the roster", event.id);
        return Err(ScanError::NotFound(event.id));
    }
    if ctx.teacher_log.contains(&event.id) {
        return Err(ScanError::Duplicate(event.name));
    }

    let record = TeacherScanRecord {
        teacher_id: event.id,
        teacher_name: event.name,
        date: now.date_naive(),
        status: AttendanceStatus::Present,
        comment: format!("Scanned at {}", now.format("%-I:%M:%S %p")),
    };

    if ctx.policy == TeacherScanPolicy::WriteThrough {
        let key = ctx
            .sync_key
            .ok_or_else(|| ScanError::UploadFailed("sync key is not configured".to_string()))?;
        let rows = [TeacherAttendanceRecord::from(&record)];
        within(ctx.timeout, ctx.remote.submit_teacher_attendance(key, &rows))
            .await
            .map_err(|e| {
                warn!("Teacher attendance upload for {} failed: {}", record.teacher_id, e);
                ScanError::UploadFailed(e.to_string())
            })?;
    }

    ctx.teacher_status
        .upsert(&record.teacher_id, record.status, record.comment.clone());
    ctx.teacher_log.append(record.clone());
    info!("Teacher {} marked present", record.teacher_id);
    Ok(ScanOutcome::Teacher(record))
}

async fn process_student(event: ScanEvent, ctx: ScanContext<'_>) -> Result<ScanOutcome, ScanError> {
    if ctx.students.contains(&event.id) {
        return Err(ScanError::Duplicate(event.name));
    }
    if ctx.index.student(&event.id).is_none() {
        warn!("Student {} is not in the roster", event.id);
        return Err(ScanError::NotFound(event.id));
    }

    let record = StudentAttendanceRecord {
        id: event.id,
        name: event.name,
        timestamp: event.timestamp,
    };

    let key = ctx
        .sync_key
        .ok_or_else(|| ScanError::UploadFailed("sync key is not configured".to_string()))?;
    let marks = [StudentMark::from(&record)];
    within(ctx.timeout, ctx.remote.upload_student_attendance(key, &marks))
        .await
        .map_err(|e| {
            warn!("Student attendance upload for {} failed: {}", record.id, e);
            ScanError::UploadFailed(e.to_string())
        })?;

    ctx.students.append(record.clone());
    info!("Student {} marked present", record.id);
    Ok(ScanOutcome::Student(record))
}
