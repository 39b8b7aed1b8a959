//! crates/attendance_core/src/ledger.rs
//!
//! Session-scoped attendance ledgers.
//!
//! The ledgers do not enforce uniqueness themselves: callers check `contains`
//! before `append`, which lets bulk flows build a ledger without per-insert
//! validation. Membership is a linear scan, sized for a classroom session.

use crate::domain::{
    AttendanceStatus, StudentAttendanceRecord, Teacher, TeacherAttendanceRecord, TeacherScanRecord,
    TeacherStatusEntry,
};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};

//=========================================================================================
// Student Attendance Ledger
//=========================================================================================

/// Confirmed student scans, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentLedger {
    records: VecDeque<StudentAttendanceRecord>,
}

impl StudentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from records already in newest-first order.
    pub fn from_records(records: Vec<StudentAttendanceRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn append(&mut self, record: StudentAttendanceRecord) {
        self.records.push_front(record);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn records(&self) -> &VecDeque<StudentAttendanceRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

//=========================================================================================
// Teacher Scan Log
//=========================================================================================

/// Audit trail of teacher QR scans, newest first. Not the source of truth for
/// submission; see [`TeacherStatusMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherScanLog {
    records: VecDeque<TeacherScanRecord>,
}

impl TeacherScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TeacherScanRecord) {
        self.records.push_front(record);
    }

    pub fn contains(&self, teacher_id: &str) -> bool {
        self.records.iter().any(|r| r.teacher_id == teacher_id)
    }

    pub fn records(&self) -> &VecDeque<TeacherScanRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

//=========================================================================================
// Teacher Attendance Status map
//=========================================================================================

/// Current draft of manual teacher attendance. A teacher with no entry is
/// treated as `Present` with an empty comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherStatusMap {
    entries: HashMap<String, TeacherStatusEntry>,
}

impl TeacherStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, teacher_id: &str, status: AttendanceStatus, comment: impl Into<String>) {
        self.entries.insert(
            teacher_id.to_string(),
            TeacherStatusEntry {
                status,
                comment: comment.into(),
            },
        );
    }

    pub fn get(&self, teacher_id: &str) -> Option<&TeacherStatusEntry> {
        self.entries.get(teacher_id)
    }

    /// The explicit entry, or `{Present, ""}`.
    pub fn get_or_default(&self, teacher_id: &str) -> TeacherStatusEntry {
        self.entries.get(teacher_id).cloned().unwrap_or_default()
    }

    /// Projects the full roster into a submission list: one row per teacher,
    /// in roster order, with the default substituted for untouched teachers.
    pub fn to_submission_list(&self, all_teachers: &[Teacher], date: NaiveDate) -> Vec<TeacherAttendanceRecord> {
        all_teachers
            .iter()
            .map(|teacher| {
                let entry = self.get_or_default(&teacher.id);
                TeacherAttendanceRecord {
                    teacher_id: teacher.id.clone(),
                    date,
                    status: entry.status,
                    comment: entry.comment,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
