//! crates/attendance_core/src/domain.rs
//!
//! Defines the core data structures for the attendance desk: the roster as
//! delivered by the remote system of record, and the records the desk produces.
//! Field names on the roster types follow the remote plugin's JSON contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

//=========================================================================================
// Roster (owned by the remote system of record)
//=========================================================================================

/// A student as delivered by the roster source. `student_id` is opaque and unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(deserialize_with = "opaque_id")]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    /// Reference to a `ClassData::id`.
    #[serde(default, deserialize_with = "optional_opaque_id", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// A teacher as delivered by the roster source. `id` is opaque and unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassData {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub class_name: String,
    #[serde(default)]
    pub class_numeric: Option<i64>,
    #[serde(default)]
    pub class_capacity: Option<i64>,
    #[serde(default)]
    pub sections: Vec<String>,
}

/// Payload for creating a class through the remote API. The remote assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClass {
    pub class_name: String,
    #[serde(default)]
    pub class_numeric: Option<i64>,
    #[serde(default)]
    pub class_capacity: Option<i64>,
    #[serde(default)]
    pub sections: Vec<String>,
}

/// The three roster collections returned by one successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub classes: Vec<ClassData>,
}

//=========================================================================================
// Attendance records (produced by this system)
//=========================================================================================

/// Which roster a scanned badge belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    #[default]
    Student,
    Teacher,
}

/// One attendance claim decoded from a QR badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub id: String,
    pub name: String,
    pub kind: PersonKind,
    pub timestamp: DateTime<Utc>,
}

/// A confirmed student scan. Wall-clock capture time, not server time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAttendanceRecord {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// The body item of a student attendance upload: `{id, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentMark {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&StudentAttendanceRecord> for StudentMark {
    fn from(record: &StudentAttendanceRecord) -> Self {
        Self {
            id: record.id.clone(),
            timestamp: record.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
    #[serde(rename = "Half Day")]
    HalfDay,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
            Self::HalfDay => "Half Day",
        };
        f.write_str(label)
    }
}

/// Current draft value of one teacher's manual attendance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherStatusEntry {
    pub status: AttendanceStatus,
    pub comment: String,
}

/// One row of a teacher attendance submission: `{teacherId, date, status, comment}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAttendanceRecord {
    pub teacher_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub comment: String,
}

/// Audit entry for a teacher QR scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherScanRecord {
    pub teacher_id: String,
    pub teacher_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub comment: String,
}

impl From<&TeacherScanRecord> for TeacherAttendanceRecord {
    fn from(record: &TeacherScanRecord) -> Self {
        Self {
            teacher_id: record.teacher_id.clone(),
            date: record.date,
            status: record.status,
            comment: record.comment.clone(),
        }
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superuser,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "superuser" => Some(Self::Superuser),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

// Represents a signed-in operator of the desk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub role: Role,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub email: String,
    pub role: Role,
    pub hashed_password: String,
}

//=========================================================================================
// Serde helpers
//=========================================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

// The roster plugin serialises database keys as numbers in some endpoints.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

pub(crate) fn optional_opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}
