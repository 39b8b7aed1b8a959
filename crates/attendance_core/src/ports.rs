//! crates/attendance_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the attendance core.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! reconciliation logic independent of the remote roster plugin, the local
//! account store, and the wall clock.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use crate::domain::{
    ClassData, NewClass, RosterSnapshot, StudentMark, TeacherAttendanceRecord, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote roster/attendance plugin. Every call carries the secret sync key.
#[async_trait]
pub trait RosterService: Send + Sync {
    /// `GET /data`. An empty body is a null result and yields an empty snapshot.
    async fn fetch_roster(&self, sync_key: &str) -> PortResult<RosterSnapshot>;

    /// `POST /attendance` with `{students: [...]}`. Upsert per student and date.
    async fn upload_student_attendance(&self, sync_key: &str, marks: &[StudentMark]) -> PortResult<()>;

    /// `POST /attendance` with `{teachers: [...]}`. Upsert per teacher and date.
    async fn submit_teacher_attendance(
        &self,
        sync_key: &str,
        records: &[TeacherAttendanceRecord],
    ) -> PortResult<()>;

    // --- Class CRUD ---
    async fn list_classes(&self, sync_key: &str) -> PortResult<Vec<ClassData>>;

    async fn create_class(&self, sync_key: &str, class: &NewClass) -> PortResult<ClassData>;

    async fn delete_class(&self, sync_key: &str, class_id: &str) -> PortResult<()>;
}

/// Local persistence for operators, their browser sessions, and the sync key.
#[async_trait]
pub trait AccountService: Send + Sync {
    // --- User Management ---
    /// Creates an operator. The first account in an empty store becomes the
    /// superuser; the role is chosen in the same write as the insert.
    async fn create_user(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        email: &str,
        expires_at: DateTime<chrono::Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Secret sync key ---
    async fn get_sync_key(&self) -> PortResult<Option<String>>;

    async fn set_sync_key(&self, key: &str) -> PortResult<()>;
}

/// Source of wall-clock time for scan acceptance.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Runs a port call under an explicit deadline, mapping expiry to `PortError::Timeout`.
pub async fn within<T, F>(limit: std::time::Duration, call: F) -> PortResult<T>
where
    F: std::future::Future<Output = PortResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PortError::Timeout(limit))?
}
