//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the attendance REST endpoints, the JSON
//! payloads they exchange, and the master definition for the OpenAPI specification.

use crate::web::{
    auth::{AuthResponse, LoginRequest, SignupRequest},
    classes::{ClassView, NewClassRequest, SyncKeyRequest, SyncKeyStatus},
    state::{AppState, CurrentUser},
};
use attendance_core::{
    AttendanceStatus, PortError, ScanError, ScanOutcome, Student, StudentAttendanceRecord,
    SyncError, Teacher, TeacherAttendanceRecord, TeacherScanRecord,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        me_handler,
        sync_handler,
        roster_handler,
        scan_handler,
        student_ledger_handler,
        teacher_log_handler,
        teacher_grid_handler,
        update_teacher_status_handler,
        submit_teachers_handler,
        crate::web::classes::list_classes_handler,
        crate::web::classes::create_class_handler,
        crate::web::classes::delete_class_handler,
        crate::web::classes::get_sync_key_handler,
        crate::web::classes::set_sync_key_handler,
    ),
    components(
        schemas(
            ErrorBody, UserView, SignupRequest, LoginRequest, AuthResponse, SyncResponse, RosterResponse,
            StudentView, TeacherView, ClassView, NewClassRequest, ScanRequest, ScanResponse,
            StudentRecordView, TeacherScanView, TeacherGridRow, StatusView, TeacherStatusUpdate,
            SubmitRequest, SubmitResponse, SyncKeyRequest, SyncKeyStatus,
        )
    ),
    tags(
        (name = "Attendance Desk API", description = "QR attendance, roster sync and teacher submissions.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error responses
//=========================================================================================

/// Every failure is reported as `{ "error": kind, "message": text }`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub type ApiFailure = (StatusCode, Json<ErrorBody>);
pub type HandlerResult<T> = Result<T, ApiFailure>;

pub fn failure(status: StatusCode, kind: &str, message: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ErrorBody {
            error: kind.to_string(),
            message: message.into(),
        }),
    )
}

/// The HTTP status and error kind of a rejected scan, shared by REST and the scanner socket.
pub fn scan_error_kind(err: &ScanError) -> (StatusCode, &'static str) {
    match err {
        ScanError::InvalidFormat => (StatusCode::BAD_REQUEST, "invalid_format"),
        ScanError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
        ScanError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ScanError::UploadFailed(_) => (StatusCode::BAD_GATEWAY, "upload_failed"),
    }
}

pub fn scan_failure(err: &ScanError) -> ApiFailure {
    let (status, kind) = scan_error_kind(err);
    failure(status, kind, err.to_string())
}

pub fn sync_failure(err: &SyncError) -> ApiFailure {
    let (status, kind) = match err {
        SyncError::NetworkError(_) => (StatusCode::BAD_GATEWAY, "network_error"),
        SyncError::AuthError(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
        SyncError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
    };
    failure(status, kind, err.to_string())
}

/// Maps a failure of a remote roster call.
pub fn remote_failure(err: &PortError) -> ApiFailure {
    let (status, kind) = match err {
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "auth_error"),
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        PortError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        PortError::Timeout(_) | PortError::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
        PortError::Malformed(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
        PortError::Unexpected(_) => (StatusCode::BAD_GATEWAY, "upload_failed"),
    };
    failure(status, kind, err.to_string())
}

pub fn internal_failure(err: &PortError) -> ApiFailure {
    error!("Account store failure: {:?}", err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal server error")
}

/// A request raced a logout and reached a desk that is already closed.
pub fn session_ended() -> ApiFailure {
    failure(
        StatusCode::UNAUTHORIZED,
        "session_ended",
        "This session has ended. Please sign in again.",
    )
}

pub fn require_superuser(current: &CurrentUser) -> HandlerResult<()> {
    match current.user.role {
        attendance_core::Role::Superuser => Ok(()),
        attendance_core::Role::User => Err(failure(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Only a superuser can do this",
        )),
    }
}

/// The persisted secret key, if one has been configured.
pub async fn load_sync_key(state: &AppState) -> HandlerResult<Option<String>> {
    state
        .accounts
        .get_sync_key()
        .await
        .map_err(|e| internal_failure(&e))
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    pub students: usize,
    pub teachers: usize,
    pub classes: usize,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentView {
    pub student_id: String,
    pub student_name: String,
    pub class: Option<String>,
}

impl From<&Student> for StudentView {
    fn from(s: &Student) -> Self {
        Self {
            student_id: s.student_id.clone(),
            student_name: s.student_name.clone(),
            class: s.class.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TeacherView {
    pub id: String,
    pub name: String,
    pub subject: Option<String>,
}

impl From<&Teacher> for TeacherView {
    fn from(t: &Teacher) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            subject: t.subject.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RosterResponse {
    pub students: Vec<StudentView>,
    pub teachers: Vec<TeacherView>,
    pub classes: Vec<ClassView>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// True while a sync is running; scans wait for it to finish.
    pub syncing: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// The text decoded from the QR badge.
    pub decoded_text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanResponse {
    /// `student` or `teacher`.
    pub kind: String,
    pub id: String,
    pub name: String,
    pub message: String,
}

impl From<&ScanOutcome> for ScanResponse {
    fn from(outcome: &ScanOutcome) -> Self {
        let (kind, id) = match outcome {
            ScanOutcome::Student(record) => ("student", record.id.clone()),
            ScanOutcome::Teacher(record) => ("teacher", record.teacher_id.clone()),
        };
        Self {
            kind: kind.to_string(),
            id,
            name: outcome.name().to_string(),
            message: format!("Welcome, {}!", outcome.name()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentRecordView {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&StudentAttendanceRecord> for StudentRecordView {
    fn from(r: &StudentAttendanceRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            timestamp: r.timestamp,
        }
    }
}

/// Teacher attendance status as shown in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum StatusView {
    Present,
    Absent,
    Late,
    #[serde(rename = "Half Day")]
    HalfDay,
}

impl From<AttendanceStatus> for StatusView {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Present => Self::Present,
            AttendanceStatus::Absent => Self::Absent,
            AttendanceStatus::Late => Self::Late,
            AttendanceStatus::HalfDay => Self::HalfDay,
        }
    }
}

impl From<StatusView> for AttendanceStatus {
    fn from(status: StatusView) -> Self {
        match status {
            StatusView::Present => Self::Present,
            StatusView::Absent => Self::Absent,
            StatusView::Late => Self::Late,
            StatusView::HalfDay => Self::HalfDay,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherScanView {
    pub teacher_id: String,
    pub teacher_name: String,
    pub date: NaiveDate,
    pub status: StatusView,
    pub comment: String,
}

impl From<&TeacherScanRecord> for TeacherScanView {
    fn from(r: &TeacherScanRecord) -> Self {
        Self {
            teacher_id: r.teacher_id.clone(),
            teacher_name: r.teacher_name.clone(),
            date: r.date,
            status: r.status.into(),
            comment: r.comment.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherGridRow {
    pub teacher_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub status: StatusView,
    pub comment: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GridQuery {
    /// ISO date; defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TeacherStatusUpdate {
    pub status: StatusView,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// ISO date; defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub date: NaiveDate,
    pub submitted: usize,
}

fn grid_rows(teachers: &[Teacher], records: Vec<TeacherAttendanceRecord>) -> Vec<TeacherGridRow> {
    teachers
        .iter()
        .zip(records)
        .map(|(teacher, record)| TeacherGridRow {
            teacher_id: record.teacher_id,
            name: teacher.name.clone(),
            date: record.date,
            status: record.status.into(),
            comment: record.comment,
        })
        .collect()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The signed-in operator.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current operator", body = UserView),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(Extension(current): Extension<CurrentUser>) -> Json<UserView> {
    Json(UserView {
        email: current.user.email,
        role: current.user.role.as_str().to_string(),
    })
}

/// Replace the held roster with a fresh copy from the remote source.
///
/// On failure the previously held roster is kept and stays usable for scanning.
#[utoipa::path(
    post,
    path = "/sync",
    responses(
        (status = 200, description = "Roster replaced", body = SyncResponse),
        (status = 401, description = "Missing or rejected sync key", body = ErrorBody),
        (status = 502, description = "Remote source unreachable or malformed", body = ErrorBody)
    )
)]
pub async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> HandlerResult<Json<SyncResponse>> {
    let key = load_sync_key(&state).await?;
    let desk = state.desk_for(&current).await;
    let summary = desk.sync(key.as_deref()).await.map_err(|e| {
        warn!("Sync for {} failed: {}", current.user.email, e);
        sync_failure(&e)
    })?;
    info!("Sync for {} complete", current.user.email);
    Ok(Json(SyncResponse {
        students: summary.students,
        teachers: summary.teachers,
        classes: summary.classes,
        synced_at: summary.synced_at,
    }))
}

/// The roster currently held by this desk.
#[utoipa::path(
    get,
    path = "/roster",
    responses((status = 200, description = "Held roster", body = RosterResponse))
)]
pub async fn roster_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Json<RosterResponse> {
    let desk = state.desk_for(&current).await;
    let syncing = desk.is_syncing();
    let session = desk.lock().await;
    let roster = session.roster();
    Json(RosterResponse {
        students: roster.students().iter().map(StudentView::from).collect(),
        teachers: roster.teachers().iter().map(TeacherView::from).collect(),
        classes: roster.classes().iter().map(ClassView::from).collect(),
        last_synced_at: roster.last_synced_at(),
        syncing,
    })
}

/// Mark a person present from a decoded QR payload.
#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Marked present", body = ScanResponse),
        (status = 400, description = "Invalid QR code format", body = ErrorBody),
        (status = 404, description = "Not in the current roster; sync and retry", body = ErrorBody),
        (status = 409, description = "Already marked present", body = ErrorBody),
        (status = 502, description = "Upload failed; scan again to retry", body = ErrorBody)
    )
)]
pub async fn scan_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ScanRequest>,
) -> HandlerResult<Json<ScanResponse>> {
    let key = load_sync_key(&state).await?;
    let desk = state.desk_for(&current).await;
    let outcome = desk
        .lock_open()
        .await
        .ok_or_else(session_ended)?
        .scan(&req.decoded_text, key.as_deref())
        .await
        .map_err(|e| scan_failure(&e))?;
    Ok(Json(ScanResponse::from(&outcome)))
}

/// Confirmed student scans for this session, newest first.
#[utoipa::path(
    get,
    path = "/attendance/students",
    responses((status = 200, description = "Student ledger", body = Vec<StudentRecordView>))
)]
pub async fn student_ledger_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Json<Vec<StudentRecordView>> {
    let desk = state.desk_for(&current).await;
    let session = desk.lock().await;
    Json(session.students().records().iter().map(StudentRecordView::from).collect())
}

/// Teacher scans for this session, newest first.
#[utoipa::path(
    get,
    path = "/attendance/teachers/log",
    responses((status = 200, description = "Teacher scan log", body = Vec<TeacherScanView>))
)]
pub async fn teacher_log_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Json<Vec<TeacherScanView>> {
    let desk = state.desk_for(&current).await;
    let session = desk.lock().await;
    Json(session.teacher_log().records().iter().map(TeacherScanView::from).collect())
}

/// The manual attendance grid: every teacher in the roster, defaults included.
#[utoipa::path(
    get,
    path = "/attendance/teachers",
    params(GridQuery),
    responses((status = 200, description = "One row per teacher", body = Vec<TeacherGridRow>))
)]
pub async fn teacher_grid_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<GridQuery>,
) -> Json<Vec<TeacherGridRow>> {
    let desk = state.desk_for(&current).await;
    let session = desk.lock().await;
    let date = query.date.unwrap_or_else(|| session.today());
    let records = session.teacher_submission(date);
    Json(grid_rows(session.roster().teachers(), records))
}

/// Set one teacher's status and comment in the draft.
#[utoipa::path(
    put,
    path = "/attendance/teachers/{id}",
    params(("id" = String, Path, description = "Teacher id")),
    request_body = TeacherStatusUpdate,
    responses(
        (status = 200, description = "Updated row", body = TeacherGridRow),
        (status = 404, description = "Teacher is not in the current roster", body = ErrorBody)
    )
)]
pub async fn update_teacher_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(teacher_id): Path<String>,
    Json(req): Json<TeacherStatusUpdate>,
) -> HandlerResult<Json<TeacherGridRow>> {
    let desk = state.desk_for(&current).await;
    let mut session = desk.lock_open().await.ok_or_else(session_ended)?;
    let entry = session
        .set_teacher_status(&teacher_id, req.status.into(), &req.comment)
        .map_err(|e| scan_failure(&e))?;
    let name = session
        .roster()
        .index()
        .teacher(&teacher_id)
        .map(|t| t.name.clone())
        .unwrap_or_default();
    Ok(Json(TeacherGridRow {
        teacher_id,
        name,
        date: session.today(),
        status: entry.status.into(),
        comment: entry.comment,
    }))
}

/// Submit the whole grid for a date in one request.
#[utoipa::path(
    post,
    path = "/attendance/teachers/submit",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Submitted", body = SubmitResponse),
        (status = 401, description = "Missing or rejected sync key", body = ErrorBody),
        (status = 502, description = "Remote write failed", body = ErrorBody)
    )
)]
pub async fn submit_teachers_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<SubmitRequest>,
) -> HandlerResult<Json<SubmitResponse>> {
    let key = load_sync_key(&state).await?;
    let desk = state.desk_for(&current).await;
    let session = desk.lock_open().await.ok_or_else(session_ended)?;
    let date = req.date.unwrap_or_else(|| session.today());
    let records = session
        .submit_teachers(key.as_deref(), date)
        .await
        .map_err(|e| {
            warn!("Teacher submission for {} failed: {}", date, e);
            remote_failure(&e)
        })?;
    Ok(Json(SubmitResponse {
        date,
        submitted: records.len(),
    }))
}
