//! services/api/src/web/classes.rs
//!
//! Class roster CRUD passed through to the remote plugin, and management of
//! the persisted sync key.

use crate::web::{
    rest::{
        failure, internal_failure, load_sync_key, remote_failure, require_superuser, session_ended,
        ErrorBody, HandlerResult,
    },
    state::{AppState, CurrentUser},
};
use attendance_core::{ports::within, ClassData, NewClass};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassView {
    pub id: String,
    pub class_name: String,
    pub class_numeric: Option<i64>,
    pub class_capacity: Option<i64>,
    pub sections: Vec<String>,
}

impl From<&ClassData> for ClassView {
    fn from(c: &ClassData) -> Self {
        Self {
            id: c.id.clone(),
            class_name: c.class_name.clone(),
            class_numeric: c.class_numeric,
            class_capacity: c.class_capacity,
            sections: c.sections.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewClassRequest {
    pub class_name: String,
    pub class_numeric: Option<i64>,
    pub class_capacity: Option<i64>,
    #[serde(default)]
    pub sections: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncKeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncKeyStatus {
    pub configured: bool,
}

/// Resolves the key or fails the request the way the remote would.
async fn required_key(state: &AppState) -> HandlerResult<String> {
    load_sync_key(state).await?.ok_or_else(|| {
        failure(
            StatusCode::UNAUTHORIZED,
            "auth_error",
            "No sync key is configured",
        )
    })
}

/// List classes straight from the remote source.
#[utoipa::path(
    get,
    path = "/classes",
    responses(
        (status = 200, description = "Remote class list", body = Vec<ClassView>),
        (status = 401, description = "Missing or rejected sync key", body = ErrorBody),
        (status = 502, description = "Remote source unreachable", body = ErrorBody)
    )
)]
pub async fn list_classes_handler(State(state): State<Arc<AppState>>) -> HandlerResult<Json<Vec<ClassView>>> {
    let key = required_key(&state).await?;
    let classes = within(state.config.request_timeout, state.roster.list_classes(&key))
        .await
        .map_err(|e| remote_failure(&e))?;
    Ok(Json(classes.iter().map(ClassView::from).collect()))
}

/// Create a class remotely and reflect it into the held roster.
#[utoipa::path(
    post,
    path = "/classes",
    request_body = NewClassRequest,
    responses(
        (status = 201, description = "Class created", body = ClassView),
        (status = 400, description = "Class name is blank", body = ErrorBody),
        (status = 403, description = "Superuser only", body = ErrorBody),
        (status = 502, description = "Remote write failed", body = ErrorBody)
    )
)]
pub async fn create_class_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<NewClassRequest>,
) -> HandlerResult<(StatusCode, Json<ClassView>)> {
    require_superuser(&current)?;
    if req.class_name.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "invalid_request", "Class name is required"));
    }
    let key = required_key(&state).await?;
    let new_class = NewClass {
        class_name: req.class_name.trim().to_string(),
        class_numeric: req.class_numeric,
        class_capacity: req.class_capacity,
        sections: req.sections,
    };

    let desk = state.desk_for(&current).await;
    let mut session = desk.lock_open().await.ok_or_else(session_ended)?;
    let created = within(state.config.request_timeout, state.roster.create_class(&key, &new_class))
        .await
        .map_err(|e| {
            warn!("Creating class '{}' failed: {}", new_class.class_name, e);
            remote_failure(&e)
        })?;
    session.roster_mut().upsert_class(created.clone());
    info!("Created class {} ({})", created.id, created.class_name);
    Ok((StatusCode::CREATED, Json(ClassView::from(&created))))
}

/// Delete a class remotely and drop it from the held roster.
#[utoipa::path(
    delete,
    path = "/classes/{id}",
    params(("id" = String, Path, description = "Class id")),
    responses(
        (status = 204, description = "Class deleted"),
        (status = 403, description = "Superuser only", body = ErrorBody),
        (status = 404, description = "No such class", body = ErrorBody)
    )
)]
pub async fn delete_class_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(class_id): Path<String>,
) -> HandlerResult<StatusCode> {
    require_superuser(&current)?;
    let key = required_key(&state).await?;

    let desk = state.desk_for(&current).await;
    let mut session = desk.lock_open().await.ok_or_else(session_ended)?;
    within(state.config.request_timeout, state.roster.delete_class(&key, &class_id))
        .await
        .map_err(|e| remote_failure(&e))?;
    session.roster_mut().remove_class(&class_id);
    info!("Deleted class {}", class_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Whether a sync key has been stored. The key itself is never returned.
#[utoipa::path(
    get,
    path = "/settings/sync-key",
    responses((status = 200, description = "Key status", body = SyncKeyStatus))
)]
pub async fn get_sync_key_handler(State(state): State<Arc<AppState>>) -> HandlerResult<Json<SyncKeyStatus>> {
    let key = load_sync_key(&state).await?;
    Ok(Json(SyncKeyStatus {
        configured: key.is_some_and(|k| !k.is_empty()),
    }))
}

/// Store the secret key sent with every remote call.
#[utoipa::path(
    put,
    path = "/settings/sync-key",
    request_body = SyncKeyRequest,
    responses(
        (status = 204, description = "Key stored"),
        (status = 400, description = "Key is blank", body = ErrorBody),
        (status = 403, description = "Superuser only", body = ErrorBody)
    )
)]
pub async fn set_sync_key_handler(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<SyncKeyRequest>,
) -> HandlerResult<StatusCode> {
    require_superuser(&current)?;
    let key = req.key.trim();
    if key.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "invalid_request", "Sync key must not be blank"));
    }
    state
        .accounts
        .set_sync_key(key)
        .await
        .map_err(|e| internal_failure(&e))?;
    info!("Sync key updated by {}", current.user.email);
    Ok(StatusCode::NO_CONTENT)
}
