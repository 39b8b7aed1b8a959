//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::{AppState, CurrentUser};
use attendance_core::{PortError, User};

/// Reads the auth session id from the `session` cookie.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Resolves the operator behind an auth session id. A session the store
/// rejects has ended, so its attendance desk is closed as well.
pub async fn resolve_session(state: &AppState, auth_session_id: &str) -> Result<User, StatusCode> {
    match state.accounts.validate_auth_session(auth_session_id).await {
        Ok(user) => Ok(user),
        Err(PortError::Unauthorized) => {
            state.desks.close(auth_session_id).await;
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            warn!("Rejected auth session: {:?}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Middleware that validates the auth session cookie and resolves the operator.
///
/// If valid, inserts a `CurrentUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Parse session ID from cookie
    let auth_session_id = session_cookie(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Validate auth session in database
    let user = resolve_session(&state, &auth_session_id).await?;

    // 3. Insert the operator into request extensions
    req.extensions_mut().insert(CurrentUser {
        user,
        auth_session_id,
    });

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
