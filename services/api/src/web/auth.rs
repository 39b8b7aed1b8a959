//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for operator signup, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use attendance_core::PortError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use utoipa::ToSchema;
use crate::web::{
    middleware::session_cookie,
    rest::{failure, internal_failure, ErrorBody, HandlerResult},
    state::AppState,
};

const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, Serialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct AuthResponse {
    pub email: String,
    /// `superuser` or `user`.
    pub role: String,
}

fn session_cookie_header(auth_session_id: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    )
}

/// Creates the auth session row and returns the matching cookie.
async fn open_auth_session(state: &AppState, email: &str) -> HandlerResult<String> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .accounts
        .create_auth_session(&auth_session_id, email, expires_at)
        .await
        .map_err(|e| internal_failure(&e))?;
    Ok(session_cookie_header(&auth_session_id))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create an operator account. The first account becomes the superuser.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> HandlerResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') || req.password.len() < 8 {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "A valid email and a password of at least 8 characters are required",
        ));
    }

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Failed to hash password")
        })?
        .to_string();

    // 2. Create the user; the store assigns superuser to the first account
    let user = state
        .accounts
        .create_user(&email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => failure(StatusCode::CONFLICT, "conflict", "Email already registered"),
            other => internal_failure(&other),
        })?;
    info!("Created {} account {}", user.role.as_str(), user.email);

    // 3. Sign the new operator in
    let cookie = open_auth_session(&state, &user.email).await?;
    let response = AuthResponse {
        email: user.email,
        role: user.role.as_str().to_string(),
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HandlerResult<impl IntoResponse> {
    let invalid = || failure(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid email or password");
    let email = req.email.trim().to_lowercase();

    // 1. Get user by email
    let creds = state
        .accounts
        .get_user_by_email(&email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => invalid(),
            other => internal_failure(&other),
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        failure(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Authentication error")
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    // 3. Create the auth session and cookie
    let cookie = open_auth_session(&state, &creds.email).await?;
    info!("{} signed in", creds.email);

    let response = AuthResponse {
        email: creds.email,
        role: creds.role.as_str().to_string(),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout, invalidate the session and clear its attendance desk
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session", body = ErrorBody)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HandlerResult<impl IntoResponse> {
    // 1. Extract session ID from the cookie
    let auth_session_id = session_cookie(&headers)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "unauthorized", "No session found"))?;

    // 2. Delete auth session and drop the desk's ledgers
    state
        .accounts
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| internal_failure(&e))?;
    state.desks.close(auth_session_id).await;

    // 3. Clear cookie
    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}
