pub mod auth;
pub mod classes;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary and the router need.
pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use ws_handler::ws_handler;

use crate::error::ApiError;
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the complete API router (without the Swagger UI).
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(rest::me_handler))
        .route("/sync", post(rest::sync_handler))
        .route("/roster", get(rest::roster_handler))
        .route("/scan", post(rest::scan_handler))
        .route("/attendance/students", get(rest::student_ledger_handler))
        .route("/attendance/teachers", get(rest::teacher_grid_handler))
        .route("/attendance/teachers/log", get(rest::teacher_log_handler))
        .route("/attendance/teachers/submit", post(rest::submit_teachers_handler))
        .route("/attendance/teachers/{id}", put(rest::update_teacher_status_handler))
        .route(
            "/classes",
            get(classes::list_classes_handler).post(classes::create_class_handler),
        )
        .route("/classes/{id}", delete(classes::delete_class_handler))
        .route(
            "/settings/sync-key",
            get(classes::get_sync_key_handler).put(classes::set_sync_key_handler),
        )
        .route("/ws/scanner", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), require_auth));

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state))
}
