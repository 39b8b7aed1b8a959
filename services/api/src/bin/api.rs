//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpRosterAdapter},
    config::Config,
    error::ApiError,
    web::{
        router,
        state::{AppState, DeskRegistry},
        ApiDoc,
    },
};
use attendance_core::SystemClock;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const DESK_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting attendance desk...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Opening database {}", config.database_url);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Remote Roster Adapter ---
    let roster_adapter = Arc::new(HttpRosterAdapter::new(
        &config.roster_api_url,
        config.request_timeout,
    )?);
    info!("Roster source: {}", config.roster_api_url);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        accounts: db_adapter,
        roster: roster_adapter,
        clock: Arc::new(SystemClock),
        config: config.clone(),
        desks: Arc::new(DeskRegistry::default()),
    });

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(router(app_state.clone())?)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
            }
            shutdown.cancel();
        }
    });

    // Desks of sessions that expired without a logout are closed periodically.
    tokio::spawn({
        let shutdown = shutdown.clone();
        let state = app_state.clone();
        async move {
            let mut ticks = tokio::time::interval(DESK_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        let closed = state.desks.sweep(state.accounts.as_ref()).await;
                        if closed > 0 {
                            info!("Closed {} desk(s) of ended sessions", closed);
                        }
                    }
                }
            }
        }
    });

    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
