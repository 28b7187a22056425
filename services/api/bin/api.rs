//! Main Entrypoint for the Prescreen API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Constructing the shared state, including both connection registries.
//! 4. Spawning the liveness sweeper.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use prescreen_api::{
    config::Config,
    db::Db,
    router::create_router,
    state::AppState,
    ws::{registry::ConnectionRegistry, sweeper, upstream::UpstreamConnector},
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Arc::new(Config::from_env().context("Failed to load configuration")?);

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(Db::new(pool));
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Build Shared State ---
    let app_state = Arc::new(AppState {
        store: db.clone(),
        db,
        clients: Arc::new(ConnectionRegistry::new()),
        upstream: Arc::new(UpstreamConnector::new(config.clone())),
        config: config.clone(),
    });

    // --- 5. Spawn the Liveness Sweeper ---
    let sweeper_handle = sweeper::spawn(app_state.clone());

    // --- 6. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 7. Start Server ---
    info!(
        model = %config.gemini_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- 8. Tear Down ---
    sweeper_handle.abort();
    for (_, sink) in app_state.clients.drain().await {
        let _ = sink
            .close(
                prescreen_api::ws::relay::CLOSE_NORMAL,
                "server shutting down",
            )
            .await;
    }
    app_state.upstream.close_all().await;

    info!("Server has shut down.");
    Ok(())
}
