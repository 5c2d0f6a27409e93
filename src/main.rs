use api_rest::{AppState, ServerSettings, build_router};
use api_shared::HealthService;
use opencare_core::store::SCHEMA_VERSION;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the OpenCare application
///
/// Opens (and migrates) the database, checks that it answers, then serves the REST API until
/// Ctrl-C.
///
/// # Environment Variables
/// - `OPENCARE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `OPENCARE_DATABASE_PATH`: SQLite database file (default: "opencare.db")
/// - `OPENCARE_BUSY_TIMEOUT_MS`: how long a write waits for the database lock (default: 5000)
/// - `OPENCARE_PAGE_SIZE` / `OPENCARE_MAX_PAGE_SIZE`: list paging (default: 20 / 100)
/// - `OPENCARE_TOKEN_SECRET`: token signing secret, at least 32 bytes (required)
/// - `OPENCARE_ACCESS_TTL_SECS` / `OPENCARE_REFRESH_TTL_SECS`: token lifetimes
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opencare_run=info".parse()?)
                .add_directive("opencare_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env()?;
    let state = AppState::open(settings.core, settings.auth)?;

    let health = HealthService::new().check_store(&state.db);
    if !health.is_ok() {
        anyhow::bail!("database {} is not usable", state.db.path().display());
    }
    tracing::info!(
        "-- Database {} ready (schema v{})",
        state.db.path().display(),
        SCHEMA_VERSION
    );

    let app = build_router(state);
    tracing::info!("-- Starting OpenCare REST API on {}", settings.addr);
    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- OpenCare stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
}
