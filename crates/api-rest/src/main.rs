//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging against a scratch database. The workspace's main
//! `opencare-run` binary serves the same router.

use api_rest::{build_router, AppState, ServerSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the OpenCare REST API server
///
/// Starts the REST API server on the configured address (default: 0.0.0.0:3000), with
/// OpenAPI/Swagger documentation at `/swagger-ui`.
///
/// # Environment Variables
/// - `OPENCARE_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `OPENCARE_DATABASE_PATH`: SQLite database file (default: "opencare.db")
/// - `OPENCARE_TOKEN_SECRET`: Token signing secret, at least 32 bytes (required)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the database cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env()?;
    tracing::info!("-- Starting OpenCare REST API on {}", settings.addr);

    let state = AppState::open(settings.core, settings.auth)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
