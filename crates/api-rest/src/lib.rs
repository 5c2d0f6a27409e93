//! # API REST
//!
//! HTTP surface of OpenCare.
//!
//! Contains:
//! - Generic collection handlers for every record family (`routes::collections`)
//! - Bearer-token login and refresh, user password management
//! - List shortcuts, patient import/export and the health check
//! - Error mapping onto HTTP status codes (`error`)
//! - OpenAPI document and Swagger UI
//!
//! All domain rules live in `opencare-core`; handlers decode, authenticate and move the
//! storage call onto the blocking pool.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

pub use config::ServerSettings;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use api_shared::dto::{
    ErrorBody, ImportFailureRes, ImportReq, ImportRes, PageRes, RefreshReq, SetPasswordReq,
    TokenPair, TokenReq,
};
use api_shared::HealthRes;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::obtain_token,
        routes::auth::refresh_token,
        routes::users::create_user,
        routes::users::set_password,
        routes::shortcuts::records_by_patient,
        routes::shortcuts::visits_today,
        routes::shortcuts::health_workers_by_specialization,
        routes::shortcuts::facilities_by_location,
        routes::shortcuts::patients_search,
        routes::shortcuts::inventory_low_stock,
        routes::shortcuts::appointments_upcoming,
        routes::interchange::export_patients,
        routes::interchange::import_patients,
    ),
    components(schemas(
        HealthRes,
        TokenReq,
        RefreshReq,
        TokenPair,
        SetPasswordReq,
        ImportReq,
        ImportRes,
        ImportFailureRes,
        PageRes,
        ErrorBody,
    ))
)]
pub struct ApiDoc;

/// Build the complete application router.
///
/// `/health` and `/api/v1/health` are public; everything else under `/api/v1` requires a
/// bearer access token.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/v1", routes::api_v1())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
