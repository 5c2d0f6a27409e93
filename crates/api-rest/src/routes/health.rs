use crate::error::ApiResult;
use crate::extract::blocking;
use crate::state::AppState;
use api_shared::{HealthRes, HealthService};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are healthy", body = HealthRes),
        (status = 503, description = "Database is unreachable", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Returns the current health status of the OpenCare REST API service, including a
/// database ping. No authentication is required; this endpoint is used for monitoring and
/// load balancer health checks. Also served at `/api/v1/health`.
///
/// # Returns
/// * `Json<HealthRes>` - `200` when healthy, `503` when the store does not answer
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<HealthRes>)> {
    let db = state.db.clone();
    let res = blocking(move || Ok(HealthService::new().check_store(&db))).await?;
    let status = if res.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(res)))
}
