//! Named list shortcuts. Each is a fixed filter over a collection listing, so paging,
//! ordering and any further filters in the query string still apply.

use crate::error::ApiResult;
use crate::extract::{AuthUser, QueryPairs};
use crate::routes::collections::page_of;
use crate::state::AppState;
use api_shared::dto::{ErrorBody, PageRes};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use opencare_core::models::appointments::{Appointment, AppointmentStatus};
use opencare_core::models::facilities::FacilityInventory;
use opencare_core::models::patients::{Patient, PatientVisit};
use opencare_core::models::records::HealthRecord;
use opencare_core::models::reference::HealthFacility;
use opencare_core::models::workforce::HealthWorkerProfile;
use opencare_core::query::SEARCH_PARAM;
use opencare_core::repository::today;
use opencare_core::{CoreError, CoreResult, ListQuery};

/// Copy required parameter `from` into filter `to`.
fn require(mut query: ListQuery, from: &str, to: &str) -> CoreResult<ListQuery> {
    let value = query
        .get(from)
        .map(str::to_string)
        .ok_or_else(|| CoreError::field(from, "This parameter is required."))?;
    query.set(to, value);
    Ok(query)
}

#[utoipa::path(
    get,
    path = "/api/v1/records/by_patient",
    params(("patient_id" = String, Query, description = "Patient identifier, for example P-0001")),
    responses(
        (status = 200, description = "Health records of one patient", body = PageRes),
        (status = 400, description = "Missing patient_id", body = ErrorBody)
    )
)]
/// Health records for one patient, looked up by the patient's identifier
#[axum::debug_handler(state = AppState)]
pub async fn records_by_patient(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = require(query.into_list_query(), "patient_id", "patient_identifier")?;
    page_of::<HealthRecord>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/visits/today",
    responses((status = 200, description = "Visits scheduled for today (UTC)", body = PageRes))
)]
/// Visits scheduled for the current UTC date
#[axum::debug_handler(state = AppState)]
pub async fn visits_today(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = query
        .into_list_query()
        .with("scheduled_on", today().format("%Y-%m-%d").to_string());
    page_of::<PatientVisit>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/health-workers/by_specialization",
    params(("specialization" = String, Query, description = "Exact specialization")),
    responses(
        (status = 200, description = "Matching health worker profiles", body = PageRes),
        (status = 400, description = "Missing specialization", body = ErrorBody)
    )
)]
/// Health worker profiles with a given specialization
#[axum::debug_handler(state = AppState)]
pub async fn health_workers_by_specialization(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = require(query.into_list_query(), "specialization", "specialization")?;
    page_of::<HealthWorkerProfile>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/facilities/by_location",
    params(("location" = String, Query, description = "Location id")),
    responses(
        (status = 200, description = "Facilities at the location", body = PageRes),
        (status = 400, description = "Missing location", body = ErrorBody)
    )
)]
/// Facilities directly at a location
#[axum::debug_handler(state = AppState)]
pub async fn facilities_by_location(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = require(query.into_list_query(), "location", "location")?;
    page_of::<HealthFacility>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/search",
    params(("q" = String, Query, description = "Terms matched against identifier, names and phone")),
    responses(
        (status = 200, description = "Matching patients", body = PageRes),
        (status = 400, description = "Missing q", body = ErrorBody)
    )
)]
/// Free-text patient search
#[axum::debug_handler(state = AppState)]
pub async fn patients_search(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = require(query.into_list_query(), "q", SEARCH_PARAM)?;
    page_of::<Patient>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low_stock",
    responses((status = 200, description = "Items at or below their minimum quantity", body = PageRes))
)]
/// Inventory items at or below their minimum quantity
#[axum::debug_handler(state = AppState)]
pub async fn inventory_low_stock(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = query.into_list_query().with("low_stock", "true");
    page_of::<FacilityInventory>(&state, actor, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments/upcoming",
    responses((status = 200, description = "Scheduled appointments from now on, soonest first", body = PageRes))
)]
/// Scheduled appointments starting now or later
#[axum::debug_handler(state = AppState)]
pub async fn appointments_upcoming(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    let query = query
        .into_list_query()
        .with("starts_from", Utc::now().to_rfc3339())
        .with("status", AppointmentStatus::Scheduled.as_str())
        .with("ordering", "start_time");
    page_of::<Appointment>(&state, actor, query).await
}
