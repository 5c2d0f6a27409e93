use crate::error::ApiResult;
use crate::extract::{blocking, AuthUser, JsonBody};
use crate::state::AppState;
use api_shared::dto::{ErrorBody, ExportQuery, ImportReq, ImportRes};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use opencare_core::{CoreResult, InterchangeFormat, PatientInterchange};

fn format_of(raw: Option<&str>) -> CoreResult<InterchangeFormat> {
    raw.filter(|f| !f.trim().is_empty())
        .map(str::parse::<InterchangeFormat>)
        .transpose()
        .map(Option::unwrap_or_default)
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Every patient visible to the caller, as JSON or YAML"),
        (status = 400, description = "Unknown format", body = ErrorBody)
    )
)]
/// Export all patients
///
/// The body is a list of stored patient records in the requested format, with a matching
/// `Content-Type`.
#[axum::debug_handler(state = AppState)]
pub async fn export_patients(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let format = format_of(query.format.as_deref())?;
    let service = PatientInterchange::new(state.repo());
    let body = blocking(move || service.export_patients(&actor, format)).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body))
}

#[utoipa::path(
    post,
    path = "/api/v1/patients/import",
    request_body = ImportReq,
    responses(
        (status = 200, description = "Rows created and rows rejected", body = ImportRes),
        (status = 400, description = "Unknown format or data is not a list", body = ErrorBody)
    )
)]
/// Import patients from a serialised list
///
/// Each row is validated and stored in its own transaction. A rejected row is reported with
/// its position and never affects the other rows.
#[axum::debug_handler(state = AppState)]
pub async fn import_patients(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    JsonBody(req): JsonBody<ImportReq>,
) -> ApiResult<Json<ImportRes>> {
    let format = format_of(req.format.as_deref())?;
    let service = PatientInterchange::new(state.repo());
    let report = blocking(move || service.import_patients(&actor, format, &req.data)).await?;
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_defaults_to_json() {
        assert_eq!(format_of(None).ok(), Some(InterchangeFormat::Json));
        assert_eq!(format_of(Some("")).ok(), Some(InterchangeFormat::Json));
        assert_eq!(format_of(Some("yaml")).ok(), Some(InterchangeFormat::Yaml));
        assert!(format_of(Some("xml")).is_err());
    }
}
