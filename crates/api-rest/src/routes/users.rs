use crate::error::ApiResult;
use crate::extract::{blocking, AuthUser, JsonBody};
use crate::routes::collections::{record_id, render};
use crate::state::AppState;
use api_shared::dto::{ErrorBody, SetPasswordReq};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use opencare_core::models::users::User;
use serde_json::Value;

#[utoipa::path(
    post,
    path = "/api/v1/users",
    responses(
        (status = 201, description = "User created; the password is never echoed"),
        (status = 400, description = "Invalid user or weak password", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
        (status = 409, description = "Username already taken", body = ErrorBody)
    )
)]
/// Create a user, optionally with an initial password
///
/// `password` is write-only: it is checked, hashed and stored beside the user row in the
/// same transaction, and never appears in any response.
#[axum::debug_handler(state = AppState)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let accounts = state.accounts.clone();
    let view = blocking(move || render(accounts.create_user(&actor, body)?)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/set_password",
    params(("id" = String, Path, description = "User id")),
    request_body = SetPasswordReq,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Weak password", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
/// Replace a user's password. Administrators only.
#[axum::debug_handler(state = AppState)]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<SetPasswordReq>,
) -> ApiResult<StatusCode> {
    let id = record_id::<User>(&id)?;
    let accounts = state.accounts.clone();
    blocking(move || accounts.set_password(&actor, &id, &req.password)).await?;
    Ok(StatusCode::NO_CONTENT)
}
