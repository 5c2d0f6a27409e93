use crate::error::ApiResult;
use crate::extract::{blocking, JsonBody};
use crate::state::AppState;
use api_shared::dto::{ErrorBody, RefreshReq, TokenPair, TokenReq};
use api_shared::TokenKind;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenReq,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 401, description = "Unknown user, wrong password or inactive account", body = ErrorBody)
    )
)]
/// Exchange a username and password for a token pair
///
/// Unknown usernames, wrong passwords and inactive accounts all produce the same `401` so the
/// response does not reveal which accounts exist.
///
/// # Returns
/// * `Ok(Json<TokenPair>)` - Access token plus a longer-lived refresh token
///
/// # Errors
/// Returns `401 Unauthorized` if the credentials are not accepted.
#[axum::debug_handler(state = AppState)]
pub async fn obtain_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenReq>,
) -> ApiResult<Json<TokenPair>> {
    let accounts = state.accounts.clone();
    let username = req.username.clone();
    let user = blocking(move || accounts.authenticate(&req.username, &req.password)).await?;
    let pair = state.tokens.issue_pair(&user.id, Utc::now())?;
    tracing::info!("issued tokens for {}", username);
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh",
    request_body = RefreshReq,
    responses(
        (status = 200, description = "New access token", body = TokenPair),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorBody)
    )
)]
/// Renew an access token
///
/// The refresh token must be valid and its user must still be active. The response carries a
/// new access token only.
#[axum::debug_handler(state = AppState)]
pub async fn refresh_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshReq>,
) -> ApiResult<Json<TokenPair>> {
    let now = Utc::now();
    let claims = state.tokens.verify(&req.refresh, TokenKind::Refresh, now)?;
    let user_id = claims.subject()?;
    let accounts = state.accounts.clone();
    blocking(move || accounts.actor_for(&user_id)).await?;

    Ok(Json(TokenPair {
        access: state.tokens.issue(&user_id, TokenKind::Access, now)?,
        refresh: None,
        token_type: "Bearer".into(),
        expires_in: state.tokens.config().access_ttl_secs(),
    }))
}
