//! Request extractors: bearer authentication, JSON bodies and raw query pairs.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use api_shared::TokenKind;
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Query};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use opencare_core::{Actor, CoreError, CoreResult, ListQuery};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// JSON body whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// All query parameters, in order.
#[derive(FromRequestParts, serde::Deserialize)]
#[serde(transparent)]
#[from_request(via(Query), rejection(ApiError))]
pub struct QueryPairs(pub Vec<(String, String)>);

impl QueryPairs {
    pub fn into_list_query(self) -> ListQuery {
        ListQuery::from_pairs(self.0)
    }
}

/// The authenticated caller.
///
/// Requires `Authorization: Bearer <access token>` naming an active user. Client address
/// and user agent are attached for the audit trail.
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let token = bearer_token(&parts.headers).ok_or(CoreError::Unauthenticated)?;
        let claims = state.tokens.verify(token, TokenKind::Access, Utc::now())?;
        let user_id = claims.subject()?;

        let accounts = state.accounts.clone();
        let actor = blocking(move || accounts.actor_for(&user_id)).await?;
        Ok(AuthUser(actor.with_client(
            client_ip(&parts.headers),
            header_text(&parts.headers, USER_AGENT.as_str()),
        )))
    }
}

/// Run a blocking storage call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

/// First address in `X-Forwarded-For`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_text(headers, FORWARDED_FOR)
        .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_client_ip_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("10.0.0.7, 172.16.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.7"));
    }
}
