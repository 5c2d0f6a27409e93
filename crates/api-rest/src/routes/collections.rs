//! Generic CRUD handlers, instantiated once per entity family.
//!
//! Permission checks, validation and auditing all live in the core repository; these
//! handlers only move JSON in and out and run the storage call on the blocking pool.

use crate::error::ApiResult;
use crate::extract::{blocking, AuthUser, JsonBody, QueryPairs};
use crate::state::AppState;
use api_shared::dto::PageRes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use opencare_core::repository::today;
use opencare_core::{Actor, CoreError, CoreResult, Entity, ListQuery, RecordId, Stored};
use serde_json::Value;

/// Mount list/create at `path` and retrieve/replace/patch/delete at `path/:id`.
pub fn collection<E: Entity>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(path, get(list::<E>).post(create::<E>))
        .route(&format!("{}/:id", path), item::<E>())
}

/// Mount list and retrieve only.
pub fn read_only<E: Entity>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(path, get(list::<E>))
        .route(&format!("{}/:id", path), get(retrieve::<E>))
}

pub fn item<E: Entity>() -> MethodRouter<AppState> {
    get(retrieve::<E>)
        .put(replace::<E>)
        .patch(patch::<E>)
        .delete(destroy::<E>)
}

pub async fn list<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    query: QueryPairs,
) -> ApiResult<Json<PageRes>> {
    page_of::<E>(&state, actor, query.into_list_query()).await
}

/// One rendered page of `E` for `query`.
pub async fn page_of<E: Entity>(
    state: &AppState,
    actor: Actor,
    query: ListQuery,
) -> ApiResult<Json<PageRes>> {
    let repo = state.repo::<E>();
    let page = blocking(move || {
        let page = repo.list(&actor, &query)?;
        let today = today();
        let results = page
            .results
            .iter()
            .map(|row| row.view(today))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(PageRes {
            count: page.count,
            page: page.page,
            page_size: page.page_size,
            next: page.next,
            previous: page.previous,
            results,
        })
    })
    .await?;
    Ok(Json(page))
}

pub async fn create<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let repo = state.repo::<E>();
    let view = blocking(move || render(repo.create_from_json(&actor, body)?)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn retrieve<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = record_id::<E>(&id)?;
    let repo = state.repo::<E>();
    Ok(Json(blocking(move || repo.view(&actor, &id)).await?))
}

pub async fn replace<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let id = record_id::<E>(&id)?;
    let repo = state.repo::<E>();
    Ok(Json(
        blocking(move || render(repo.replace(&actor, &id, body)?)).await?,
    ))
}

pub async fn patch<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let id = record_id::<E>(&id)?;
    let repo = state.repo::<E>();
    Ok(Json(
        blocking(move || render(repo.patch(&actor, &id, body)?)).await?,
    ))
}

pub async fn destroy<E: Entity>(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = record_id::<E>(&id)?;
    let repo = state.repo::<E>();
    blocking(move || repo.delete(&actor, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Parse a path id; a malformed id cannot name a record, so it is reported as missing.
pub fn record_id<E: Entity>(raw: &str) -> CoreResult<RecordId> {
    RecordId::parse(raw).map_err(|_| CoreError::not_found(E::LABEL, raw))
}

pub fn render<E: Entity>(stored: Stored<E>) -> CoreResult<Value> {
    stored.view(today())
}
