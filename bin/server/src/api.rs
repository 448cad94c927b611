//! REST controllers under `/api`.
//!
//! All routes sit behind [`require_session`](crate::auth::require_session);
//! the controllers only forward to the scoped service operations.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
};
use clerk_authz::{ListOptions, SortDirection};
use clerk_core::TenantId;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AppState, RequireScope};
use crate::error::ApiError;
use crate::handler::{Collection, NewCollection, Page};
use crate::service::TenantView;

/// Query parameters of `GET /api/collections`.
///
/// Spelled out instead of flattening [`ListOptions`]; url-encoded numbers
/// do not survive `#[serde(flatten)]`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionQuery {
    tenant_id: Option<TenantId>,
    skip: Option<i64>,
    take: Option<i64>,
    sort_key: Option<String>,
    sort_direction: Option<SortDirection>,
    search: Option<String>,
}

impl CollectionQuery {
    fn split(self) -> (Option<TenantId>, ListOptions) {
        let options = ListOptions {
            skip: self.skip,
            take: self.take,
            sort_key: self.sort_key,
            sort_direction: self.sort_direction,
            search: self.search,
        };
        (self.tenant_id, options)
    }
}

/// Builds the `/api` routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants", get(list_tenants))
        .route("/tenants/{id}", get(get_tenant))
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/{id}", delete(delete_collection))
}

async fn list_tenants(
    State(state): State<Arc<AppState>>,
    RequireScope { user, scope }: RequireScope,
    Query(options): Query<ListOptions>,
) -> Result<Json<Page<TenantView>>, ApiError> {
    let page = state.list_tenants(user.claim(), &scope, &options).await?;
    Ok(Json(page))
}

async fn get_tenant(
    State(state): State<Arc<AppState>>,
    RequireScope { user, scope }: RequireScope,
    Path(id): Path<TenantId>,
) -> Result<Json<TenantView>, ApiError> {
    let tenant = state.tenant(user.claim(), &scope, &id).await?;
    Ok(Json(tenant))
}

async fn list_collections(
    State(state): State<Arc<AppState>>,
    RequireScope { scope, .. }: RequireScope,
    Query(query): Query<CollectionQuery>,
) -> Result<Json<Page<Collection>>, ApiError> {
    let (tenant_id, options) = query.split();
    let page = state
        .list_collections(&scope, tenant_id.as_ref(), &options)
        .await?;
    Ok(Json(page))
}

async fn create_collection(
    State(state): State<Arc<AppState>>,
    RequireScope { user, .. }: RequireScope,
    Json(input): Json<NewCollection>,
) -> Result<(StatusCode, Json<Collection>), ApiError> {
    let collection = state.create_collection(user.claim(), input).await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

async fn delete_collection(
    State(state): State<Arc<AppState>>,
    RequireScope { user, .. }: RequireScope,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.delete_collection(user.claim(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
