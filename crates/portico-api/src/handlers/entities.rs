//! Entity API handlers
//!
//! Reads are open to anonymous callers with a reduced view; writes need a
//! bearer token and, for existing entities, authorship.
//!
//! Author: hephaex@gmail.com

use crate::audit::extract_ip_address;
use crate::auth::AuthenticatedUser;
use crate::entities::{
    CreateEntityRequest, EntityDetail, EntityService, EntityView, UpdateEntityRequest,
};
use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use portico_core::EntityId;
use std::sync::Arc;

fn writer(state: Arc<AppState>, headers: &HeaderMap) -> EntityService {
    EntityService::new(state).with_client_ip(extract_ip_address(headers))
}

/// List entities by ascending views
///
/// Anonymous callers get only the first entities of the ordering, with
/// name and author only.
#[utoipa::path(
    get,
    path = "/entities/",
    tag = "entities",
    responses(
        (status = 200, description = "Entities visible to the caller", body = [EntityView]),
    )
)]
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthenticatedUser>>,
) -> Result<Json<Vec<EntityView>>, AppError> {
    let caller = user.map(|Extension(user)| user);
    let entities = EntityService::new(state).list(caller.as_ref()).await?;

    Ok(Json(entities))
}

#[utoipa::path(
    get,
    path = "/entities/{id}/",
    tag = "entities",
    params(("id" = i64, Path, description = "Entity ID")),
    responses(
        (status = 200, description = "Entity", body = EntityView),
        (status = 404, description = "Entity not found or not visible", body = crate::error::ApiError),
    )
)]
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<EntityId>,
) -> Result<Json<EntityView>, AppError> {
    let caller = user.map(|Extension(user)| user);
    let entity = EntityService::new(state).retrieve(caller.as_ref(), id).await?;

    Ok(Json(entity))
}

/// Create an entity authored by the caller
#[utoipa::path(
    post,
    path = "/entities/",
    tag = "entities",
    request_body = CreateEntityRequest,
    responses(
        (status = 201, description = "Entity created", body = EntityDetail),
        (status = 400, description = "Invalid fields or duplicate link", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_entity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<CreateEntityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entity = writer(state, &headers).create(&user, request).await?;

    Ok((StatusCode::CREATED, Json(entity)))
}

#[utoipa::path(
    put,
    path = "/entities/{id}/",
    tag = "entities",
    params(("id" = i64, Path, description = "Entity ID")),
    request_body = UpdateEntityRequest,
    responses(
        (status = 200, description = "Entity updated", body = EntityDetail),
        (status = 400, description = "Invalid fields or duplicate link", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Caller is not the author", body = crate::error::ApiError),
        (status = 404, description = "Entity not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_entity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<EntityId>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<UpdateEntityRequest>,
) -> Result<Json<EntityDetail>, AppError> {
    let entity = writer(state, &headers).update(&user, id, request).await?;

    Ok(Json(entity))
}

#[utoipa::path(
    delete,
    path = "/entities/{id}/",
    tag = "entities",
    params(("id" = i64, Path, description = "Entity ID")),
    responses(
        (status = 204, description = "Entity deleted"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Caller is not the author", body = crate::error::ApiError),
        (status = 404, description = "Entity not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<EntityId>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    writer(state, &headers).delete(&user, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
