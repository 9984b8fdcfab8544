use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Query, State},
    response::Response,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{Input, Resource, ResourceStore};
use crate::error::AppError;
use crate::query::{Predicate, QuerySpec};
use crate::response::{no_content, ApiResponse};

/// Shared handle to the store of one entity type, extracted with `State`.
pub type StoreRef<E> = Arc<dyn ResourceStore<E>>;

/// Raw `key=value` pairs of the query string, in order.
pub type QueryPairs = Query<Vec<(String, String)>>;

/// `Json` whose rejection renders through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Path` whose rejection renders through [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

pub(crate) fn to_doc<E: Resource>(entity: &E) -> Result<Value, AppError> {
    serde_json::to_value(entity).map_err(|e| AppError::Internal(e.into()))
}

pub async fn create_one<E: Resource>(
    store: &dyn ResourceStore<E>,
    input: E::Create,
) -> Result<E, AppError> {
    let input = input.prepare()?;
    let entity = store.insert(input).await?;
    store.after_write(&entity).await?;
    info!(resource = E::NAME, id = %entity.id(), "created");
    Ok(entity)
}

pub async fn read_one<E: Resource>(
    store: &dyn ResourceStore<E>,
    id: Uuid,
) -> Result<Value, AppError> {
    let entity = store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(E::NAME))?;
    let mut doc = to_doc(&entity)?;
    store.populate(&entity, &mut doc).await?;
    Ok(doc)
}

/// Runs a list query. `base` predicates scope the result before client filters.
pub async fn read_many<E: Resource>(
    store: &dyn ResourceStore<E>,
    params: &[(String, String)],
    base: Vec<Predicate>,
) -> Result<Vec<Value>, AppError> {
    let spec = QuerySpec::build(params, E::FIELDS, base)?;
    let items = store.find_many(&spec).await?;
    items
        .iter()
        .map(|e| to_doc(e).map(|doc| spec.projection.apply(doc)))
        .collect()
}

pub async fn update_one<E: Resource>(
    store: &dyn ResourceStore<E>,
    id: Uuid,
    patch: E::Patch,
) -> Result<E, AppError> {
    let patch = patch.prepare()?;
    let entity = store
        .update(id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(E::NAME))?;
    store.after_write(&entity).await?;
    info!(resource = E::NAME, %id, "updated");
    Ok(entity)
}

pub async fn delete_one<E: Resource>(
    store: &dyn ResourceStore<E>,
    id: Uuid,
) -> Result<E, AppError> {
    let entity = store
        .delete(id)
        .await?
        .ok_or_else(|| AppError::not_found(E::NAME))?;
    store.after_write(&entity).await?;
    info!(resource = E::NAME, %id, "deleted");
    Ok(entity)
}

// --- handlers ---

#[instrument(skip_all)]
pub async fn create<E: Resource>(
    State(store): State<StoreRef<E>>,
    AppJson(body): AppJson<E::Create>,
) -> Result<ApiResponse<E>, AppError> {
    let entity = create_one(store.as_ref(), body).await?;
    Ok(ApiResponse::created(entity))
}

#[instrument(skip(store))]
pub async fn get_one<E: Resource>(
    State(store): State<StoreRef<E>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    Ok(ApiResponse::success(read_one(store.as_ref(), id).await?))
}

#[instrument(skip_all)]
pub async fn get_all<E: Resource>(
    State(store): State<StoreRef<E>>,
    Query(params): QueryPairs,
) -> Result<ApiResponse<Vec<Value>>, AppError> {
    let docs = read_many(store.as_ref(), &params, Vec::new()).await?;
    Ok(ApiResponse::list(docs))
}

#[instrument(skip(store, body))]
pub async fn update<E: Resource>(
    State(store): State<StoreRef<E>>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<E::Patch>,
) -> Result<ApiResponse<E>, AppError> {
    let entity = update_one(store.as_ref(), id, body).await?;
    Ok(ApiResponse::success(entity))
}

#[instrument(skip(store))]
pub async fn delete<E: Resource>(
    State(store): State<StoreRef<E>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    delete_one(store.as_ref(), id).await?;
    Ok(no_content())
}
