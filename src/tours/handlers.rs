use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{Tour, TourPatch};
use crate::{
    auth::guard::{require, TourEditors, TourStaff},
    error::AppError,
    resources::{
        handlers::{self as generic, AppPath, QueryPairs, StoreRef},
        ResourceStore,
    },
    response::ApiResponse,
    state::AppState,
    storage::{image_key, put_all, read_images, ImageUpload},
    store::TourCatalog,
};

const MAX_IMAGES: usize = 3;

pub fn tour_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/tours",
            get(generic::get_all::<Tour>)
                .merge(post(generic::create::<Tour>).route_layer(require::<TourEditors>(state))),
        )
        .route("/tours/top-5-cheap", get(top_tours))
        .route("/tours/tour-stats", get(tour_stats))
        .route(
            "/tours/monthly-plan/:year",
            get(monthly_plan).route_layer(require::<TourStaff>(state)),
        )
        .route(
            "/tours/:id",
            get(generic::get_one::<Tour>).merge(
                patch(generic::update::<Tour>)
                    .delete(generic::delete::<Tour>)
                    .route_layer(require::<TourEditors>(state)),
            ),
        )
        .route(
            "/tours/:id/images",
            patch(upload_images)
                .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
                .route_layer(require::<TourEditors>(state)),
        )
}

/// Preset query for the five best-rated cheap tours. Client-supplied paging,
/// sorting and projection are replaced; filters are kept.
pub(crate) fn top_tours_query(mut params: Vec<(String, String)>) -> Vec<(String, String)> {
    params.retain(|(k, _)| !matches!(k.as_str(), "limit" | "sort" | "fields"));
    params.extend([
        ("limit".to_string(), "5".to_string()),
        ("sort".to_string(), "-ratingsAverage,price".to_string()),
        (
            "fields".to_string(),
            "name,price,ratingsAverage,summary,difficulty".to_string(),
        ),
    ]);
    params
}

#[instrument(skip_all)]
pub async fn top_tours(
    State(store): State<StoreRef<Tour>>,
    Query(params): QueryPairs,
) -> Result<ApiResponse<Vec<Value>>, AppError> {
    let params = top_tours_query(params);
    let docs = generic::read_many(store.as_ref(), &params, Vec::new()).await?;
    Ok(ApiResponse::list(docs))
}

#[instrument(skip_all)]
pub async fn tour_stats(
    State(catalog): State<Arc<dyn TourCatalog>>,
) -> Result<ApiResponse<Value>, AppError> {
    let stats = catalog.tour_stats().await?;
    Ok(ApiResponse::success(json!({ "stats": stats })))
}

#[instrument(skip(catalog))]
pub async fn monthly_plan(
    State(catalog): State<Arc<dyn TourCatalog>>,
    AppPath(year): AppPath<i32>,
) -> Result<ApiResponse<Value>, AppError> {
    let plan = catalog.monthly_plan(year).await?;
    Ok(ApiResponse::success(json!({ "plan": plan })))
}

/// Splits an upload form into the cover and the gallery images.
pub(crate) fn split_tour_images(
    uploads: Vec<ImageUpload>,
) -> Result<(ImageUpload, Vec<ImageUpload>), AppError> {
    let (mut covers, images): (Vec<_>, Vec<_>) =
        uploads.into_iter().partition(|u| u.field == "imageCover");

    if covers.len() != 1 || images.is_empty() {
        return Err(AppError::Validation(
            "Please upload exactly one imageCover and at least one image".into(),
        ));
    }
    if images.len() > MAX_IMAGES {
        return Err(AppError::Validation(format!(
            "You can upload at most {MAX_IMAGES} images"
        )));
    }
    Ok((covers.remove(0), images))
}

#[instrument(skip(state, store, form))]
pub async fn upload_images(
    State(state): State<AppState>,
    State(store): State<StoreRef<Tour>>,
    AppPath(id): AppPath<Uuid>,
    form: Multipart,
) -> Result<ApiResponse<Tour>, AppError> {
    let uploads = read_images(form, &["imageCover", "images"]).await?;
    let (cover, images) = split_tour_images(uploads)?;

    if store.find_by_id(id).await?.is_none() {
        return Err(AppError::not_found("tour"));
    }

    let mut items = Vec::with_capacity(images.len() + 1);
    items.push((image_key("tours", id, "cover", cover.ext()), cover));
    for (n, img) in images.into_iter().enumerate() {
        let label = (n + 1).to_string();
        items.push((image_key("tours", id, &label, img.ext()), img));
    }

    let keys = put_all(state.storage.as_ref(), items).await?;
    let Some((cover_key, image_keys)) = keys.split_first() else {
        return Err(AppError::Internal(anyhow::anyhow!("no keys returned for upload")));
    };

    let patch = TourPatch {
        image_cover: Some(cover_key.clone()),
        images: Some(image_keys.to_vec()),
        ..TourPatch::default()
    };
    let tour = generic::update_one(store.as_ref(), id, patch).await?;
    info!(tour_id = %id, images = image_keys.len(), "tour images replaced");
    Ok(ApiResponse::success(tour))
}
