use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::model::{of_tour, Review, ReviewInput, ReviewPatch};
use crate::{
    auth::{
        guard::{require, Authenticated, Authorized, ReviewEditors, Reviewers},
        CurrentUser,
    },
    error::AppError,
    resources::{
        handlers::{self as generic, AppPath, QueryPairs, StoreRef},
        AppJson, ResourceStore,
    },
    response::{no_content, ApiResponse},
    state::AppState,
    users::model::Role,
};

/// Every review route requires a session; writes narrow the roles further.
pub fn review_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/reviews", get(generic::get_all::<Review>).post(create_review))
        .route(
            "/reviews/:id",
            get(generic::get_one::<Review>)
                .patch(update_review)
                .delete(delete_review),
        )
        .route(
            "/tours/:id/reviews",
            get(tour_reviews).post(create_tour_review),
        )
        .route_layer(require::<Authenticated>(state))
}

#[instrument(skip_all)]
pub async fn tour_reviews(
    State(store): State<StoreRef<Review>>,
    AppPath(tour_id): AppPath<Uuid>,
    Query(params): QueryPairs,
) -> Result<ApiResponse<Vec<Value>>, AppError> {
    let docs = generic::read_many(store.as_ref(), &params, vec![of_tour(tour_id)]).await?;
    Ok(ApiResponse::list(docs))
}

#[instrument(skip_all, fields(user_id = %current.0.user.id))]
pub async fn create_review(
    State(store): State<StoreRef<Review>>,
    current: Authorized<Reviewers>,
    AppJson(mut input): AppJson<ReviewInput>,
) -> Result<ApiResponse<Review>, AppError> {
    input.user = Some(current.into_inner().user.id);
    let review = generic::create_one(store.as_ref(), input).await?;
    Ok(ApiResponse::created(review))
}

#[instrument(skip_all, fields(user_id = %current.0.user.id, %tour_id))]
pub async fn create_tour_review(
    State(store): State<StoreRef<Review>>,
    current: Authorized<Reviewers>,
    AppPath(tour_id): AppPath<Uuid>,
    AppJson(mut input): AppJson<ReviewInput>,
) -> Result<ApiResponse<Review>, AppError> {
    input.tour = Some(tour_id);
    input.user = Some(current.into_inner().user.id);
    let review = generic::create_one(store.as_ref(), input).await?;
    Ok(ApiResponse::created(review))
}

/// Loads a review the caller may modify: admins any, users only their own.
async fn owned_review(
    store: &dyn ResourceStore<Review>,
    current: &CurrentUser,
    id: Uuid,
) -> Result<Review, AppError> {
    let review = store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    if current.role != Role::Admin && review.user_id != current.user.id {
        warn!(user_id = %current.user.id, review_id = %id, "not the author of review");
        return Err(AppError::Forbidden(
            "You can only modify your own reviews".into(),
        ));
    }
    Ok(review)
}

#[instrument(skip(store, current, patch))]
pub async fn update_review(
    State(store): State<StoreRef<Review>>,
    current: Authorized<ReviewEditors>,
    AppPath(id): AppPath<Uuid>,
    AppJson(patch): AppJson<ReviewPatch>,
) -> Result<ApiResponse<Review>, AppError> {
    owned_review(store.as_ref(), &current.into_inner(), id).await?;
    let review = generic::update_one(store.as_ref(), id, patch).await?;
    Ok(ApiResponse::success(review))
}

#[instrument(skip(store, current))]
pub async fn delete_review(
    State(store): State<StoreRef<Review>>,
    current: Authorized<ReviewEditors>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    owned_review(store.as_ref(), &current.into_inner(), id).await?;
    generic::delete_one(store.as_ref(), id).await?;
    Ok(no_content())
}
