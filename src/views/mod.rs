//! Server-rendered pages. Each handler builds a JSON view model and passes it
//! to the configured [`Renderer`].

pub mod render;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tracing::{error, instrument};

pub use render::{Renderer, ShellRenderer};

use crate::{
    auth::{guard::AuthError, AuthUser, CurrentUser, MaybeUser},
    error::AppError,
    resources::{
        handlers::{self as generic, to_doc, StoreRef},
        ResourceStore,
    },
    state::AppState,
    store::TourCatalog,
    tours::model::Tour,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/tour/:slug", get(tour_page))
        .route("/login", get(login_page))
        .route("/me", get(account_page))
}

fn page(
    renderer: &dyn Renderer,
    status: StatusCode,
    view: &str,
    title: &str,
    model: Value,
) -> Response {
    match renderer.render(view, title, &model) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, view, "render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Something went very wrong!").into_response()
        }
    }
}

fn error_page(renderer: &dyn Renderer, err: AppError) -> Response {
    let status = err.status_code();
    let msg = if err.is_operational() {
        err.to_string()
    } else {
        error!(error = ?err, "view failed");
        "Please try again later.".to_string()
    };
    page(
        renderer,
        status,
        "error",
        "Something went wrong!",
        json!({ "msg": msg }),
    )
}

fn user_model(user: &Option<CurrentUser>) -> Value {
    user.as_ref()
        .and_then(|c| serde_json::to_value(&c.user).ok())
        .unwrap_or(Value::Null)
}

#[instrument(skip_all)]
pub async fn overview(
    State(state): State<AppState>,
    State(tours): State<StoreRef<Tour>>,
    MaybeUser(user): MaybeUser,
) -> Response {
    let renderer = state.renderer.as_ref();
    match generic::read_many(tours.as_ref(), &[], Vec::new()).await {
        Ok(docs) => page(
            renderer,
            StatusCode::OK,
            "overview",
            "All Tours",
            json!({ "tours": docs, "user": user_model(&user) }),
        ),
        Err(e) => error_page(renderer, e),
    }
}

async fn tour_model(
    catalog: &dyn TourCatalog,
    tours: StoreRef<Tour>,
    slug: &str,
) -> Result<(String, Value), AppError> {
    let tour = catalog
        .find_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no tour with that name.".into()))?;
    let mut doc = to_doc(&tour)?;
    tours.populate(&tour, &mut doc).await?;
    Ok((tour.name, doc))
}

#[instrument(skip(state, catalog, tours, user))]
pub async fn tour_page(
    State(state): State<AppState>,
    State(catalog): State<Arc<dyn TourCatalog>>,
    State(tours): State<StoreRef<Tour>>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
) -> Response {
    let renderer = state.renderer.as_ref();
    match tour_model(catalog.as_ref(), tours, &slug).await {
        Ok((name, doc)) => page(
            renderer,
            StatusCode::OK,
            "tour",
            &format!("{name} Tour"),
            json!({ "tour": doc, "user": user_model(&user) }),
        ),
        Err(e) => error_page(renderer, e),
    }
}

#[instrument(skip_all)]
pub async fn login_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    page(
        state.renderer.as_ref(),
        StatusCode::OK,
        "login",
        "Log into your account",
        json!({ "user": user_model(&user) }),
    )
}

#[instrument(skip_all)]
pub async fn account_page(
    State(state): State<AppState>,
    auth: Result<AuthUser, AuthError>,
) -> Response {
    let renderer = state.renderer.as_ref();
    match auth {
        Ok(AuthUser(current)) => page(
            renderer,
            StatusCode::OK,
            "account",
            "Your account",
            json!({ "user": user_model(&Some(current)) }),
        ),
        Err(e) => error_page(renderer, e.into()),
    }
}
