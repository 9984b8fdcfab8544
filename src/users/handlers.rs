use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Response,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::model::{User, UserPatch};
use crate::{
    auth::{
        guard::{require, Admins, AuthUser},
        CurrentUser,
    },
    error::AppError,
    resources::{
        handlers::{self as generic, StoreRef},
        AppJson,
    },
    response::{no_content, ApiResponse},
    state::AppState,
    storage::{image_key, put_all, read_images},
};

const PASSWORD_FIELDS: &[&str] = &["password", "passwordConfirm", "passwordCurrent"];

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route(
            "/users/me/photo",
            patch(update_photo).layer(DefaultBodyLimit::max(5 * 1024 * 1024)),
        )
}

pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(generic::get_all::<User>))
        .route(
            "/users/:id",
            get(generic::get_one::<User>)
                .patch(generic::update::<User>)
                .delete(generic::delete::<User>),
        )
        .route_layer(require::<Admins>(state))
}

/// Profile fields a user may change on their own account.
#[derive(Debug, Default, Deserialize)]
struct ProfileUpdate {
    name: Option<String>,
    email: Option<String>,
}

#[instrument(skip_all)]
pub async fn get_me(
    State(store): State<StoreRef<User>>,
    AuthUser(current): AuthUser,
) -> Result<ApiResponse<Value>, AppError> {
    let doc = generic::read_one(store.as_ref(), current.user.id).await?;
    Ok(ApiResponse::success(doc))
}

#[instrument(skip(store, current, body), fields(user_id = %current.user.id))]
pub async fn update_me(
    State(store): State<StoreRef<User>>,
    AuthUser(current): AuthUser,
    AppJson(body): AppJson<Value>,
) -> Result<ApiResponse<User>, AppError> {
    if PASSWORD_FIELDS.iter().any(|f| body.get(f).is_some()) {
        warn!("password change attempted through profile update");
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /auth/update-password.".into(),
        ));
    }

    let update: ProfileUpdate =
        serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))?;
    let patch = UserPatch {
        name: update.name,
        email: update.email,
        ..UserPatch::default()
    };
    let user = generic::update_one(store.as_ref(), current.user.id, patch).await?;
    Ok(ApiResponse::success(user))
}

#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn delete_me(
    State(store): State<StoreRef<User>>,
    AuthUser(current): AuthUser,
) -> Result<Response, AppError> {
    generic::delete_one(store.as_ref(), current.user.id).await?;
    info!("account deactivated");
    Ok(no_content())
}

#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn update_photo(
    State(state): State<AppState>,
    State(store): State<StoreRef<User>>,
    AuthUser(current): AuthUser,
    form: Multipart,
) -> Result<ApiResponse<User>, AppError> {
    let mut uploads = read_images(form, &["photo"]).await?;
    let photo = match uploads.len() {
        0 => return Err(AppError::Validation("Please upload a photo".into())),
        1 => uploads.remove(0),
        _ => return Err(AppError::Validation("Only one photo can be uploaded".into())),
    };

    let CurrentUser { user, .. } = current;
    let key = image_key("users", user.id, "photo", photo.ext());
    let keys = put_all(state.storage.as_ref(), vec![(key, photo)]).await?;

    let patch = UserPatch {
        photo: keys.into_iter().next(),
        ..UserPatch::default()
    };
    let user = generic::update_one(store.as_ref(), user.id, patch).await?;
    Ok(ApiResponse::success(user))
}
