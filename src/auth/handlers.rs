use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{patch, post},
    Router,
};
use cookie::{time::Duration as CookieDuration, Cookie};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{
    credentials::{Credentials, Registration},
    dto::{
        ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
        UpdatePasswordRequest,
    },
    guard::{AuthUser, SESSION_COOKIE},
    jwt::JwtKeys,
};
use crate::{
    error::AppError,
    mailer,
    resources::{handlers::AppPath, AppJson},
    state::AppState,
    users::model::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", patch(reset_password))
        .route("/auth/update-password", patch(update_password))
}

/// The `jwt` cookie with the attributes shared by login and logout.
fn session_cookie(state: &AppState, value: String, max_age: CookieDuration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .secure(state.config.secure_cookies())
        .path("/")
        .max_age(max_age)
        .build()
}

/// Issues a session token and returns it both in the body and as the `jwt` cookie.
pub(crate) fn session_response(
    state: &AppState,
    user: &User,
    status: StatusCode,
) -> Result<Response, AppError> {
    let token = JwtKeys::from_ref(state).issue(user.id)?;
    let cookie = session_cookie(
        state,
        token.clone(),
        CookieDuration::minutes(state.config.jwt.ttl_minutes),
    );

    let body = json!({
        "status": "success",
        "token": token,
        "data": { "user": user },
    });
    Ok((status, [(header::SET_COOKIE, cookie.to_string())], Json(body)).into_response())
}

#[instrument(skip(state, creds, payload))]
pub async fn signup(
    State(state): State<AppState>,
    State(creds): State<Credentials>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<Response, AppError> {
    let user = creds
        .create_user(Registration {
            name: &payload.name,
            email: &payload.email,
            password: &payload.password,
            password_confirm: &payload.password_confirm,
        })
        .await?;
    session_response(&state, &user, StatusCode::CREATED)
}

#[instrument(skip(state, creds, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(creds): State<Credentials>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Response, AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Please provide email and password!".into(),
        ));
    }

    let user = creds
        .authenticate(&payload.email, &payload.password)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Incorrect email or password".into()))?;

    info!(user_id = %user.id, "user logged in");
    session_response(&state, &user, StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = session_cookie(&state, String::new(), CookieDuration::ZERO);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(json!({ "status": "success" })),
    )
        .into_response()
}

#[instrument(skip(state, creds, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    State(creds): State<Credentials>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Response, AppError> {
    let user = creds
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email address.".into()))?;

    let raw = creds.issue_reset_token(&user).await?;
    let reset_url = format!(
        "{}/api/v1/auth/reset-password/{raw}",
        state.config.public_url.trim_end_matches('/')
    );

    if let Err(e) = state
        .mailer
        .send(mailer::password_reset(
            &user,
            &reset_url,
            state.config.reset_ttl_minutes,
        ))
        .await
    {
        error!(error = %e, user_id = %user.id, "reset email failed");
        creds.clear_reset_token(&user).await?;
        return Err(AppError::Delivery(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    info!(user_id = %user.id, "reset token sent");
    Ok(Json(json!({ "status": "success", "message": "Token sent to email!" })).into_response())
}

#[instrument(skip(state, creds, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    State(creds): State<Credentials>,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let user = creds
        .redeem_reset_token(&token, &payload.password, &payload.password_confirm)
        .await?;
    session_response(&state, &user, StatusCode::OK)
}

#[instrument(skip(state, creds, current, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    State(creds): State<Credentials>,
    AuthUser(current): AuthUser,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    if !creds.verify_password(&current.user, &payload.password_current)? {
        warn!(user_id = %current.user.id, "wrong current password");
        return Err(AppError::Unauthorized("Your current password is wrong.".into()));
    }

    let user = creds
        .set_password(&current.user, &payload.password, &payload.password_confirm)
        .await?;
    session_response(&state, &user, StatusCode::OK)
}
