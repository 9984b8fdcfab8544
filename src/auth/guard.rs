//! Request authentication and role gates.
//!
//! Every extractor here runs the same chain: locate the session token, verify
//! it, load the (active) user it names, and reject tokens signed before the
//! user's last password change. The resolved [`CurrentUser`] is cached in the
//! request extensions so a route guarded by a layer and a handler extractor
//! only resolves it once.

use std::{convert::Infallible, marker::PhantomData};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
    middleware::{from_extractor_with_state, FromExtractorLayer},
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use thiserror::Error;
use tracing::{debug, warn};

use super::jwt::JwtKeys;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{StoreError, UserStore};
use crate::users::model::{Role, User};

pub const SESSION_COOKIE: &str = "jwt";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("You are not logged in! Please log in to get access.")]
    NoToken,

    #[error("Invalid token. Please log in again!")]
    InvalidToken,

    #[error("The user belonging to this token no longer exists.")]
    UserGone,

    #[error("User recently changed password! Please log in again.")]
    PasswordChanged,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error(transparent)]
    Lookup(#[from] StoreError),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Forbidden => AppError::Forbidden(e.to_string()),
            AuthError::Lookup(store) => store.into(),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub role: Role,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

fn cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .filter_map(|part| Cookie::parse(part.trim().to_string()).ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Bearer header first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers, SESSION_COOKIE))
}

/// Runs the full chain against `headers`.
pub async fn resolve(
    headers: &HeaderMap,
    keys: &JwtKeys,
    users: &dyn UserStore,
) -> Result<CurrentUser, AuthError> {
    let token = session_token(headers).ok_or(AuthError::NoToken)?;

    let claims = keys.verify(&token).map_err(|e| {
        debug!(error = %e, "session token rejected");
        AuthError::InvalidToken
    })?;

    let user = users
        .find_user(claims.sub)
        .await?
        .ok_or(AuthError::UserGone)?;

    if user.changed_password_after(claims.issued_at()) {
        return Err(AuthError::PasswordChanged);
    }

    let role = user.role;
    Ok(CurrentUser { user, role })
}

async fn current_user(parts: &mut Parts, state: &AppState) -> Result<CurrentUser, AuthError> {
    if let Some(cached) = parts.extensions.get::<CurrentUser>() {
        return Ok(cached.clone());
    }
    let keys = JwtKeys::from_ref(state);
    let current = resolve(&parts.headers, &keys, state.stores.credentials.as_ref()).await?;
    parts.extensions.insert(current.clone());
    Ok(current)
}

/// Requires a valid session.
pub struct AuthUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state).await.map(AuthUser)
    }
}

/// Soft check for rendered pages: any failure simply means "logged out".
pub struct MaybeUser(pub Option<CurrentUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match current_user(parts, state).await {
            Ok(current) => Ok(MaybeUser(Some(current))),
            Err(AuthError::Lookup(e)) => {
                warn!(error = %e, "user lookup failed during soft auth");
                Ok(MaybeUser(None))
            }
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

/// A set of roles allowed through an [`Authorized`] gate.
pub trait RolePolicy: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

pub struct Authenticated;
pub struct Admins;
pub struct TourEditors;
pub struct TourStaff;
pub struct Reviewers;
pub struct ReviewEditors;

impl RolePolicy for Authenticated {
    const ROLES: &'static [Role] = &[Role::User, Role::Guide, Role::LeadGuide, Role::Admin];
}

impl RolePolicy for Admins {
    const ROLES: &'static [Role] = &[Role::Admin];
}

impl RolePolicy for TourEditors {
    const ROLES: &'static [Role] = &[Role::Admin, Role::LeadGuide];
}

impl RolePolicy for TourStaff {
    const ROLES: &'static [Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
}

impl RolePolicy for Reviewers {
    const ROLES: &'static [Role] = &[Role::User];
}

impl RolePolicy for ReviewEditors {
    const ROLES: &'static [Role] = &[Role::User, Role::Admin];
}

/// Authenticated caller whose role belongs to `P`.
pub struct Authorized<P>(pub CurrentUser, PhantomData<P>);

impl<P> Authorized<P> {
    pub fn into_inner(self) -> CurrentUser {
        self.0
    }
}

/// Route layer that lets only roles of `P` through.
pub fn require<P: RolePolicy>(state: &AppState) -> FromExtractorLayer<Authorized<P>, AppState> {
    from_extractor_with_state(state.clone())
}

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = current_user(parts, state).await?;
        if !P::ROLES.contains(&current.role) {
            warn!(user_id = %current.user.id, role = ?current.role, "role not permitted");
            return Err(AuthError::Forbidden);
        }
        Ok(Authorized(current, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::auth::credentials::{Credentials, Registration};
    use crate::config::JwtConfig;
    use crate::store::MemoryStore;

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "guard-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 30,
        })
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        h
    }

    async fn registered(store: &Arc<MemoryStore>) -> User {
        Credentials::new(store.clone(), Duration::minutes(10))
            .create_user(Registration {
                name: "Guard Tester",
                email: "guard@example.com",
                password: "pass1234",
                password_confirm: "pass1234",
            })
            .await
            .unwrap()
    }

    #[test]
    fn token_is_read_from_header_then_cookie() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; jwt=from-cookie"));
        assert_eq!(session_token(&h).as_deref(), Some("from-cookie"));

        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(session_token(&h).as_deref(), Some("from-header"));

        assert!(session_token(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn chain_accepts_fresh_tokens() {
        let store = Arc::new(MemoryStore::new());
        let user = registered(&store).await;
        let keys = keys();
        let token = keys.issue(user.id).unwrap();

        let current = resolve(&bearer(&token), &keys, store.as_ref()).await.unwrap();
        assert_eq!(current.user.id, user.id);
        assert_eq!(current.role, Role::User);
    }

    #[tokio::test]
    async fn chain_rejects_missing_and_invalid_tokens() {
        let store = Arc::new(MemoryStore::new());
        let keys = keys();
        assert!(matches!(
            resolve(&HeaderMap::new(), &keys, store.as_ref()).await,
            Err(AuthError::NoToken)
        ));
        assert!(matches!(
            resolve(&bearer("garbage"), &keys, store.as_ref()).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn chain_rejects_tokens_of_deleted_users() {
        let store = Arc::new(MemoryStore::new());
        let keys = keys();
        let token = keys.issue(uuid::Uuid::new_v4()).unwrap();
        assert!(matches!(
            resolve(&bearer(&token), &keys, store.as_ref()).await,
            Err(AuthError::UserGone)
        ));
    }

    #[tokio::test]
    async fn chain_rejects_tokens_older_than_password_change() {
        let store = Arc::new(MemoryStore::new());
        let user = registered(&store).await;
        let keys = keys();
        let old = keys
            .issue_at(user.id, OffsetDateTime::now_utc() - Duration::minutes(5))
            .unwrap();

        Credentials::new(store.clone(), Duration::minutes(10))
            .set_password(&user, "another99", "another99")
            .await
            .unwrap();

        assert!(matches!(
            resolve(&bearer(&old), &keys, store.as_ref()).await,
            Err(AuthError::PasswordChanged)
        ));

        let fresh = keys.issue(user.id).unwrap();
        assert!(resolve(&bearer(&fresh), &keys, store.as_ref()).await.is_ok());
    }

    #[test]
    fn policies_list_expected_roles() {
        assert!(TourEditors::ROLES.contains(&Role::LeadGuide));
        assert!(!TourEditors::ROLES.contains(&Role::Guide));
        assert!(TourStaff::ROLES.contains(&Role::Guide));
        assert_eq!(Reviewers::ROLES, &[Role::User]);
        assert!(!ReviewEditors::ROLES.contains(&Role::Guide));
        assert_eq!(Authenticated::ROLES.len(), 4);
    }

    #[test]
    fn forbidden_maps_to_403_and_the_rest_to_401() {
        use axum::http::StatusCode;
        assert_eq!(AppError::from(AuthError::Forbidden).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(AuthError::UserGone).status_code(), StatusCode::UNAUTHORIZED);
    }
}
