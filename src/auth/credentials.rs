//! Credential lifecycle: registration, password checks and changes, and
//! single-use password-reset tokens.

use std::sync::Arc;

use axum::extract::FromRef;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::error::AppError;
use crate::resources::Violations;
use crate::state::AppState;
use crate::store::{StoreError, UserStore};
use crate::users::{
    is_valid_email,
    model::{NewUser, Role, User},
};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid input data. {0}")]
    Invalid(String),

    #[error("Token is invalid or has expired")]
    InvalidResetToken,

    #[error("The user no longer exists")]
    UnknownUser,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Invalid(_) | CredentialError::InvalidResetToken => {
                AppError::Validation(e.to_string())
            }
            CredentialError::UnknownUser => AppError::not_found("user"),
            CredentialError::Store(s) => s.into(),
            CredentialError::Internal(err) => AppError::Internal(err),
        }
    }
}

/// Signup fields as submitted by the client.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirm: &'a str,
}

#[derive(Clone)]
pub struct Credentials {
    users: Arc<dyn UserStore>,
    reset_ttl: Duration,
}

impl FromRef<AppState> for Credentials {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.stores.credentials.clone(),
            Duration::minutes(state.config.reset_ttl_minutes),
        )
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_new_password(password: &str, confirm: &str, v: &mut Violations) {
    v.check(
        password.chars().count() >= MIN_PASSWORD_LEN,
        "A password must have at least 8 characters",
    );
    v.check(password == confirm, "Passwords are not the same!");
}

fn reject(v: Violations) -> Result<(), CredentialError> {
    match v.into_message() {
        Some(msg) => Err(CredentialError::Invalid(msg)),
        None => Ok(()),
    }
}

/// Hex SHA-256 of a raw reset token; only this digest is persisted.
pub fn digest_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Credentials {
    pub fn new(users: Arc<dyn UserStore>, reset_ttl: Duration) -> Self {
        Self { users, reset_ttl }
    }

    /// Registers a regular user. The role is never taken from the client.
    pub async fn create_user(&self, reg: Registration<'_>) -> Result<User, CredentialError> {
        let name = reg.name.trim();
        let email = normalize_email(reg.email);

        let mut v = Violations::default();
        v.check(!name.is_empty(), "Please tell us your name!");
        v.check(is_valid_email(&email), "Please provide a valid email");
        check_new_password(reg.password, reg.password_confirm, &mut v);
        reject(v)?;

        let password_hash = hash_password(reg.password)?;
        let user = self
            .users
            .insert_user(NewUser {
                name: name.to_string(),
                email,
                password_hash,
                role: Role::User,
            })
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, CredentialError> {
        Ok(self.users.find_by_email(&normalize_email(email)).await?)
    }

    pub async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<User>, CredentialError> {
        Ok(self.users.find_user(id).await?)
    }

    pub fn verify_password(&self, user: &User, candidate: &str) -> Result<bool, CredentialError> {
        Ok(verify_password(candidate, &user.password_hash)?)
    }

    /// The active user with this email whose password matches, if any.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, CredentialError> {
        let Some(user) = self.find_by_email(email).await? else {
            warn!("login for unknown email");
            return Ok(None);
        };
        if !self.verify_password(&user, password)? {
            warn!(user_id = %user.id, "login with wrong password");
            return Ok(None);
        }
        Ok(Some(user))
    }

    /// Stores a new hash, clears any pending reset token and stamps the change
    /// one second in the past so a token issued right after stays fresh.
    pub async fn set_password(
        &self,
        user: &User,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, CredentialError> {
        let mut v = Violations::default();
        check_new_password(password, password_confirm, &mut v);
        reject(v)?;

        let hash = hash_password(password)?;
        let changed_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        let updated = self
            .users
            .store_password(user.id, &hash, changed_at)
            .await?
            .ok_or(CredentialError::UnknownUser)?;
        info!(user_id = %user.id, "password changed");
        Ok(updated)
    }

    /// Creates a reset token for `user` and returns the raw value to send out.
    pub async fn issue_reset_token(&self, user: &User) -> Result<String, CredentialError> {
        let raw = random_token();
        let expires = OffsetDateTime::now_utc() + self.reset_ttl;
        self.users
            .store_reset_token(user.id, Some((digest_token(&raw), expires)))
            .await?;
        Ok(raw)
    }

    pub async fn clear_reset_token(&self, user: &User) -> Result<(), CredentialError> {
        Ok(self.users.store_reset_token(user.id, None).await?)
    }

    /// Consumes a reset token and sets the new password.
    pub async fn redeem_reset_token(
        &self,
        raw: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User, CredentialError> {
        let user = self
            .users
            .find_by_reset_token(&digest_token(raw), OffsetDateTime::now_utc())
            .await?
            .ok_or(CredentialError::InvalidResetToken)?;
        self.set_password(&user, password, password_confirm).await
    }
}
