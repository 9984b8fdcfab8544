//! Persistence traits and their two backends: Postgres for deployments and an
//! in-memory store for tests and database-less local runs.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::resources::ResourceStore;
use crate::reviews::model::Review;
use crate::tours::model::Tour;
use crate::users::model::{NewUser, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error("{0}")]
    Invalid(String),

    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("timed out waiting for a database connection")]
    Timeout,

    #[error("database error")]
    Sql(#[source] sqlx::Error),

    #[error("could not encode stored data")]
    Encoding(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::PoolTimedOut = e {
            return StoreError::Timeout;
        }
        let (code, constraint) = match e.as_database_error() {
            Some(db) => (
                db.code().map(|c| c.into_owned()),
                db.constraint().map(str::to_string),
            ),
            None => return StoreError::Sql(e),
        };
        let constraint = constraint.as_deref();
        match code.as_deref() {
            Some("23505") => StoreError::Duplicate(unique_field(constraint).to_string()),
            Some("23503") => StoreError::MissingReference(referenced(constraint)),
            Some("23514") => StoreError::Invalid(check_message(constraint).to_string()),
            Some("22P02") => StoreError::Invalid("Malformed value".to_string()),
            _ => StoreError::Sql(e),
        }
    }
}

pub(crate) fn unique_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "email",
        Some("tours_name_key") => "name",
        Some("reviews_one_per_user") => "tour and user (one review per tour)",
        _ => "a unique field",
    }
}

pub(crate) fn referenced(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("reviews_tour_id_fkey") => "tour",
        Some("reviews_user_id_fkey") => "user",
        _ => "record",
    }
}

pub(crate) fn check_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("tours_price_discount_check") => {
            "Discount price should be below the regular price"
        }
        Some("reviews_rating_check") => "Rating must be between 1 and 5",
        _ => "A value is out of range",
    }
}

/// Credential-level access to users. Every lookup ignores deactivated accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Looks up the user holding `token_hash` whose reset window ends after `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    /// Replaces the password hash and clears any pending reset token.
    async fn store_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    /// Sets (`Some((hash, expires))`) or clears (`None`) the reset token.
    async fn store_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

/// Tour reads that do not fit the generic resource shape.
#[async_trait]
pub trait TourCatalog: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tour>, StoreError>;

    /// Aggregates over tours rated 4.5 or better, grouped by difficulty,
    /// cheapest average price first.
    async fn tour_stats(&self) -> Result<Vec<DifficultyStats>, StoreError>;

    /// Start dates in `year` grouped by month, busiest month first, at most 12 rows.
    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthPlan>, StoreError>;
}

/// `[Jan 1 of year, Jan 1 of year + 1)` in UTC.
pub(crate) fn year_bounds(year: i32) -> Result<(OffsetDateTime, OffsetDateTime), StoreError> {
    let out_of_range = || StoreError::Invalid(format!("Year {year} is out of range"));
    let start = |y: i32| {
        Date::from_calendar_date(y, Month::January, 1)
            .map(|d| d.midnight().assume_utc())
            .map_err(|_| out_of_range())
    };
    let next = year.checked_add(1).ok_or_else(out_of_range)?;
    Ok((start(year)?, start(next)?))
}

/// Every store handle the application needs, usually backed by one object.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn UserStore>,
    pub users: Arc<dyn ResourceStore<User>>,
    pub tours: Arc<dyn ResourceStore<Tour>>,
    pub reviews: Arc<dyn ResourceStore<Review>>,
    pub catalog: Arc<dyn TourCatalog>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore
            + ResourceStore<User>
            + ResourceStore<Tour>
            + ResourceStore<Review>
            + TourCatalog
            + 'static,
    {
        Self {
            credentials: backend.clone(),
            users: backend.clone(),
            tours: backend.clone(),
            reviews: backend.clone(),
            catalog: backend,
        }
    }
}
