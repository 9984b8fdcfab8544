use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{Field, FieldKind, FilterValue, Predicate};
use crate::resources::{Input, Resource, Violations};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    #[serde(rename = "tour")]
    pub tour_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    /// Author's name and photo, filled by reads through `review_details`.
    #[sqlx(default)]
    pub author_name: Option<String>,
    #[sqlx(default)]
    pub author_photo: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body of a new review. `tour` may come from the path and `user` is always
/// the caller, so both are filled in by the handler before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    #[serde(default)]
    pub review: String,
    pub rating: Option<i32>,
    pub tour: Option<Uuid>,
    #[serde(skip)]
    pub user: Option<Uuid>,
}

impl Input for ReviewInput {
    fn normalize(&mut self) {
        self.review = self.review.trim().to_string();
    }

    fn validate(&self, v: &mut Violations) {
        v.check(!self.review.is_empty(), "Review cannot be empty!");
        match self.rating {
            Some(r) => check_rating(r, v),
            None => v.push("A review must have a rating"),
        }
        v.check(self.tour.is_some(), "Review must belong to a tour");
        v.check(self.user.is_some(), "Review must belong to a user");
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
    pub review: Option<String>,
    pub rating: Option<i32>,
}

impl Input for ReviewPatch {
    fn normalize(&mut self) {
        if let Some(text) = self.review.as_mut() {
            *text = text.trim().to_string();
        }
    }

    fn validate(&self, v: &mut Violations) {
        if let Some(text) = &self.review {
            v.check(!text.is_empty(), "Review cannot be empty!");
        }
        if let Some(r) = self.rating {
            check_rating(r, v);
        }
    }
}

fn check_rating(rating: i32, v: &mut Violations) {
    v.check((1..=5).contains(&rating), "Rating must be between 1 and 5");
}

const TOUR_REF: Field = Field::new("tour", "tour_id", FieldKind::Uuid);

pub static REVIEW_FIELDS: &[Field] = &[
    Field::new("id", "id", FieldKind::Uuid),
    Field::new("review", "review", FieldKind::Text),
    Field::new("rating", "rating", FieldKind::Integer),
    TOUR_REF,
    Field::new("user", "user_id", FieldKind::Uuid),
    Field::new("createdAt", "created_at", FieldKind::Timestamp),
];

/// Restricts a review query to one tour.
pub fn of_tour(tour_id: Uuid) -> Predicate {
    Predicate::eq(&TOUR_REF, FilterValue::Uuid(tour_id))
}

impl Resource for Review {
    type Create = ReviewInput;
    type Patch = ReviewPatch;

    const NAME: &'static str = "review";
    const FIELDS: &'static [Field] = REVIEW_FIELDS;

    fn id(&self) -> Uuid {
        self.id
    }
}
