//! In-process store with the same visibility and integrity rules as the
//! Postgres schema: unique emails, tour names and (tour, user) reviews,
//! reference checks, cascading tour deletes and hidden inactive users and
//! secret tours.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    check_message, referenced, unique_field, year_bounds, DifficultyStats, MonthPlan,
    StoreError, TourCatalog, UserStore,
};
use crate::query::{FieldKind, FilterValue, Predicate, QuerySpec, SortKey};
use crate::resources::{NotCreatable, ResourceStore};
use crate::reviews::model::{of_tour, Review, ReviewInput, ReviewPatch, REVIEW_FIELDS};
use crate::tours::model::{
    round_rating, slugify, Tour, TourInput, TourPatch, DEFAULT_RATING,
};
use crate::users::model::{NewUser, User, UserPatch};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tours: Vec<Tour>,
    reviews: Vec<Review>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn active_user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id && u.active)
    }

    fn visible_tour(&self, id: Uuid) -> Option<&Tour> {
        self.tours.iter().find(|t| t.id == id && !t.secret_tour)
    }

    /// Review as read by the API, with its author's public profile.
    fn review_details(&self, review: &Review) -> Review {
        let author = self.users.iter().find(|u| u.id == review.user_id);
        Review {
            author_name: author.map(|u| u.name.clone()),
            author_photo: author.map(|u| u.photo.clone()),
            ..review.clone()
        }
    }
}

// --- query evaluation ---

fn run_query<'a, E>(
    items: impl Iterator<Item = &'a E>,
    spec: &QuerySpec,
) -> Result<Vec<E>, StoreError>
where
    E: Serialize + Clone + 'a,
{
    let mut rows = Vec::new();
    for item in items {
        let doc = serde_json::to_value(item)?;
        if spec.filters.iter().all(|p| satisfies(&doc, p)) {
            rows.push((doc, item));
        }
    }
    rows.sort_by(|(a, _), (b, _)| order_docs(a, b, &spec.sort));
    Ok(rows
        .into_iter()
        .skip(usize::try_from(spec.page.skip()).unwrap_or(usize::MAX))
        .take(usize::try_from(spec.page.take()).unwrap_or(usize::MAX))
        .map(|(_, item)| item.clone())
        .collect())
}

fn satisfies(doc: &Value, p: &Predicate) -> bool {
    doc.get(p.field.name)
        .and_then(|actual| compare_to(actual, &p.value))
        .is_some_and(|ord| p.op.holds(ord))
}

/// `actual` compared to the filter operand; `None` when incomparable (SQL NULL).
fn compare_to(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match expected {
        FilterValue::Text(s) => actual.as_str().map(|a| a.cmp(s.as_str())),
        FilterValue::Number(n) => actual.as_f64()?.partial_cmp(n),
        FilterValue::Integer(i) => actual.as_i64().map(|a| a.cmp(i)),
        FilterValue::Bool(b) => actual.as_bool().map(|a| a.cmp(b)),
        FilterValue::Timestamp(t) => parse_time(actual).map(|a| a.cmp(t)),
        FilterValue::Uuid(u) => actual
            .as_str()
            .and_then(|a| Uuid::parse_str(a).ok())
            .map(|a| a.cmp(u)),
    }
}

fn parse_time(v: &Value) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(v.as_str()?, &Rfc3339).ok()
}

fn order_docs(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = order_values(a.get(key.field.name), b.get(key.field.name), key.field.kind);
        let ord = match key.direction {
            crate::query::SortDirection::Asc => ord,
            crate::query::SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Missing and null values sort after everything else, as Postgres does for ASC.
fn order_values(a: Option<&Value>, b: Option<&Value>, kind: FieldKind) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match kind {
            FieldKind::Number | FieldKind::Integer => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b))
                .unwrap_or(Ordering::Equal),
            FieldKind::Bool => a.as_bool().cmp(&b.as_bool()),
            FieldKind::Timestamp => parse_time(a).cmp(&parse_time(b)),
            _ => a.as_str().cmp(&b.as_str()),
        },
    }
}

// --- users ---

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate(
                unique_field(Some("users_email_key")).into(),
            ));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role: new.role,
            photo: "default.jpg".into(),
            password_hash: new.password_hash,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.active_user(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.email == email && u.active)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| {
                u.active
                    && u.password_reset_token.as_deref() == Some(token_hash)
                    && u.password_reset_expires.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn store_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id && u.active) else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.password_changed_at = Some(changed_at);
        user.password_reset_token = None;
        user.password_reset_expires = None;
        Ok(Some(user.clone()))
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            let (hash, expires) = token.unzip();
            user.password_reset_token = hash;
            user.password_reset_expires = expires;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore<User> for MemoryStore {
    async fn insert(&self, input: NotCreatable) -> Result<User, StoreError> {
        match input {}
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.find_user(id).await
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        run_query(inner.users.iter().filter(|u| u.active), spec)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &patch.email {
            if inner.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Duplicate(
                    unique_field(Some("users_email_key")).into(),
                ));
            }
        }
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id && u.active) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(photo) = patch.photo {
            user.photo = photo;
        }
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id && u.active) else {
            return Ok(None);
        };
        user.active = false;
        Ok(Some(user.clone()))
    }
}

// --- tours ---

fn check_discount(tour: &Tour) -> Result<(), StoreError> {
    match tour.price_discount {
        Some(discount) if discount >= tour.price => Err(StoreError::Invalid(
            check_message(Some("tours_price_discount_check")).into(),
        )),
        _ => Ok(()),
    }
}

fn name_taken(inner: &Inner, name: &str, except: Option<Uuid>) -> bool {
    inner
        .tours
        .iter()
        .any(|t| t.name == name && Some(t.id) != except)
}

#[async_trait]
impl ResourceStore<Tour> for MemoryStore {
    async fn insert(&self, t: TourInput) -> Result<Tour, StoreError> {
        let mut inner = self.inner.write().await;
        if name_taken(&inner, &t.name, None) {
            return Err(StoreError::Duplicate(
                unique_field(Some("tours_name_key")).into(),
            ));
        }
        let tour = Tour {
            id: Uuid::new_v4(),
            slug: slugify(&t.name),
            name: t.name,
            duration: t.duration,
            max_group_size: t.max_group_size,
            difficulty: t.difficulty,
            ratings_average: DEFAULT_RATING,
            ratings_quantity: 0,
            price: t.price,
            price_discount: t.price_discount,
            summary: t.summary,
            description: t.description,
            image_cover: t.image_cover,
            images: t.images,
            start_dates: t.start_dates,
            secret_tour: t.secret_tour,
            guides: t.guides,
            created_at: OffsetDateTime::now_utc(),
        };
        check_discount(&tour)?;
        inner.tours.push(tour.clone());
        Ok(tour)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tour>, StoreError> {
        Ok(self.inner.read().await.visible_tour(id).cloned())
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<Tour>, StoreError> {
        let inner = self.inner.read().await;
        run_query(inner.tours.iter().filter(|t| !t.secret_tour), spec)
    }

    async fn update(&self, id: Uuid, patch: TourPatch) -> Result<Option<Tour>, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(name) = &patch.name {
            if name_taken(&inner, name, Some(id)) {
                return Err(StoreError::Duplicate(
                    unique_field(Some("tours_name_key")).into(),
                ));
            }
        }
        let Some(stored) = inner.tours.iter_mut().find(|t| t.id == id && !t.secret_tour) else {
            return Ok(None);
        };
        let mut tour = stored.clone();
        if let Some(name) = patch.name {
            tour.slug = slugify(&name);
            tour.name = name;
        }
        if let Some(v) = patch.duration {
            tour.duration = v;
        }
        if let Some(v) = patch.max_group_size {
            tour.max_group_size = v;
        }
        if let Some(v) = patch.difficulty {
            tour.difficulty = v;
        }
        if let Some(v) = patch.price {
            tour.price = v;
        }
        if let Some(v) = patch.price_discount {
            tour.price_discount = Some(v);
        }
        if let Some(v) = patch.summary {
            tour.summary = v;
        }
        if let Some(v) = patch.description {
            tour.description = Some(v);
        }
        if let Some(v) = patch.image_cover {
            tour.image_cover = v;
        }
        if let Some(v) = patch.images {
            tour.images = v;
        }
        if let Some(v) = patch.start_dates {
            tour.start_dates = v;
        }
        if let Some(v) = patch.secret_tour {
            tour.secret_tour = v;
        }
        if let Some(v) = patch.guides {
            tour.guides = v;
        }
        check_discount(&tour)?;
        *stored = tour.clone();
        Ok(Some(tour))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Tour>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(pos) = inner.tours.iter().position(|t| t.id == id && !t.secret_tour) else {
            return Ok(None);
        };
        let tour = inner.tours.remove(pos);
        inner.reviews.retain(|r| r.tour_id != id);
        Ok(Some(tour))
    }

    async fn populate(&self, tour: &Tour, doc: &mut Value) -> Result<(), StoreError> {
        let inner = self.inner.read().await;
        let spec = QuerySpec::scoped(REVIEW_FIELDS, vec![of_tour(tour.id)]);
        let detailed: Vec<Review> = inner
            .reviews
            .iter()
            .map(|r| inner.review_details(r))
            .collect();
        doc["reviews"] = serde_json::to_value(run_query(detailed.iter(), &spec)?)?;
        Ok(())
    }
}

#[async_trait]
impl TourCatalog for MemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tour>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tours
            .iter()
            .filter(|t| t.slug == slug && !t.secret_tour)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn tour_stats(&self) -> Result<Vec<DifficultyStats>, StoreError> {
        let inner = self.inner.read().await;
        let mut groups: BTreeMap<&'static str, Vec<&Tour>> = BTreeMap::new();
        for tour in inner
            .tours
            .iter()
            .filter(|t| !t.secret_tour && t.ratings_average >= 4.5)
        {
            groups.entry(tour.difficulty.as_str()).or_default().push(tour);
        }

        let mut stats: Vec<DifficultyStats> = groups
            .into_iter()
            .map(|(difficulty, tours)| {
                let n = tours.len() as f64;
                DifficultyStats {
                    difficulty: difficulty.to_uppercase(),
                    num_tours: tours.len() as i64,
                    num_ratings: tours.iter().map(|t| i64::from(t.ratings_quantity)).sum(),
                    avg_rating: tours.iter().map(|t| t.ratings_average).sum::<f64>() / n,
                    avg_price: tours.iter().map(|t| t.price).sum::<f64>() / n,
                    min_price: tours.iter().map(|t| t.price).fold(f64::INFINITY, f64::min),
                    max_price: tours
                        .iter()
                        .map(|t| t.price)
                        .fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
        Ok(stats)
    }

    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthPlan>, StoreError> {
        let (from, to) = year_bounds(year)?;
        let inner = self.inner.read().await;
        let mut months: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for tour in inner.tours.iter().filter(|t| !t.secret_tour) {
            for date in tour.start_dates.iter().filter(|d| **d >= from && **d < to) {
                let month = i32::from(u8::from(date.to_offset(UtcOffset::UTC).month()));
                months.entry(month).or_default().push(tour.name.clone());
            }
        }

        let mut plan: Vec<MonthPlan> = months
            .into_iter()
            .map(|(month, mut tours)| {
                tours.sort();
                MonthPlan {
                    month,
                    num_tour_starts: tours.len() as i64,
                    tours,
                }
            })
            .collect();
        plan.sort_by(|a, b| {
            b.num_tour_starts
                .cmp(&a.num_tour_starts)
                .then(a.month.cmp(&b.month))
        });
        plan.truncate(12);
        Ok(plan)
    }
}

// --- reviews ---

#[async_trait]
impl ResourceStore<Review> for MemoryStore {
    async fn insert(&self, input: ReviewInput) -> Result<Review, StoreError> {
        let (Some(tour_id), Some(user_id)) = (input.tour, input.user) else {
            return Err(StoreError::Invalid(
                "Review must belong to a tour and a user".into(),
            ));
        };
        let rating = input
            .rating
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| StoreError::Invalid(check_message(Some("reviews_rating_check")).into()))?;

        let mut inner = self.inner.write().await;
        if !inner.tours.iter().any(|t| t.id == tour_id) {
            return Err(StoreError::MissingReference(referenced(Some(
                "reviews_tour_id_fkey",
            ))));
        }
        if !inner.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::MissingReference(referenced(Some(
                "reviews_user_id_fkey",
            ))));
        }
        if inner
            .reviews
            .iter()
            .any(|r| r.tour_id == tour_id && r.user_id == user_id)
        {
            return Err(StoreError::Duplicate(
                unique_field(Some("reviews_one_per_user")).into(),
            ));
        }
        let review = Review {
            id: Uuid::new_v4(),
            review: input.review,
            rating,
            tour_id,
            user_id,
            author_name: None,
            author_photo: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.reviews.push(review.clone());
        Ok(inner.review_details(&review))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .reviews
            .iter()
            .find(|r| r.id == id)
            .map(|r| inner.review_details(r)))
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<Review>, StoreError> {
        let inner = self.inner.read().await;
        let detailed: Vec<Review> = inner
            .reviews
            .iter()
            .map(|r| inner.review_details(r))
            .collect();
        run_query(detailed.iter(), spec)
    }

    async fn update(&self, id: Uuid, patch: ReviewPatch) -> Result<Option<Review>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(review) = inner.reviews.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(text) = patch.review {
            review.review = text;
        }
        if let Some(rating) = patch.rating {
            review.rating = rating;
        }
        let updated = review.clone();
        Ok(Some(inner.review_details(&updated)))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(pos) = inner.reviews.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        Ok(Some(inner.reviews.remove(pos)))
    }

    async fn after_write(&self, review: &Review) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let ratings: Vec<i32> = inner
            .reviews
            .iter()
            .filter(|r| r.tour_id == review.tour_id)
            .map(|r| r.rating)
            .collect();
        if let Some(tour) = inner.tours.iter_mut().find(|t| t.id == review.tour_id) {
            tour.ratings_quantity = ratings.len() as i32;
            tour.ratings_average = if ratings.is_empty() {
                DEFAULT_RATING
            } else {
                round_rating(
                    ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64,
                )
            };
        }
        Ok(())
    }
}
