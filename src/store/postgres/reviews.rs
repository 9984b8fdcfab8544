use async_trait::async_trait;
use uuid::Uuid;

use super::{sql, PgStore};
use crate::query::QuerySpec;
use crate::resources::ResourceStore;
use crate::reviews::model::{Review, ReviewInput, ReviewPatch};
use crate::store::StoreError;
use crate::tours::model::DEFAULT_RATING;

#[async_trait]
impl ResourceStore<Review> for PgStore {
    async fn insert(&self, input: ReviewInput) -> Result<Review, StoreError> {
        let (Some(tour_id), Some(user_id)) = (input.tour, input.user) else {
            return Err(StoreError::Invalid(
                "Review must belong to a tour and a user".into(),
            ));
        };
        let row = sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (id, review, rating, tour_id, user_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            SELECT i.*, u.name AS author_name, u.photo AS author_photo
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.review)
        .bind(input.rating)
        .bind(tour_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, Review>(r#"SELECT * FROM review_details WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<Review>, StoreError> {
        Ok(sql::select("review_details", None, spec)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update(&self, id: Uuid, patch: ReviewPatch) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET review = COALESCE($2, review),
                    rating = COALESCE($3, rating)
                WHERE id = $1
                RETURNING *
            )
            SELECT r.*, u.name AS author_name, u.photo AS author_photo
            FROM updated r
            JOIN users u ON u.id = r.user_id
            "#,
        )
        .bind(id)
        .bind(patch.review)
        .bind(patch.rating)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, Review>(r#"DELETE FROM reviews WHERE id = $1 RETURNING *"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Recomputes the parent tour's rating count and average in one statement.
    async fn after_write(&self, review: &Review) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE tours t
            SET ratings_quantity = s.n,
                ratings_average = s.avg
            FROM (
                SELECT COUNT(*)::int AS n,
                       COALESCE(ROUND(AVG(rating)::numeric, 1)::float8, $2) AS avg
                FROM reviews
                WHERE tour_id = $1
            ) s
            WHERE t.id = $1
            "#,
        )
        .bind(review.tour_id)
        .bind(DEFAULT_RATING)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
