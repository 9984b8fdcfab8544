use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{sql, PgStore};
use crate::query::QuerySpec;
use crate::resources::ResourceStore;
use crate::reviews::model::{of_tour, Review, REVIEW_FIELDS};
use crate::store::{year_bounds, DifficultyStats, MonthPlan, StoreError, TourCatalog};
use crate::tours::model::{slugify, Tour, TourInput, TourPatch};

const VISIBLE: &str = "\"secret_tour\" = FALSE";

#[async_trait]
impl ResourceStore<Tour> for PgStore {
    async fn insert(&self, t: TourInput) -> Result<Tour, StoreError> {
        let row = sqlx::query_as::<_, Tour>(
            r#"
            INSERT INTO tours (
                id, name, slug, duration, max_group_size, difficulty, price,
                price_discount, summary, description, image_cover, images,
                start_dates, secret_tour, guides
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&t.name)
        .bind(slugify(&t.name))
        .bind(t.duration)
        .bind(t.max_group_size)
        .bind(t.difficulty)
        .bind(t.price)
        .bind(t.price_discount)
        .bind(&t.summary)
        .bind(&t.description)
        .bind(&t.image_cover)
        .bind(&t.images)
        .bind(&t.start_dates)
        .bind(t.secret_tour)
        .bind(&t.guides)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tour>, StoreError> {
        let row = sqlx::query_as::<_, Tour>(
            r#"SELECT * FROM tours WHERE id = $1 AND secret_tour = FALSE"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<Tour>, StoreError> {
        Ok(sql::select("tours", Some(VISIBLE), spec)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update(&self, id: Uuid, patch: TourPatch) -> Result<Option<Tour>, StoreError> {
        let slug = patch.name.as_deref().map(slugify);
        let row = sqlx::query_as::<_, Tour>(
            r#"
            UPDATE tours
            SET name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                duration = COALESCE($4, duration),
                max_group_size = COALESCE($5, max_group_size),
                difficulty = COALESCE($6, difficulty),
                price = COALESCE($7, price),
                price_discount = COALESCE($8, price_discount),
                summary = COALESCE($9, summary),
                description = COALESCE($10, description),
                image_cover = COALESCE($11, image_cover),
                images = COALESCE($12, images),
                start_dates = COALESCE($13, start_dates),
                secret_tour = COALESCE($14, secret_tour),
                guides = COALESCE($15, guides)
            WHERE id = $1 AND secret_tour = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(slug)
        .bind(patch.duration)
        .bind(patch.max_group_size)
        .bind(patch.difficulty)
        .bind(patch.price)
        .bind(patch.price_discount)
        .bind(patch.summary)
        .bind(patch.description)
        .bind(patch.image_cover)
        .bind(patch.images)
        .bind(patch.start_dates)
        .bind(patch.secret_tour)
        .bind(patch.guides)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Tour>, StoreError> {
        let row = sqlx::query_as::<_, Tour>(
            r#"DELETE FROM tours WHERE id = $1 AND secret_tour = FALSE RETURNING *"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn populate(&self, tour: &Tour, doc: &mut Value) -> Result<(), StoreError> {
        let spec = QuerySpec::scoped(REVIEW_FIELDS, vec![of_tour(tour.id)]);
        let reviews: Vec<Review> = sql::select("review_details", None, &spec)
            .fetch_all(&self.pool)
            .await?;
        doc["reviews"] = serde_json::to_value(reviews)?;
        Ok(())
    }
}

#[async_trait]
impl TourCatalog for PgStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tour>, StoreError> {
        let row = sqlx::query_as::<_, Tour>(
            r#"
            SELECT * FROM tours
            WHERE slug = $1 AND secret_tour = FALSE
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn tour_stats(&self) -> Result<Vec<DifficultyStats>, StoreError> {
        let rows = sqlx::query_as::<_, DifficultyStats>(
            r#"
            SELECT UPPER(difficulty::text)            AS difficulty,
                   COUNT(*)                           AS num_tours,
                   COALESCE(SUM(ratings_quantity), 0)::bigint AS num_ratings,
                   AVG(ratings_average)               AS avg_rating,
                   AVG(price)                         AS avg_price,
                   MIN(price)                         AS min_price,
                   MAX(price)                         AS max_price
            FROM tours
            WHERE ratings_average >= 4.5 AND secret_tour = FALSE
            GROUP BY difficulty
            ORDER BY avg_price ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthPlan>, StoreError> {
        let (from, to) = year_bounds(year)?;
        let rows = sqlx::query_as::<_, MonthPlan>(
            r#"
            SELECT EXTRACT(MONTH FROM d AT TIME ZONE 'UTC')::int AS month,
                   COUNT(*)                                     AS num_tour_starts,
                   ARRAY_AGG(t.name ORDER BY t.name)            AS tours
            FROM tours t, UNNEST(t.start_dates) AS d
            WHERE d >= $1 AND d < $2 AND t.secret_tour = FALSE
            GROUP BY 1
            ORDER BY num_tour_starts DESC, month ASC
            LIMIT 12
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
