use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{sql, PgStore};
use crate::query::QuerySpec;
use crate::resources::{NotCreatable, ResourceStore};
use crate::store::{StoreError, UserStore};
use crate::users::model::{NewUser, User, UserPatch};

const ACTIVE: &str = "\"active\" = TRUE";

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"SELECT * FROM users WHERE id = $1 AND active = TRUE"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"SELECT * FROM users WHERE email = $1 AND active = TRUE"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE password_reset_token = $1
              AND password_reset_expires > $2
              AND active = TRUE
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn store_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = $3,
                password_reset_token = NULL,
                password_reset_expires = NULL
            WHERE id = $1 AND active = TRUE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), StoreError> {
        let (hash, expires) = token.unzip();
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $2, password_reset_expires = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceStore<User> for PgStore {
    async fn insert(&self, input: NotCreatable) -> Result<User, StoreError> {
        match input {}
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.find_user(id).await
    }

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<User>, StoreError> {
        Ok(sql::select("users", Some(ACTIVE), spec)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                photo = COALESCE($5, photo)
            WHERE id = $1 AND active = TRUE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.role)
        .bind(patch.photo)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Users are deactivated, never removed.
    async fn delete(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"UPDATE users SET active = FALSE WHERE id = $1 AND active = TRUE RETURNING *"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
