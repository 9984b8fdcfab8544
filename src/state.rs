use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};

use crate::config::{AppConfig, Environment, JwtConfig};
use crate::mailer::{LogMailer, Mailer, OutboxMailer};
use crate::resources::ResourceStore;
use crate::reviews::model::Review;
use crate::storage::{MemoryStorage, Storage, StorageClient};
use crate::store::{MemoryStore, PgStore, Stores, TourCatalog};
use crate::tours::model::Tour;
use crate::users::model::User;
use crate::views::{Renderer, ShellRenderer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    /// Wires the production collaborators. Without `DATABASE_URL` the data
    /// lives in memory for the lifetime of the process.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let stores = match config.database_url.as_deref() {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                if let Err(e) = sqlx::migrate!("./migrations").run(pg.pool()).await {
                    warn!(error = %e, "migrations folder not found or migration failed; continuing");
                }
                Stores::from_backend(Arc::new(pg))
            }
            None => {
                warn!("DATABASE_URL not set, using the in-memory store");
                Stores::from_backend(Arc::new(MemoryStore::new()))
            }
        };

        let storage = Arc::new(
            Storage::new(
                &config.minio_endpoint,
                &config.minio_bucket,
                &config.minio_access_key,
                &config.minio_secret_key,
                "us-east-1",
            )
            .await?,
        ) as Arc<dyn StorageClient>;

        info!(environment = ?config.environment, "state initialised");
        Ok(Self {
            config,
            stores,
            storage,
            mailer: Arc::new(LogMailer),
            renderer: Arc::new(ShellRenderer),
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        stores: Stores,
        storage: Arc<dyn StorageClient>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            stores,
            storage,
            mailer,
            renderer: Arc::new(ShellRenderer),
        }
    }

    /// Fully in-memory state for tests.
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(Self::test_config()),
            Stores::from_backend(Arc::new(MemoryStore::new())),
            Arc::new(MemoryStorage::new()),
            Arc::new(OutboxMailer::new()),
        )
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: None,
            environment: Environment::Development,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            reset_ttl_minutes: 10,
            public_url: "http://localhost:8080".into(),
            minio_endpoint: "fake".into(),
            minio_bucket: "fake".into(),
            minio_access_key: "fake".into(),
            minio_secret_key: "fake".into(),
        }
    }
}

impl FromRef<AppState> for Arc<dyn ResourceStore<User>> {
    fn from_ref(state: &AppState) -> Self {
        state.stores.users.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ResourceStore<Tour>> {
    fn from_ref(state: &AppState) -> Self {
        state.stores.tours.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ResourceStore<Review>> {
    fn from_ref(state: &AppState) -> Self {
        state.stores.reviews.clone()
    }
}

impl FromRef<AppState> for Arc<dyn TourCatalog> {
    fn from_ref(state: &AppState) -> Self {
        state.stores.catalog.clone()
    }
}
