use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub environment: Environment,
    pub jwt: JwtConfig,
    pub reset_ttl_minutes: i64,
    /// Base URL used when building links sent by email.
    pub public_url: String,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tourbook".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tourbook-users".into()),
            ttl_minutes: env_i64("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 90),
        };
        Ok(Self {
            database_url,
            environment: Environment::from_env(),
            jwt,
            reset_ttl_minutes: env_i64("RESET_TOKEN_TTL_MINUTES").unwrap_or(10),
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            minio_endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            minio_bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "tourbook".into()),
            minio_access_key: std::env::var("MINIO_ACCESS_KEY").unwrap_or_default(),
            minio_secret_key: std::env::var("MINIO_SECRET_KEY").unwrap_or_default(),
        })
    }

    /// Session cookies carry the `Secure` attribute outside local development.
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}
