use std::{collections::HashMap, sync::Mutex};

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::{async_trait, extract::Multipart};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

/// S3-compatible object storage (MinIO in development).
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}

/// Objects kept in a map, for tests and runs without object storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (String, Bytes)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow::anyhow!("storage poisoned"))?
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow::anyhow!("storage poisoned"))?
            .remove(key);
        Ok(())
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// One uploaded image taken from a multipart form field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub field: String,
    pub body: Bytes,
    pub content_type: String,
}

impl ImageUpload {
    pub fn ext(&self) -> &'static str {
        ext_from_mime(&self.content_type).unwrap_or("bin")
    }
}

/// Reads every file of a multipart form. Only fields named in `allowed` are
/// accepted and each file must be an image.
pub async fn read_images(
    mut form: Multipart,
    allowed: &[&str],
) -> Result<Vec<ImageUpload>, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if !allowed.contains(&name.as_str()) {
            warn!(field = %name, "unexpected upload field");
            return Err(AppError::Validation(format!("Unexpected field: {name}")));
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") || ext_from_mime(&content_type).is_none() {
            return Err(AppError::Validation(
                "Not an image! Please upload only images.".into(),
            ));
        }

        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        uploads.push(ImageUpload {
            field: name,
            body,
            content_type,
        });
    }
    Ok(uploads)
}

/// `<prefix>/<prefix-singular>-<owner>-<unix ms>-<label>.<ext>`.
pub fn image_key(prefix: &str, owner: Uuid, label: &str, ext: &str) -> String {
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let kind = prefix.trim_end_matches('s');
    format!("{prefix}/{kind}-{owner}-{stamp}-{label}.{ext}")
}

/// Uploads `(key, image)` pairs in order. If one fails, the ones already
/// written are removed again.
pub async fn put_all(
    storage: &dyn StorageClient,
    items: Vec<(String, ImageUpload)>,
) -> anyhow::Result<Vec<String>> {
    let mut written: Vec<String> = Vec::with_capacity(items.len());
    for (key, img) in items {
        if let Err(e) = storage.put_object(&key, img.body, &img.content_type).await {
            for done in &written {
                if let Err(cleanup) = storage.delete_object(done).await {
                    warn!(key = %done, error = %cleanup, "orphaned upload");
                }
            }
            return Err(e.context(format!("put_object {key}")));
        }
        debug!(%key, "image stored");
        written.push(key);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(ct: &str) -> ImageUpload {
        ImageUpload {
            field: "images".into(),
            body: Bytes::from_static(b"img"),
            content_type: ct.into(),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn keys_name_owner_and_label() {
        let owner = Uuid::new_v4();
        let key = image_key("tours", owner, "cover", "jpg");
        assert!(key.starts_with(&format!("tours/tour-{owner}-")));
        assert!(key.ends_with("-cover.jpg"));
    }

    struct FailSecond(MemoryStorage);

    #[async_trait]
    impl StorageClient for FailSecond {
        async fn put_object(&self, key: &str, body: Bytes, ct: &str) -> anyhow::Result<()> {
            if key.ends_with("2.png") {
                anyhow::bail!("disk full");
            }
            self.0.put_object(key, body, ct).await
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.0.delete_object(key).await
        }
    }

    #[tokio::test]
    async fn put_all_stores_every_item() {
        let storage = MemoryStorage::new();
        let keys = put_all(
            &storage,
            vec![("a/1.png".into(), upload("image/png")), ("a/2.png".into(), upload("image/png"))],
        )
        .await
        .unwrap();
        assert_eq!(keys, vec!["a/1.png", "a/2.png"]);
        assert_eq!(storage.keys().len(), 2);
    }

    #[tokio::test]
    async fn put_all_removes_partial_uploads_on_failure() {
        let storage = FailSecond(MemoryStorage::new());
        let err = put_all(
            &storage,
            vec![("a/1.png".into(), upload("image/png")), ("a/2.png".into(), upload("image/png"))],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("a/2.png"));
        assert!(storage.0.keys().is_empty());
    }
}
