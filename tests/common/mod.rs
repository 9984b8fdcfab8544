#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tourbook::{
    app::build_app,
    mailer::{Email, Mailer, OutboxMailer},
    resources::ResourceStore,
    state::AppState,
    storage::MemoryStorage,
    store::{MemoryStore, Stores},
    users::model::{Role, User, UserPatch},
};

pub const PASSWORD: &str = "pass1234";

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<OutboxMailer>,
    pub storage: Arc<MemoryStorage>,
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: Email) -> anyhow::Result<()> {
        anyhow::bail!("smtp unreachable")
    }
}

fn build(mailer: Option<Arc<dyn Mailer>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(OutboxMailer::new());
    let storage = Arc::new(MemoryStorage::new());
    let mailer: Arc<dyn Mailer> = match mailer {
        Some(mailer) => mailer,
        None => outbox.clone(),
    };
    let state = AppState::from_parts(
        Arc::new(AppState::test_config()),
        Stores::from_backend(store.clone()),
        storage.clone(),
        mailer,
    );
    TestApp {
        app: build_app(state),
        store,
        outbox,
        storage,
    }
}

pub fn test_app() -> TestApp {
    build(None)
}

pub fn app_with_failing_mailer() -> TestApp {
    build(Some(Arc::new(FailingMailer)))
}

pub fn tour_body(name: &str, price: f64) -> Value {
    json!({
        "name": name,
        "duration": 5,
        "maxGroupSize": 10,
        "difficulty": "easy",
        "price": price,
        "summary": "Breathtaking hike",
        "imageCover": "cover.jpg",
    })
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Reply {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        };
        self.send(req.unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.call(Method::GET, uri, token, None).await
    }

    /// Signs up a user and returns `(id, token)`.
    pub async fn signup(&self, name: &str, email: &str) -> (Uuid, String) {
        let reply = self
            .call(
                Method::POST,
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": PASSWORD,
                    "passwordConfirm": PASSWORD,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text);
        let id = reply.body["data"]["user"]["id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap();
        let token = reply.body["token"].as_str().unwrap().to_string();
        (id, token)
    }

    /// Signs up a user and promotes them to `role`.
    pub async fn user_with_role(&self, email: &str, role: Role) -> (Uuid, String) {
        let (id, token) = self.signup("Staff Member", email).await;
        let patch = UserPatch {
            role: Some(role),
            ..UserPatch::default()
        };
        ResourceStore::<User>::update(self.store.as_ref(), id, patch)
            .await
            .unwrap()
            .unwrap();
        (id, token)
    }

    pub async fn create_tour(&self, token: &str, name: &str, price: f64) -> Value {
        let reply = self
            .call(
                Method::POST,
                "/api/v1/tours",
                Some(token),
                Some(tour_body(name, price)),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text);
        reply.body["data"].clone()
    }
}

/// Multipart body with one file per `(field, content type)` pair.
pub fn multipart(boundary: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (n, (field, content_type)) in files.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"file{n}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"binary-image-data\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
