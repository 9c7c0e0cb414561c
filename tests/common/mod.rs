// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;
use vidtube_accounts::config::Config;
use vidtube_accounts::db::{FirestoreDb, MemoryUserStore};
use vidtube_accounts::routes::create_router;
use vidtube_accounts::services::MemoryMediaHost;
use vidtube_accounts::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Router plus handles on the in-memory backends behind it.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryUserStore>,
    pub media: Arc<MemoryMediaHost>,
    pub upload_dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Number of files left in the upload directory.
    pub fn leftover_uploads(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Create a test app over in-memory storage and media host.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let mut config = Config::test_default();
    config.upload_dir = upload_dir.path().to_path_buf();

    let store = Arc::new(MemoryUserStore::new());
    let media = Arc::new(MemoryMediaHost::new());
    let state = Arc::new(AppState::new(config, store.clone(), media.clone()));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        media,
        upload_dir,
    }
}

/// Minimal multipart/form-data encoder.
#[allow(dead_code)]
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBuilder {
    const BOUNDARY: &'static str = "----vidtube-test-boundary";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                Self::BOUNDARY,
                name,
                value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                Self::BOUNDARY,
                name,
                file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Finish the body and build a request.
    pub fn build(mut self, method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", Self::BOUNDARY).as_bytes());
        let mut builder = Request::builder().method(method).uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", Self::BOUNDARY),
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

/// Multipart registration form for a user.
#[allow(dead_code)]
pub fn registration(username: &str, email: &str, password: &str) -> MultipartBuilder {
    MultipartBuilder::new()
        .text("fullName", "Ada Lovelace")
        .text("username", username)
        .text("email", email)
        .text("password", password)
        .file("avatar", "avatar.png", b"\x89PNG avatar bytes")
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Value of a cookie set by the response, if any.
#[allow(dead_code)]
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookie_headers(response).into_iter().find_map(|header| {
        header
            .strip_prefix(&prefix)
            .map(|rest| rest.split(';').next().unwrap_or("").to_string())
    })
}

/// Register `ada` and return the response JSON.
#[allow(dead_code)]
pub async fn register_ada(app: &TestApp) -> serde_json::Value {
    let response = app
        .send(registration("Ada", "ada@x.com", "s3cret").build("POST", "/api/v1/users/register", None))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await
}

/// Log `ada` in and return `(accessToken, refreshToken)`.
#[allow(dead_code)]
pub async fn login_ada(app: &TestApp) -> (String, String) {
    let response = app
        .send(json_request(
            "POST",
            "/api/v1/users/login",
            serde_json::json!({"username": "ada", "password": "s3cret"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let access = cookie_value(&response, "accessToken").unwrap();
    let refresh = cookie_value(&response, "refreshToken").unwrap();
    (access, refresh)
}
