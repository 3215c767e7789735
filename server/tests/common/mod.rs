//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use dzi_server::{
    AppState, AssetStore, OutputFormat, PyramidError, PyramidGenerator, PyramidHandle,
    StorageLayout, build_router,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const BOUNDARY: &str = "dzi-test-boundary";

/// Generator double that writes a small pyramid and counts its invocations
#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl PyramidGenerator for StubGenerator {
    async fn generate(
        &self,
        _source: &Path,
        destination_prefix: &Path,
        format: OutputFormat,
    ) -> Result<PyramidHandle, PyramidError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PyramidError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "not a known image format".to_string(),
            });
        }

        let ext = match format {
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
            OutputFormat::Default | OutputFormat::Jpeg => "jpeg",
        };
        let handle = PyramidHandle::from_prefix(destination_prefix);
        for level in ["0", "1", "8"] {
            let dir = handle.tiles_dir.join(level);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(format!("0_0.{}", ext)), b"tile")?;
        }
        std::fs::write(&handle.descriptor, "<Image/>")?;
        Ok(handle)
    }
}

/// A running router over a temporary storage root
pub struct TestApp {
    pub router: Router,
    pub store: Arc<AssetStore>,
    pub generator: Arc<StubGenerator>,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let generator = Arc::new(StubGenerator::default());
        let store = AssetStore::new(
            StorageLayout::new(dir.path().join("data")),
            generator.clone(),
        );
        store.init().await.expect("Failed to init store");
        let store = Arc::new(store);

        let router = build_router(AppState::new(Arc::clone(&store)));
        Self {
            router,
            store,
            generator,
            dir,
        }
    }

    pub fn generator_calls(&self) -> usize {
        self.generator.calls.load(Ordering::SeqCst)
    }

    /// Send a request and return status plus the parsed JSON body (Null when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.send(json_request("POST", uri, body)).await
    }

    pub async fn put_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(json_request("PUT", uri, body)).await
    }

    /// Upload `bytes` as `filename` with an optional format field
    pub async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        format: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::post("/assets")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(filename, bytes, format)))
            .unwrap();
        self.send(request).await
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// Encode a multipart/form-data body with a `file` part and optional `format` part
pub fn multipart_body(filename: &str, bytes: &[u8], format: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(format) = format {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"format\"\r\n\r\n{}\r\n",
                BOUNDARY, format
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dzi_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
