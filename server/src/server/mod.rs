//! Router assembly and shared application state

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::annotation::{AnnotationAppState, AnnotationManager, annotation_routes};
use crate::asset::{AssetAppState, AssetStore, PYRAMID_FILES_ROUTE, asset_routes};
use crate::config::UploadConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AssetStore>,
    pub annotations: Arc<AnnotationManager>,
    pub max_upload_size: usize,
    pub cors_allow_any: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<AssetStore>) -> Self {
        Self {
            annotations: Arc::new(AnnotationManager::new(Arc::clone(&store))),
            store,
            max_upload_size: UploadConfig::default().max_upload_size,
            cors_allow_any: true,
            started_at: Instant::now(),
        }
    }

    pub fn with_max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn with_cors_allow_any(mut self, allow: bool) -> Self {
        self.cors_allow_any = allow;
        self
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut storage_ready = true;
    for dir in state.store.layout().directories() {
        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        storage_ready &= is_dir;
    }

    let (http_status, status, storage) = if storage_ready {
        (StatusCode::OK, "healthy", "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            storage,
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    )
}

/// Build the full HTTP surface: asset and annotation APIs, pyramid files and health
pub fn build_router(state: AppState) -> Router {
    let asset_api = asset_routes(AssetAppState {
        store: Arc::clone(&state.store),
        max_upload_size: state.max_upload_size,
    });
    let annotation_api = annotation_routes(AnnotationAppState {
        manager: Arc::clone(&state.annotations),
    });
    let pyramid_files = ServeDir::new(state.store.layout().pyramids_dir());
    let cors_allow_any = state.cors_allow_any;

    let app = Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(asset_api)
        .merge(annotation_api)
        .nest_service(PYRAMID_FILES_ROUTE, pyramid_files)
        .layer(TraceLayer::new_for_http());

    if cors_allow_any {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}
