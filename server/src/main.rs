use axum::{Router, response::IntoResponse, routing::get};
use dzi_server::config::Config;
use dzi_server::{AppState, AssetStore, StorageLayout, VipsPyramidGenerator, build_router};
use dzi_server::{OutputFormat, PyramidGenerator};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dzi_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, data_dir={:?}",
        config.host, config.port, config.storage.data_dir
    );
    if let Some(ref base_url) = config.public_base_url {
        info!("Public base URL: {}", base_url);
    }
    if let Some(timeout) = config.generator.timeout {
        info!("Pyramid generation timeout: {:?}", timeout);
    }

    let generator: Arc<dyn PyramidGenerator> =
        Arc::new(VipsPyramidGenerator::new(&config.generator));
    info!("Using tiler: {:?}", config.generator.vips_binary);

    let store = AssetStore::new(StorageLayout::new(&config.storage.data_dir), generator)
        .with_public_base_url(config.public_base_url.clone())
        .with_sample_id(Some(config.sample.asset_id.clone()));
    store.init().await?;

    // A missing or broken sample never prevents startup
    match store
        .provision_sample(&config.sample.path, OutputFormat::Default)
        .await
    {
        Ok(Some(asset)) => info!("Sample asset ready: {}", asset.id),
        Ok(None) => {}
        Err(e) => warn!(
            "Failed to provision sample asset from {:?}: {}",
            config.sample.path, e
        ),
    }

    let app_state = AppState::new(Arc::new(store))
        .with_max_upload_size(config.upload.max_upload_size)
        .with_cors_allow_any(config.cors_allow_any);

    let app = Router::new()
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(build_router(app_state));

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Deep Zoom server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
