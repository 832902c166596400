use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use slidecast_server::config::Config;
use slidecast_server::server::{AppState, ws_handler};
use slidecast_server::store::{
    MemoryPresentationStore, MemorySlideStore, Presentation, PresentationStore, SlideStore,
};
use slidecast_server::sweeper::{InactivitySweeper, SweeperConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    websocket: &'static str,
    uptime_seconds: u64,
}

async fn health() -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        websocket: "ready",
        uptime_seconds: uptime,
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    /// Server uptime in seconds
    uptime_seconds: u64,
    /// Server version
    version: &'static str,
    /// Number of live participant sessions
    active_sessions: usize,
    /// Total WebSocket connections
    total_connections: usize,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    let (sessions, connections) = state.get_stats().await;

    Json(MetricsResponse {
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: sessions,
        total_connections: connections,
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus handle not initialized");
    handle.render()
}

/// Update gauge metrics for sessions and connections (called periodically)
async fn update_gauge_metrics(state: &AppState) {
    let (sessions, connections) = state.get_stats().await;

    metrics::gauge!("slidecast_sessions_active").set(sessions as f64);
    metrics::gauge!("slidecast_ws_connections_active").set(connections as f64);

    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    metrics::gauge!("slidecast_uptime_seconds").set(uptime as f64);
}

/// Seed the demo presentation so a bare server is immediately joinable
async fn seed_demo(
    config: &Config,
    presentations: &MemoryPresentationStore,
    slides: &MemorySlideStore,
) {
    let id = Uuid::new_v4().to_string();
    presentations
        .insert(Presentation {
            id: id.clone(),
            access_code: config.demo.access_code.clone(),
            presenter_id: config.demo.presenter_id.clone(),
            title: "Demo presentation".to_string(),
            is_active: false,
            current_slide_index: 0,
            expires_at: None,
        })
        .await;
    slides.set_count(&id, config.demo.slide_count).await;
    info!(
        "Demo presentation {} seeded with access code {} ({} slides)",
        id, config.demo.access_code, config.demo.slide_count
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics();
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidecast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    if let Some(ref base_url) = config.public_base_url {
        info!("Public base URL: {}", base_url);
    }

    // Record stores; the in-memory backend serves until a database-backed
    // implementation is plugged in behind the same traits
    let presentation_store = Arc::new(MemoryPresentationStore::new());
    let slide_store = Arc::new(MemorySlideStore::new());

    if config.demo.enabled {
        seed_demo(&config, &presentation_store, &slide_store).await;
    }

    let presentations: Arc<dyn PresentationStore> = presentation_store;
    let slides: Arc<dyn SlideStore> = slide_store;
    let app_state = AppState::new(&config, presentations, slides);

    // Background eviction of abandoned sessions
    let sweeper = InactivitySweeper::new(
        app_state.registry.clone(),
        app_state.rooms.clone(),
        SweeperConfig {
            interval: config.session.sweep_interval,
            max_idle: config.session.max_idle,
        },
    );
    let sweeper_handle = sweeper.spawn();

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_state).await;
        }
    });

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SlideCast server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the sweeper without dropping an in-flight tick
    sweeper_handle.stop().await;

    Ok(())
}
