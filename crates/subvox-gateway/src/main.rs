//! Axum gateway for the subvox pipeline. Config-driven via PipelineConfig.
//!
//! Routes: session start (multipart upload), live SSE delivery, status
//! query, stop, remote fetch, and static serving of the media directory.
//! Adapters are built once at startup and injected through `AppState`.

mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use handlers::streams;
use std::net::SocketAddr;
use std::sync::Arc;
use subvox_core::{
    create_synthesizer, create_translator, PipelineConfig, SessionRegistry, SynthesisBackend,
    TranslationBackend,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared state: the session table, the startup config, and the two
/// slow-service adapters every worker uses.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<PipelineConfig>,
    pub translator: Arc<dyn TranslationBackend>,
    pub synthesizer: Arc<dyn SynthesisBackend>,
}

fn router(state: AppState) -> Router {
    let media_dir = state.config.media_dir.clone();
    Router::new()
        .route(
            "/api/v1/streams",
            post(streams::create_stream).layer(DefaultBodyLimit::max(512 * 1024 * 1024)),
        )
        .route("/api/v1/streams/:id", get(streams::stream_status))
        .route("/api/v1/streams/:id/live", get(streams::live_stream))
        .route("/api/v1/streams/:id/stop", post(streams::stop_stream))
        .route("/api/v1/fetch", post(streams::fetch_media))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(PipelineConfig::from_env());
    std::fs::create_dir_all(&config.media_dir).expect("create media dir");

    let registry = Arc::new(SessionRegistry::new());
    let translator: Arc<dyn TranslationBackend> =
        Arc::from(create_translator(&config).expect("init translator"));
    let synthesizer: Arc<dyn SynthesisBackend> =
        Arc::from(create_synthesizer(&config).expect("init synthesizer"));

    // Opt-in expiry sweep for completed sessions (SUBVOX_SESSION_TTL_SECS).
    if let Some(ttl) = config.session_ttl {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                registry.evict_completed(ttl);
            }
        });
    }

    let state = AppState {
        registry,
        config: Arc::clone(&config),
        translator,
        synthesizer,
    };
    let app = router(state);

    let addr: SocketAddr = std::env::var("SUBVOX_BIND")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));
    tracing::info!("subvox gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind gateway address");
    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested (Ctrl+C)");
        }
    }
}
