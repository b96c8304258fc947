use axum::{
    Router,
    response::Json,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::Result;
use crate::config::ServerConfig;
use crate::store::StateStore;

pub mod handlers;
pub mod responses;

pub use handlers::{export_seen, get_settings, import_seen, popup_page, start_notifier, stop_notifier};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
    pub metrics: Option<PrometheusHandle>,
    pub metrics_endpoint: String,
}

pub fn create_router(state: AppState) -> Router {
    let metrics_endpoint = state.metrics_endpoint.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(popup_page))
        .nest("/api", api_routes())
        .route(&metrics_endpoint, get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/start", post(start_notifier))
        .route("/stop", post(stop_notifier))
        .route("/export", get(export_seen))
        .route("/import", post(import_seen))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "posts-notifier"
    }))
}

pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("Control page listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
