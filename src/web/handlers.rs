use askama::Template;
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiFailure, ApiResponse, AppState};
use crate::store::{
    DEFAULT_RELOAD_INTERVAL_SECS, EXPORT_FILE_NAME, ImportSummary, MAX_RELOAD_INTERVAL_SECS, Settings, StoreStatus,
};

#[derive(Template)]
#[template(path = "popup.html")]
pub struct PopupTemplate {
    pub interval: u64,
    pub enabled: bool,
    pub seen_items: usize,
    pub seen_post_ids: usize,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct StartRequest {
    /// Seconds between reloads; missing or non-positive means the default.
    #[validate(range(max = 86400))]
    pub interval: Option<i64>,
}

impl StartRequest {
    pub fn interval_secs(&self) -> u64 {
        match self.interval {
            Some(secs) if secs > 0 => (secs as u64).min(MAX_RELOAD_INTERVAL_SECS),
            _ => DEFAULT_RELOAD_INTERVAL_SECS,
        }
    }
}

pub async fn popup_page(State(state): State<AppState>) -> PopupTemplate {
    let status = state.store.status().await;
    PopupTemplate {
        interval: status.settings.reload_interval,
        enabled: status.settings.notifier_enabled,
        seen_items: status.seen_items,
        seen_post_ids: status.seen_post_ids,
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Json<ApiResponse<StoreStatus>> {
    Json(ApiResponse::success(state.store.status().await))
}

pub async fn start_notifier(
    State(state): State<AppState>,
    request: Option<Json<StartRequest>>,
) -> Result<Json<ApiResponse<Settings>>, ApiFailure> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate().map_err(crate::AppError::from)?;

    let settings = state.store.start(request.interval_secs()).await?;
    tracing::info!("Notifier enabled, reloading every {}s", settings.reload_interval);
    Ok(Json(ApiResponse::success(settings)))
}

pub async fn stop_notifier(State(state): State<AppState>) -> Result<Json<ApiResponse<Settings>>, ApiFailure> {
    let settings = state.store.stop().await?;
    tracing::info!("Notifier disabled");
    Ok(Json(ApiResponse::success(settings)))
}

pub async fn export_seen(State(state): State<AppState>) -> Result<Response, ApiFailure> {
    let body = state.store.export_seen().await?;
    let disposition = format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn import_seen(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ApiResponse<ImportSummary>>, ApiFailure> {
    let summary = state.store.import_seen(&body).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
