use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use posts_notifier::SeenKind;
use posts_notifier::web::{AppState, create_router};

use super::*;

fn router(store: StateStore) -> Router {
    create_router(AppState {
        store,
        metrics: None,
        metrics_endpoint: "/metrics".to_string(),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (_dir, store) = temp_store().await;
    let response = router(store)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_start_with_interval() {
    let (_dir, store) = temp_store().await;
    let response = router(store.clone())
        .oneshot(post_json("/api/start", r#"{"interval": 120}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["reload_interval"], 120);

    let settings = store.settings().await;
    assert!(settings.notifier_enabled);
    assert_eq!(settings.reload_interval, 120);
}

#[tokio::test]
async fn test_start_without_body_uses_default_interval() {
    let (_dir, store) = temp_store().await;
    let request = Request::builder().method("POST").uri("/api/start").body(Body::empty()).unwrap();
    let response = router(store.clone()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.settings().await.reload_interval, 60);
}

#[tokio::test]
async fn test_start_rejects_interval_over_a_day() {
    let (_dir, store) = temp_store().await;
    let response = router(store.clone())
        .oneshot(post_json("/api/start", r#"{"interval": 90000}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!store.settings().await.notifier_enabled);
}

#[tokio::test]
async fn test_stop_disables_notifier() {
    let (_dir, store) = temp_store().await;
    store.start(30).await.unwrap();

    let response = router(store.clone()).oneshot(post_json("/api/stop", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let settings = store.settings().await;
    assert!(!settings.notifier_enabled);
    assert_eq!(settings.reload_interval, 30);
}

#[tokio::test]
async fn test_settings_report_seen_counts() {
    let (_dir, store) = temp_store().await;
    store.record_seen(SeenKind::Items, ["a", "b"]).await.unwrap();

    let response = router(store)
        .oneshot(Request::builder().uri("/api/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["data"]["seen_items"], 2);
    assert_eq!(json["data"]["seen_post_ids"], 0);
}

#[tokio::test]
async fn test_export_is_an_attachment() {
    let (_dir, store) = temp_store().await;
    store.record_seen(SeenKind::PostIds, ["x_n.jpg"]).await.unwrap();

    let response = router(store)
        .oneshot(Request::builder().uri("/api/export").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("facebook_seen_data.json"));

    let json = body_json(response).await;
    assert_eq!(json["seenPostIds"], serde_json::json!(["x_n.jpg"]));
    assert_eq!(json["seenItems"], serde_json::json!([]));
}

#[tokio::test]
async fn test_import_rejects_document_without_seen_sets() {
    let (_dir, store) = temp_store().await;
    let response = router(store)
        .oneshot(post_json("/api/import", r#"{"unrelated": true}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_import_replaces_seen_sets() {
    let (_dir, store) = temp_store().await;
    store.record_seen(SeenKind::Items, ["old"]).await.unwrap();

    let response = router(store.clone())
        .oneshot(post_json("/api/import", r#"{"seenItems": ["n1", "n2"], "seenNotificationIds": ["p1"]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let items = store.seen(SeenKind::Items).await;
    assert!(!items.contains("old"));
    assert_eq!(items.len(), 2);
    assert!(store.seen(SeenKind::PostIds).await.contains("p1"));
}

#[tokio::test]
async fn test_popup_page_renders() {
    let (_dir, store) = temp_store().await;
    store.start(45).await.unwrap();

    let response = router(store)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let page = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(page.contains(r#"value="45""#));
}

#[tokio::test]
async fn test_metrics_disabled_returns_not_found() {
    let (_dir, store) = temp_store().await;
    let response = router(store)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
