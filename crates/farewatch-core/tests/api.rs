//! Router-level API tests.
//!
//! These drive the axum router directly with `tower::ServiceExt::oneshot`.
//! Handlers that need live Postgres/Redis are exercised only on paths that
//! reject before touching a connection (validation, routing), plus the
//! health endpoints which degrade gracefully.

use axum::body::{self, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use std::sync::Arc;

use farewatch::alerts::{AlertRepository, Notify, PriceHistoryRepository, TelegramNotifier};
use farewatch::api::{create_router, AppState};
use farewatch::db::{Database, PriceCache};
use farewatch::flights::TequilaClient;
use farewatch::Config;

fn test_app() -> Router {
    let config = Config::default();
    let db = Database::lazy(&config).expect("lazy database bundle");
    let notifier: Arc<dyn Notify> =
        Arc::new(TelegramNotifier::new(&config.telegram).expect("notifier"));
    let state = AppState {
        alerts: AlertRepository::new(&db.postgres),
        history: PriceHistoryRepository::new(&db.postgres),
        flights: TequilaClient::new(&config.tequila).expect("tequila client"),
        cache: PriceCache::new(&db.redis, config.redis.route_cache_ttl),
        notifier,
        db,
    };
    create_router(state)
}

async fn read_body(body: Body) -> String {
    let bytes = body::to_bytes(body, usize::MAX).await.expect("read body");
    String::from_utf8(bytes.to_vec()).expect("response was not valid utf-8")
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_check_works() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert!(text.contains("healthy"));
}

#[tokio::test]
async fn liveness_works() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert!(text.contains("alive"));
}

#[tokio::test]
async fn readiness_reports_dependency_status() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    // healthy with live backing services, degraded without
    assert!(
        parts.status == StatusCode::OK || parts.status == StatusCode::SERVICE_UNAVAILABLE,
        "unexpected status {}",
        parts.status
    );
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(parsed.get("database").is_some());
    assert!(parsed.get("redis").is_some());
}

#[tokio::test]
async fn root_banner_carries_the_version() {
    let app = test_app();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn create_alert_with_invalid_iata_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(json_post(
            "/api/v1/alerts",
            serde_json::json!({
                "user_id": "123456789",
                "origin": "INVALID",
                "destination": "LHR",
                "target_price": 500.0
            }),
        ))
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    assert_eq!(parts.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(text.contains("IATA"));
}

#[tokio::test]
async fn create_alert_with_nonpositive_price_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(json_post(
            "/api/v1/alerts",
            serde_json::json!({
                "user_id": "123456789",
                "origin": "JFK",
                "destination": "LHR",
                "target_price": 0.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_alert_with_same_endpoints_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(json_post(
            "/api/v1/alerts",
            serde_json::json!({
                "user_id": "123456789",
                "origin": "jfk",
                "destination": "JFK",
                "target_price": 500.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_route_label_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/prices/history/JFKLHR")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let text = read_body(body).await;
    assert_eq!(parts.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(text.contains("route"));
}

#[tokio::test]
async fn search_with_bad_query_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(json_post(
            "/api/v1/prices/search",
            serde_json::json!({
                "origin": "NEWYORK",
                "destination": "LHR"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
