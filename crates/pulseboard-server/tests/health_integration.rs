use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pulseboard_core::config::Config;
use pulseboard_duckdb::DuckDbBackend;
use pulseboard_server::app::build_app;
use pulseboard_server::state::AppState;

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/pulseboard-test".to_string(),
        ..Config::default()
    }
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn test_health_returns_200_when_db_reachable() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    let app = build_app(state);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["snapshots"]["loaded"], 0);
    assert!(json["snapshots"]["oldest_age_secs"].is_null());
    assert_eq!(json["snapshots"]["rules_loaded"], false);
}

#[tokio::test]
async fn test_health_reports_snapshot_age_after_refresh() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()));
    state.refresh_all().await.expect("refresh");
    let app = build_app(Arc::clone(&state));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    // Two granularities times six dimensions.
    assert_eq!(json["snapshots"]["loaded"], 12);
    let age = json["snapshots"]["oldest_age_secs"].as_i64().expect("age");
    assert!((0..60).contains(&age));
    assert_eq!(json["snapshots"]["rules_loaded"], true);
}

#[tokio::test]
async fn test_dimensions_lists_allowlists() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, test_config())));

    let request = Request::builder()
        .uri("/api/dimensions")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let dimensions = json["data"]["dimensions"].as_array().expect("dimensions");
    assert_eq!(dimensions.len(), 6);
    assert_eq!(dimensions[0], "channel");
    assert_eq!(json["data"]["metrics"][1]["name"], "demos");
    assert_eq!(json["data"]["metrics"][1]["has_conversion_rate"], true);
    assert_eq!(json["data"]["granularities"][1], "month");
    assert_eq!(json["data"]["references"][2], "all_time");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let app = build_app(Arc::new(AppState::new(db, test_config())));

    let request = Request::builder()
        .uri("/api/nope")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
