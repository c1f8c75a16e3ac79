use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, NaiveDateTime};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pulseboard_core::{
    config::Config,
    ignore::{IgnoreRule, RuleKind},
    period::Granularity,
};
use pulseboard_duckdb::{DuckDbBackend, RollupRecord};
use pulseboard_server::app::build_app;
use pulseboard_server::state::AppState;

fn config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/pulseboard-test".to_string(),
        ..Config::default()
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Wednesday of the newest seeded week.
fn wednesday_noon() -> NaiveDateTime {
    day(2024, 1, 31).and_hms_opt(12, 0, 0).expect("valid time")
}

fn week(period_start: NaiveDate, channel: &str, sessions: i64, signups: i64) -> RollupRecord {
    RollupRecord {
        period_start,
        channel: Some(channel.to_string()),
        sessions,
        signups,
        ..Default::default()
    }
}

fn rule(id: &str, pattern: &str, kind: RuleKind) -> IgnoreRule {
    IgnoreRule {
        id: id.to_string(),
        pattern: pattern.to_string(),
        kind,
        note: None,
    }
}

async fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let mut records = Vec::new();
    for d in [1, 8, 15, 22] {
        records.push(week(day(2024, 1, d), "Organic", 100, 2));
    }
    records.push(week(day(2024, 1, 29), "Organic", 120, 6));
    records.push(week(day(2024, 1, 22), "Paid", 50, 1));
    records.push(week(day(2024, 1, 29), "Paid", 40, 0));
    records.push(week(day(2024, 1, 29), "Referral", 10, 0));
    records.push(week(day(2024, 1, 29), "Internal", 500, 0));
    db.insert_rollups(Granularity::Week, &records)
        .await
        .expect("seed rollups");
    db.insert_ignore_rule(&rule("r1", "Internal", RuleKind::Literal))
        .await
        .expect("seed rule");
    db.insert_ignore_rule(&rule("r2", "([", RuleKind::Regex))
        .await
        .expect("seed rule");

    let state = Arc::new(AppState::new(db, config()).with_fixed_now(wednesday_noon()));
    let app = build_app(Arc::clone(&state));
    (state, app)
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

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let res = app.clone().oneshot(req).await.expect("response");
    let status = res.status();
    (status, json_body(res).await)
}

#[tokio::test]
async fn test_breakdown_ranks_latest_week() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["granularity"], "week");
    assert_eq!(data["metric"], "sessions");
    assert_eq!(data["reference"], "2024-01-29");
    assert_eq!(data["ignored_rows"], 1);

    let rows = data["rows"].as_array().expect("rows");
    let values: Vec<&str> = rows.iter().filter_map(|r| r["value"].as_str()).collect();
    assert_eq!(values, vec!["Organic", "Paid", "Referral"]);

    assert_eq!(rows[0]["current"], 120);
    assert_eq!(rows[0]["previous"], 100);
    assert_eq!(rows[0]["wow"].as_f64(), Some(20.0));
    assert_eq!(rows[0]["delta_abs"], 20);
    assert_eq!(rows[1]["wow"].as_f64(), Some(-20.0));
    assert_eq!(rows[2]["wow"], "NEW");

    assert_eq!(data["total"]["current"], 170);
    assert_eq!(data["total"]["previous"], 150);
    assert_eq!(data["total"]["delta_abs"], 20);
}

#[tokio::test]
async fn test_breakdown_series_align_to_periods() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel").await;
    let data = &json["data"];

    let periods = data["periods"].as_array().expect("periods");
    assert_eq!(periods.len(), 5);
    assert_eq!(periods[0], "2024-01-01");
    assert_eq!(periods[4], "2024-01-29");

    let organic = &data["rows"][0]["series"];
    assert_eq!(organic, &serde_json::json!([100, 100, 100, 100, 120]));
    let referral = &data["rows"][2]["series"];
    assert_eq!(referral, &serde_json::json!([0, 0, 0, 0, 10]));
}

#[tokio::test]
async fn test_breakdown_series_follow_requested_periods() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/breakdown/channel?periods=2024-01-31,2024-01-01").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["periods"], serde_json::json!(["2024-01-29", "2024-01-01"]));
    assert_eq!(data["rows"][0]["value"], "Organic");
    assert_eq!(data["rows"][0]["series"], serde_json::json!([120, 100]));
    assert_eq!(data["rows"][2]["series"], serde_json::json!([10, 0]));
    assert_eq!(data["total"]["series"], serde_json::json!([170, 100]));
    // The comparison columns still describe the reference week.
    assert_eq!(data["total"]["current"], 170);

    let (status, json) = get(&app, "/api/breakdown/channel?periods=last-week").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "periods");
}

#[tokio::test]
async fn test_breakdown_projection_for_running_week() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel").await;
    let projection = &json["data"]["projection"];

    assert_eq!(projection["eligible"], true);
    assert_eq!(projection["multiplier"].as_f64(), Some(2.08));
    // 170 * 2.08 = 353.6
    assert_eq!(json["data"]["total"]["projected"]["projected"], 354);
}

#[tokio::test]
async fn test_breakdown_complete_reference_skips_running_week() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/breakdown/channel?reference=complete").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["reference"], "2024-01-22");
    assert_eq!(data["total"]["current"], 150);
    assert_eq!(data["total"]["previous"], 100);
    let values: Vec<&str> = data["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|r| r["value"].as_str())
        .collect();
    assert_eq!(values, vec!["Organic", "Paid"]);
}

#[tokio::test]
async fn test_breakdown_top_n_keeps_full_total() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel?top_n=1").await;
    let data = &json["data"];

    assert_eq!(data["rows"].as_array().expect("rows").len(), 1);
    assert_eq!(data["total"]["current"], 170);
}

#[tokio::test]
async fn test_breakdown_search_is_case_insensitive() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel?search=PAI").await;
    let rows = json["data"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value"], "Paid");
}

#[tokio::test]
async fn test_breakdown_conversion_rate_for_signups() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel?metric=signups").await;
    let organic = &json["data"]["rows"][0];

    assert_eq!(organic["value"], "Organic");
    assert_eq!(organic["current"], 6);
    // 6 signups per 120 sessions
    assert_eq!(organic["cvr"].as_f64(), Some(5.0));
}

#[tokio::test]
async fn test_breakdown_movers_split_gainers_and_losers() {
    let (_state, app) = setup().await;
    let (_, json) = get(&app, "/api/breakdown/channel").await;
    let movers = &json["data"]["movers"];

    assert_eq!(movers["gainers"][0]["value"], "Organic");
    assert_eq!(movers["gainers"][0]["delta_abs"], 20);
    assert_eq!(movers["losers"][0]["value"], "Paid");
    assert_eq!(movers["losers"][0]["delta_abs"], -10);
}

#[tokio::test]
async fn test_breakdown_rejects_bad_parameters() {
    let (_state, app) = setup().await;

    let (status, json) = get(&app, "/api/breakdown/browser").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["field"], "dimension");

    let (status, json) = get(&app, "/api/breakdown/channel?metric=revenue").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "metric");

    let (status, json) = get(&app, "/api/breakdown/channel?top_n=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "top_n");

    let (status, json) = get(&app, "/api/breakdown/channel?granularity=day").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["field"], "granularity");
}

#[tokio::test]
async fn test_breakdown_on_empty_rollup() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/breakdown/channel?granularity=month").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert!(data["reference"].is_null());
    assert_eq!(data["rows"].as_array().expect("rows").len(), 0);
    assert_eq!(data["total"]["current"], 0);
}

#[tokio::test]
async fn test_reports_are_memoized_until_data_changes() {
    let (state, app) = setup().await;

    let (_, first) = get(&app, "/api/breakdown/channel").await;
    let (_, second) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(first, second);
    assert_eq!(state.cached_report_count().await, 1);

    state
        .db
        .insert_rollups(
            Granularity::Week,
            &[week(day(2024, 1, 29), "Referral", 5, 0)],
        )
        .await
        .expect("insert");

    // Snapshots are served until the next refresh.
    let (_, stale) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(stale["data"]["total"]["current"], 170);

    state.refresh_all().await.expect("refresh");
    assert_eq!(state.cached_report_count().await, 0);

    let (_, fresh) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(fresh["data"]["total"]["current"], 175);
    assert_eq!(fresh["data"]["rows"][2]["current"], 15);
}

#[tokio::test]
async fn test_memoized_report_tracks_the_clock() {
    let (state, app) = setup().await;

    let (_, noon) = get(&app, "/api/breakdown/channel").await;
    let noon_progress = noon["data"]["projection"]["progress_pct"]
        .as_f64()
        .expect("progress");

    state.pin_clock(day(2024, 1, 31).and_hms_opt(12, 45, 0).expect("valid time"));
    let (_, later) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(state.cached_report_count().await, 1);
    let later_progress = later["data"]["projection"]["progress_pct"]
        .as_f64()
        .expect("progress");
    assert!(later_progress > noon_progress);
    assert_eq!(later["data"]["total"]["projected"]["projected"], 354);

    state.pin_clock(day(2024, 2, 1).and_hms_opt(9, 0, 0).expect("valid time"));
    let (_, thursday) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(thursday["data"]["projection"]["multiplier"].as_f64(), Some(1.58));
    // 170 * 1.58 = 268.6
    assert_eq!(thursday["data"]["total"]["projected"]["projected"], 269);
}

#[tokio::test]
async fn test_memoized_report_rebuilt_when_grace_ends() {
    let (state, app) = setup().await;

    // The 2024-01-29 week ends 2024-02-05; fourteen days of grace end at
    // midnight on 2024-02-19.
    state.pin_clock(day(2024, 2, 19).and_hms_opt(0, 0, 0).expect("valid time"));
    let (_, last_call) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(last_call["data"]["projection"]["eligible"], true);

    state.pin_clock(day(2024, 2, 19).and_hms_opt(0, 30, 0).expect("valid time"));
    let (_, expired) = get(&app, "/api/breakdown/channel").await;
    assert_eq!(expired["data"]["projection"]["eligible"], false);
    assert_eq!(expired["data"]["total"]["projected"]["projected"], 170);
    assert_eq!(state.cached_report_count().await, 1);
}

#[tokio::test]
async fn test_summary_has_one_card_per_metric() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/summary").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["reference"], "2024-01-29");
    let metrics = data["metrics"].as_array().expect("metrics");
    assert_eq!(metrics.len(), 3);
    assert_eq!(metrics[0]["metric"], "sessions");
    assert_eq!(metrics[0]["current"], 170);
    assert_eq!(metrics[2]["metric"], "signups");
    assert_eq!(metrics[2]["current"], 6);
}

#[tokio::test]
async fn test_summary_all_time_disables_projection() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/summary?reference=all_time").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert!(data["reference"].is_null());
    assert_eq!(data["projection"]["eligible"], false);
    // 400 + 120 Organic, 90 Paid, 10 Referral
    assert_eq!(data["metrics"][0]["current"], 620);
}

#[tokio::test]
async fn test_ignore_rules_listing_flags_invalid_patterns() {
    let (_state, app) = setup().await;
    let (status, json) = get(&app, "/api/ignore-rules").await;
    assert_eq!(status, StatusCode::OK);

    let rules = json["data"].as_array().expect("rules");
    assert_eq!(rules.len(), 2);
    let internal = rules
        .iter()
        .find(|r| r["id"] == "r1")
        .expect("literal rule");
    assert_eq!(internal["kind"], "literal");
    assert_eq!(internal["valid"], true);
    let broken = rules.iter().find(|r| r["id"] == "r2").expect("regex rule");
    assert_eq!(broken["kind"], "regex");
    assert_eq!(broken["valid"], false);
    assert_eq!(json["fingerprint"].as_str().map(str::len), Some(16));
}
