use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Snapshots older than this many refresh intervals mark the service stale.
const STALE_AFTER_INTERVALS: i64 = 3;

/// `GET /health` - liveness plus rollup snapshot freshness.
///
/// `503` with `"degraded"` when DuckDB is unreachable. Otherwise `200`, with
/// `"stale"` when the oldest snapshot has missed several refreshes in a row
/// (the refresh loop keeps serving the previous data on failure).
///
/// ```json
/// { "status": "ok", "version": "0.1.0",
///   "snapshots": { "loaded": 12, "oldest_age_secs": 41, "rules_loaded": true } }
/// ```
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshots = state.snapshot_status().await;
    let snapshots_json = json!({
        "loaded": snapshots.loaded,
        "oldest_age_secs": snapshots.oldest_age_secs,
        "rules_loaded": snapshots.rules_loaded,
    });

    if let Err(e) = state.db.ping().await {
        tracing::error!(error = %e, "Health check: DuckDB unreachable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "version": env!("CARGO_PKG_VERSION"),
                "snapshots": snapshots_json,
            })),
        )
            .into_response();
    }

    let stale_after = state.config.refresh_interval_secs as i64 * STALE_AFTER_INTERVALS;
    let status = match snapshots.oldest_age_secs {
        Some(age) if age > stale_after => {
            tracing::warn!(oldest_age_secs = age, "Health check: rollup snapshots stale");
            "stale"
        }
        _ => "ok",
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "snapshots": snapshots_json,
        })),
    )
        .into_response()
}
