use axum::{response::IntoResponse, Json};
use serde_json::json;

use pulseboard_core::{
    metric::{Metric, VALID_DIMENSIONS},
    period::{Granularity, ReferenceSelection},
};

/// `GET /api/dimensions` - the values each query parameter accepts.
pub async fn list_dimensions() -> impl IntoResponse {
    let metrics: Vec<_> = Metric::ALL
        .iter()
        .map(|m| {
            json!({
                "name": m.as_str(),
                "has_conversion_rate": m.has_conversion_rate(),
            })
        })
        .collect();
    let granularities: Vec<_> = Granularity::ALL.iter().map(|g| g.as_str()).collect();
    let references: Vec<_> = [
        ReferenceSelection::Latest,
        ReferenceSelection::Complete,
        ReferenceSelection::AllTime,
    ]
    .iter()
    .map(|r| r.as_str())
    .collect();

    Json(json!({
        "data": {
            "dimensions": VALID_DIMENSIONS,
            "metrics": metrics,
            "granularities": granularities,
            "references": references,
        }
    }))
}
