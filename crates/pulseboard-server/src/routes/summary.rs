use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use pulseboard_core::{
    metric::parse_dimension,
    period::{Granularity, ReferenceSelection},
    report::build_summary,
};

use crate::{
    error::AppError,
    state::{AppState, CachedReport, ReportKey},
};

/// Every row carries a channel, so its rollup is the default basis for
/// headline totals.
const DEFAULT_SUMMARY_DIMENSION: &str = "channel";

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub granularity: Option<String>,
    pub reference: Option<String>,
    /// Rollup the totals are computed over; ignore rules match its values.
    pub dimension: Option<String>,
}

/// `GET /api/summary` - headline cards, one comparison per metric.
#[tracing::instrument(skip(state, query))]
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let granularity = Granularity::parse(query.granularity.as_deref())?;
    let selection = ReferenceSelection::parse(query.reference.as_deref())?;
    let dimension =
        parse_dimension(query.dimension.as_deref().unwrap_or(DEFAULT_SUMMARY_DIMENSION))?;
    let settings = state.report_settings();

    let snapshot = state.rows(granularity, dimension).await?;
    let rules = state.ignore_rules().await?;
    let now = state.now();

    let key = ReportKey {
        rows_fingerprint: snapshot.fingerprint.clone(),
        rules_fingerprint: rules.fingerprint.clone(),
        params: format!(
            "summary|{dimension}|{granularity}|{}|{}",
            selection.as_str(),
            now.date(),
        ),
    };
    if let Some(data) = state.cached_report(&key).await {
        return Ok(Json(json!({ "data": data })));
    }

    let report = build_summary(
        &snapshot.rows,
        granularity,
        &rules.matcher,
        selection,
        &settings,
        now,
    );
    let data = serde_json::to_value(&report).map_err(anyhow::Error::from)?;
    state
        .store_report(
            key,
            CachedReport {
                data: data.clone(),
                reference: report.reference,
                granularity,
                projection: report.projection,
            },
        )
        .await;

    Ok(Json(json!({ "data": data })))
}
