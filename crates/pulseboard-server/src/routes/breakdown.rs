use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use pulseboard_core::{
    metric::{parse_dimension, Metric},
    period::{parse_periods, Granularity, ReferenceSelection},
    ranking::RankOptions,
    report::{build_breakdown, BreakdownRequest, DEFAULT_MOVERS_LIMIT},
};

use crate::{
    error::AppError,
    state::{AppState, CachedReport, ReportKey},
};

const MAX_MOVERS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct BreakdownQuery {
    pub granularity: Option<String>,
    pub metric: Option<String>,
    pub reference: Option<String>,
    pub search: Option<String>,
    pub top_n: Option<i64>,
    pub include_zero: Option<bool>,
    pub movers: Option<usize>,
    /// Comma-separated dates; series follow these periods in this order.
    pub periods: Option<String>,
}

/// `GET /api/breakdown/{dimension}` - ranked period comparison for one
/// dimension, with per-value series and top movers.
#[tracing::instrument(skip(state, query))]
pub async fn get_breakdown(
    State(state): State<Arc<AppState>>,
    Path(dimension): Path<String>,
    Query(query): Query<BreakdownQuery>,
) -> Result<impl IntoResponse, AppError> {
    let dimension = parse_dimension(&dimension)?;
    let granularity = Granularity::parse(query.granularity.as_deref())?;
    let request = BreakdownRequest {
        metric: Metric::parse(query.metric.as_deref())?,
        selection: ReferenceSelection::parse(query.reference.as_deref())?,
        rank: RankOptions::new(
            query.search.as_deref(),
            query.top_n,
            query.include_zero.unwrap_or(false),
        )?,
        movers_limit: query.movers.unwrap_or(DEFAULT_MOVERS_LIMIT).min(MAX_MOVERS),
        settings: state.report_settings(),
        periods: parse_periods(query.periods.as_deref(), granularity)?,
    };

    let snapshot = state.rows(granularity, dimension).await?;
    let rules = state.ignore_rules().await?;
    let now = state.now();

    let key = ReportKey {
        rows_fingerprint: snapshot.fingerprint.clone(),
        rules_fingerprint: rules.fingerprint.clone(),
        params: format!(
            "breakdown|{dimension}|{granularity}|{}|{}|{}|{:?}|{}|{}|{:?}|{}",
            request.metric,
            request.selection.as_str(),
            request.rank.search,
            request.rank.top_n,
            request.rank.include_zero,
            request.movers_limit,
            request.periods,
            now.date(),
        ),
    };
    if let Some(data) = state.cached_report(&key).await {
        return Ok(Json(json!({ "data": data })));
    }

    let report = build_breakdown(&snapshot.rows, granularity, &rules.matcher, &request, now);
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
