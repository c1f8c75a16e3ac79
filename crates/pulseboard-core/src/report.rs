//! Composes the engine into the records presentation consumes: one breakdown
//! per dimension and the headline summary cards.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::aggregate::{
    aggregate, aggregate_all_time, align_series, summarize, Accumulator, Windows,
};
use crate::compare::{compare, top_movers, Comparison, Movers, Totals};
use crate::ignore::IgnoreMatcher;
use crate::metric::{Metric, MetricRow};
use crate::period::{
    build_period_index, resolve_reference, Granularity, PeriodKey, Reference, ReferenceSelection,
};
use crate::projection::{
    project_comparison, projection_info, ProjectedComparison, ProjectionInfo, DEFAULT_GRACE_DAYS,
};
use crate::ranking::{rank, RankOptions};

pub const DEFAULT_SERIES_LEN: usize = 12;
pub const DEFAULT_MOVERS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSettings {
    pub series_len: usize,
    pub grace_days: i64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            series_len: DEFAULT_SERIES_LEN,
            grace_days: DEFAULT_GRACE_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownRequest {
    pub metric: Metric,
    pub selection: ReferenceSelection,
    pub rank: RankOptions,
    pub movers_limit: usize,
    pub settings: ReportSettings,
    /// Align every series to these periods, in this order, instead of the
    /// window ending at the reference.
    pub periods: Option<Vec<PeriodKey>>,
}

impl Default for BreakdownRequest {
    fn default() -> Self {
        Self {
            metric: Metric::Sessions,
            selection: ReferenceSelection::Latest,
            rank: RankOptions::default(),
            movers_limit: DEFAULT_MOVERS_LIMIT,
            settings: ReportSettings::default(),
            periods: None,
        }
    }
}

/// Comparison figures for one line of a table, actual and projected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonLine {
    #[serde(flatten)]
    pub comparison: Comparison,
    pub projected: ProjectedComparison,
    /// Aligned to the report's `periods`.
    pub series: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow<D> {
    pub value: D,
    #[serde(flatten)]
    pub line: ComparisonLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownReport<D> {
    pub granularity: Granularity,
    pub metric: Metric,
    pub selection: ReferenceSelection,
    pub reference: Option<PeriodKey>,
    /// Chronological periods every series is aligned to.
    pub periods: Vec<PeriodKey>,
    pub projection: ProjectionInfo,
    /// The all-dimensions row. Its `current` is the sum over every
    /// non-ignored value, ranked or not.
    pub total: ComparisonLine,
    pub rows: Vec<BreakdownRow<D>>,
    pub movers: Movers<D>,
    pub ignored_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: Metric,
    #[serde(flatten)]
    pub line: ComparisonLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub granularity: Granularity,
    pub selection: ReferenceSelection,
    pub reference: Option<PeriodKey>,
    pub periods: Vec<PeriodKey>,
    pub projection: ProjectionInfo,
    pub metrics: Vec<MetricSummary>,
}

/// Period context shared by every metric of one report.
struct Frame {
    index: Vec<PeriodKey>,
    reference: Reference,
    windows: Windows,
    periods: Vec<PeriodKey>,
    projection: ProjectionInfo,
}

impl Frame {
    fn new<D>(
        rows: &[MetricRow<D>],
        granularity: Granularity,
        selection: ReferenceSelection,
        settings: &ReportSettings,
        now: NaiveDateTime,
    ) -> Self {
        let index = build_period_index(rows);
        let reference = resolve_reference(&index, granularity, selection, now);
        let (windows, start, projection) = match reference {
            Reference::Period { idx, key } => (
                Windows::for_reference(index.len(), idx, settings.series_len),
                idx,
                projection_info(key, granularity, now, settings.grace_days),
            ),
            Reference::AllTime => (
                Windows::all_time(index.len(), settings.series_len),
                0,
                ProjectionInfo::disabled(now),
            ),
            Reference::Empty => (Windows::all_time(0, 0), 0, ProjectionInfo::disabled(now)),
        };
        let mut periods: Vec<PeriodKey> = index
            .iter()
            .skip(start)
            .take(windows.series_len)
            .copied()
            .collect();
        periods.reverse();
        Self {
            index,
            reference,
            windows,
            periods,
            projection,
        }
    }

    fn accumulate<D: Clone + Ord>(
        &self,
        rows: &[MetricRow<D>],
        metric: Metric,
    ) -> BTreeMap<D, Accumulator> {
        match self.reference {
            Reference::Period { idx, .. } => {
                aggregate(rows, &self.index, idx, metric, self.windows.series_len)
            }
            Reference::AllTime => {
                aggregate_all_time(rows, &self.index, metric, self.windows.series_len)
            }
            Reference::Empty => BTreeMap::new(),
        }
    }

    fn line(&self, acc: &Accumulator, totals: &Totals, metric: Metric) -> ComparisonLine {
        ComparisonLine {
            comparison: compare(acc, totals, metric),
            projected: project_comparison(acc, &self.projection),
            series: acc.series.clone(),
        }
    }
}

fn without_ignored<D>(rows: &[MetricRow<D>], matcher: &IgnoreMatcher) -> Vec<MetricRow<D>>
where
    D: Clone + AsRef<str>,
{
    if matcher.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| !matcher.is_ignored(row.dimension.as_ref()))
        .cloned()
        .collect()
}

/// Ranked per-value comparisons for one dimension rollup.
///
/// The period axis comes from every row, ignored or not, so excluding a
/// value never shifts the reference period. Table rows, their series and
/// any chart built from `rows` share the single ranked list.
pub fn build_breakdown<D>(
    rows: &[MetricRow<D>],
    granularity: Granularity,
    matcher: &IgnoreMatcher,
    request: &BreakdownRequest,
    now: NaiveDateTime,
) -> BreakdownReport<D>
where
    D: Clone + Ord + AsRef<str>,
{
    let frame = Frame::new(rows, granularity, request.selection, &request.settings, now);
    let kept = without_ignored(rows, matcher);
    let ignored_rows = rows.len() - kept.len();

    let by_value = frame.accumulate(&kept, request.metric);
    let summary = summarize(&by_value, &frame.windows);
    let totals = Totals::from_summary(&summary);

    let comparisons: BTreeMap<&D, Comparison> = by_value
        .iter()
        .map(|(value, acc)| (value, compare(acc, &totals, request.metric)))
        .collect();
    let movers = top_movers(comparisons.iter().map(|(v, c)| (*v, c)), request.movers_limit);

    let rows = rank(&by_value, &request.rank)
        .into_iter()
        .filter_map(|value| {
            let acc = by_value.get(&value)?;
            let line = frame.line(acc, &totals, request.metric);
            Some(BreakdownRow { value, line })
        })
        .collect();

    let mut report = BreakdownReport {
        granularity,
        metric: request.metric,
        selection: request.selection,
        reference: frame.reference.key(),
        periods: frame.periods.clone(),
        total: frame.line(&summary, &totals, request.metric),
        projection: frame.projection,
        rows,
        movers,
        ignored_rows,
    };
    if let Some(periods) = &request.periods {
        realign(&mut report, &kept, periods, request.metric);
    }
    report
}

/// Replace every series in `report` with one aligned to `periods`. The total
/// series sums every non-ignored value, ranked or not.
fn realign<D: Clone + Ord>(
    report: &mut BreakdownReport<D>,
    kept: &[MetricRow<D>],
    periods: &[PeriodKey],
    metric: Metric,
) {
    let ranked: Vec<D> = report.rows.iter().map(|r| r.value.clone()).collect();
    for (row, (_, series)) in report
        .rows
        .iter_mut()
        .zip(align_series(kept, periods, metric, &ranked))
    {
        row.line.series = series;
    }

    let every_value: Vec<D> = kept
        .iter()
        .map(|r| r.dimension.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut total = vec![0; periods.len()];
    for (_, series) in align_series(kept, periods, metric, &every_value) {
        for (slot, v) in total.iter_mut().zip(series) {
            *slot += v;
        }
    }
    report.total.series = total;
    report.periods = periods.to_vec();
}

/// Headline cards: the all-dimensions line for every metric.
pub fn build_summary<D>(
    rows: &[MetricRow<D>],
    granularity: Granularity,
    matcher: &IgnoreMatcher,
    selection: ReferenceSelection,
    settings: &ReportSettings,
    now: NaiveDateTime,
) -> SummaryReport
where
    D: Clone + Ord + AsRef<str>,
{
    let frame = Frame::new(rows, granularity, selection, settings, now);
    let kept = without_ignored(rows, matcher);

    let metrics = Metric::ALL
        .iter()
        .map(|&metric| {
            let by_value = frame.accumulate(&kept, metric);
            let summary = summarize(&by_value, &frame.windows);
            let totals = Totals::from_summary(&summary);
            MetricSummary {
                metric,
                line: frame.line(&summary, &totals, metric),
            }
        })
        .collect();

    SummaryReport {
        granularity,
        selection,
        reference: frame.reference.key(),
        periods: frame.periods.clone(),
        projection: frame.projection,
        metrics,
    }
}
