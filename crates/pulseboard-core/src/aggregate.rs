//! Groups rolled-up rows into one fixed-shape accumulator per dimension value,
//! positioned relative to a reference period.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::metric::{Metric, MetricRow};
use crate::period::PeriodKey;

pub const SHORT_WINDOW: usize = 4;
pub const LONG_WINDOW: usize = 12;

/// How much history the period index offers behind a reference period.
///
/// Shared by every accumulator of one aggregation, so windows are counted
/// from the index, not from whichever periods a single dimension value
/// happened to have rows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub has_previous: bool,
    pub trailing4: u32,
    pub trailing12: u32,
    pub series_len: usize,
}

impl Windows {
    pub fn for_reference(index_len: usize, reference_idx: usize, series_len: usize) -> Self {
        let behind = index_len.saturating_sub(reference_idx + 1);
        Self {
            has_previous: behind > 0,
            trailing4: behind.min(SHORT_WINDOW) as u32,
            trailing12: behind.min(LONG_WINDOW) as u32,
            series_len: series_len.min(behind + 1),
        }
    }

    /// All-time mode has no period-over-period windows at all.
    pub fn all_time(index_len: usize, series_len: usize) -> Self {
        Self {
            has_previous: false,
            trailing4: 0,
            trailing12: 0,
            series_len: series_len.min(index_len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulator {
    pub current: i64,
    /// `None` when the index has no period before the reference.
    pub previous: Option<i64>,
    pub trailing4_sum: i64,
    pub trailing4_count: u32,
    pub trailing12_sum: i64,
    pub trailing12_count: u32,
    pub sessions_current: i64,
    /// Oldest to newest, ending with the reference period.
    pub series: Vec<i64>,
}

impl Accumulator {
    pub fn empty(windows: &Windows) -> Self {
        Self {
            current: 0,
            previous: windows.has_previous.then_some(0),
            trailing4_sum: 0,
            trailing4_count: windows.trailing4,
            trailing12_sum: 0,
            trailing12_count: windows.trailing12,
            sessions_current: 0,
            series: vec![0; windows.series_len],
        }
    }

    /// Mean over however many trailing periods exist, up to four.
    pub fn avg4(&self) -> Option<f64> {
        average(self.trailing4_sum, self.trailing4_count)
    }

    pub fn avg12(&self) -> Option<f64> {
        average(self.trailing12_sum, self.trailing12_count)
    }

    fn absorb(&mut self, other: &Accumulator) {
        self.current += other.current;
        self.previous = match (self.previous, other.previous) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.trailing4_sum += other.trailing4_sum;
        self.trailing12_sum += other.trailing12_sum;
        self.sessions_current += other.sessions_current;
        for (slot, v) in self.series.iter_mut().zip(&other.series) {
            *slot += v;
        }
    }
}

fn average(sum: i64, count: u32) -> Option<f64> {
    (count > 0).then(|| sum as f64 / f64::from(count))
}

fn position_lookup(index: &[PeriodKey]) -> HashMap<PeriodKey, usize> {
    index.iter().enumerate().map(|(i, k)| (*k, i)).collect()
}

/// Accumulate `metric` per dimension value relative to `index[reference_idx]`.
///
/// Offset 0 feeds `current`, offset 1 `previous`, offsets 1..=4 and 1..=12 the
/// trailing windows. Rows newer than the reference are ignored. Duplicate
/// (period, value) rows are summed. A value with no rows in the reference
/// period is still present when it has history inside the horizon.
pub fn aggregate<D: Clone + Ord>(
    rows: &[MetricRow<D>],
    index: &[PeriodKey],
    reference_idx: usize,
    metric: Metric,
    series_len: usize,
) -> BTreeMap<D, Accumulator> {
    let mut by_value = BTreeMap::new();
    if reference_idx >= index.len() {
        return by_value;
    }
    let windows = Windows::for_reference(index.len(), reference_idx, series_len);
    let horizon = LONG_WINDOW.max(windows.series_len.saturating_sub(1));
    let positions = position_lookup(index);

    for row in rows {
        let Some(&pos) = positions.get(&row.period) else {
            continue;
        };
        if pos < reference_idx || pos - reference_idx > horizon {
            continue;
        }
        let offset = pos - reference_idx;
        let value = row.value(metric);
        let acc = by_value
            .entry(row.dimension.clone())
            .or_insert_with(|| Accumulator::empty(&windows));

        if offset == 0 {
            acc.current += value;
            acc.sessions_current += row.sessions;
        }
        if offset == 1 {
            acc.previous = Some(acc.previous.unwrap_or(0) + value);
        }
        if (1..=SHORT_WINDOW).contains(&offset) {
            acc.trailing4_sum += value;
        }
        if (1..=LONG_WINDOW).contains(&offset) {
            acc.trailing12_sum += value;
        }
        if offset < acc.series.len() {
            let slot = acc.series.len() - 1 - offset;
            acc.series[slot] += value;
        }
    }
    by_value
}

/// All-time totals: every period folds into `current`, windows stay empty so
/// period-over-period comparisons come out absent.
pub fn aggregate_all_time<D: Clone + Ord>(
    rows: &[MetricRow<D>],
    index: &[PeriodKey],
    metric: Metric,
    series_len: usize,
) -> BTreeMap<D, Accumulator> {
    let mut by_value = BTreeMap::new();
    let windows = Windows::all_time(index.len(), series_len);
    let positions = position_lookup(index);

    for row in rows {
        let Some(&pos) = positions.get(&row.period) else {
            continue;
        };
        let value = row.value(metric);
        let acc = by_value
            .entry(row.dimension.clone())
            .or_insert_with(|| Accumulator::empty(&windows));
        acc.current += value;
        acc.sessions_current += row.sessions;
        if pos < acc.series.len() {
            let slot = acc.series.len() - 1 - pos;
            acc.series[slot] += value;
        }
    }
    by_value
}

/// The "all dimensions" row: field-wise sum of every accumulator.
pub fn summarize<D>(by_value: &BTreeMap<D, Accumulator>, windows: &Windows) -> Accumulator {
    let mut total = Accumulator::empty(windows);
    for acc in by_value.values() {
        total.absorb(acc);
    }
    total
}

/// One zero-filled series per requested value, aligned to `periods` in the
/// order given. Rows for periods outside `periods` are dropped.
pub fn align_series<D: Clone + Ord>(
    rows: &[MetricRow<D>],
    periods: &[PeriodKey],
    metric: Metric,
    values: &[D],
) -> Vec<(D, Vec<i64>)> {
    let positions = position_lookup(periods);
    let mut series: BTreeMap<&D, Vec<i64>> = values
        .iter()
        .map(|v| (v, vec![0; periods.len()]))
        .collect();
    for row in rows {
        let (Some(&pos), Some(slots)) = (positions.get(&row.period), series.get_mut(&row.dimension))
        else {
            continue;
        };
        slots[pos] += row.value(metric);
    }
    values
        .iter()
        .map(|v| (v.clone(), series.get(v).cloned().unwrap_or_default()))
        .collect()
}
