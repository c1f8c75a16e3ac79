//! Percentage change, share attribution and top movers.

use serde::{Serialize, Serializer};

use crate::aggregate::Accumulator;
use crate::metric::Metric;

/// A percentage change that may have no numeric answer.
///
/// Absent history is modelled one level up as `Option<PctChange>::None`, so
/// "no data", "new from zero" and "0%" stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PctChange {
    /// Base was zero and the current value is positive.
    New,
    Value(f64),
}

impl PctChange {
    pub fn value(&self) -> Option<f64> {
        match self {
            PctChange::New => None,
            PctChange::Value(v) => Some(*v),
        }
    }
}

impl Serialize for PctChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PctChange::New => serializer.serialize_str("NEW"),
            PctChange::Value(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Percentage change of `current` against `base`.
///
/// Positive base gives the usual ratio, zero base gives `New` or `0`, and a
/// missing or negative base gives `None`.
pub fn pct(current: f64, base: Option<f64>) -> Option<PctChange> {
    let base = base?;
    if base > 0.0 {
        let change = (current - base) / base * 100.0;
        return change.is_finite().then_some(PctChange::Value(change));
    }
    if base == 0.0 {
        if current > 0.0 {
            return Some(PctChange::New);
        }
        if current == 0.0 {
            return Some(PctChange::Value(0.0));
        }
    }
    None
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let r = numerator / denominator;
    r.is_finite().then_some(r)
}

/// Totals across every dimension value of one aggregation, used as the
/// denominators for share attribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub current: i64,
    /// Sum of per-value `current - previous`; `None` without a previous period.
    pub delta: Option<i64>,
}

impl Totals {
    pub fn from_summary(summary: &Accumulator) -> Self {
        Self {
            current: summary.current,
            delta: summary.previous.map(|p| summary.current - p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub current: i64,
    pub previous: Option<i64>,
    pub avg4: Option<f64>,
    pub avg12: Option<f64>,
    pub wow: Option<PctChange>,
    pub vs4: Option<PctChange>,
    pub vs12: Option<PctChange>,
    pub delta_abs: Option<i64>,
    pub delta_vs4: Option<f64>,
    pub delta_vs12: Option<f64>,
    pub share_of_total: f64,
    pub share_of_delta: Option<f64>,
    /// Conversions per 100 sessions in the reference period.
    pub cvr: Option<f64>,
}

pub fn compare(acc: &Accumulator, totals: &Totals, metric: Metric) -> Comparison {
    let current = acc.current as f64;
    let avg4 = acc.avg4();
    let avg12 = acc.avg12();
    let delta_abs = acc.previous.map(|p| acc.current - p);

    let share_of_total = ratio(current, totals.current as f64).unwrap_or(0.0);
    let share_of_delta = match (delta_abs, totals.delta) {
        (Some(d), Some(total)) => ratio(d as f64, total as f64),
        _ => None,
    };
    let cvr = if metric.has_conversion_rate() {
        ratio(current * 100.0, acc.sessions_current as f64)
    } else {
        None
    };

    Comparison {
        current: acc.current,
        previous: acc.previous,
        avg4,
        avg12,
        wow: pct(current, acc.previous.map(|p| p as f64)),
        vs4: pct(current, avg4),
        vs12: pct(current, avg12),
        delta_abs,
        delta_vs4: avg4.map(|b| current - b),
        delta_vs12: avg12.map(|b| current - b),
        share_of_total,
        share_of_delta,
        cvr,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mover<D> {
    pub value: D,
    pub delta_abs: i64,
    pub share_of_delta: Option<f64>,
    pub wow: Option<PctChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movers<D> {
    pub gainers: Vec<Mover<D>>,
    pub losers: Vec<Mover<D>>,
}

impl<D> Default for Movers<D> {
    fn default() -> Self {
        Self {
            gainers: Vec::new(),
            losers: Vec::new(),
        }
    }
}

/// Largest increases (descending) and largest decreases (most negative
/// first), `limit` of each. Equal deltas keep their input order.
pub fn top_movers<'a, D, I>(comparisons: I, limit: usize) -> Movers<D>
where
    D: Clone + 'a,
    I: IntoIterator<Item = (&'a D, &'a Comparison)>,
{
    let mut gainers = Vec::new();
    let mut losers = Vec::new();
    for (value, cmp) in comparisons {
        let Some(delta) = cmp.delta_abs else {
            continue;
        };
        let mover = Mover {
            value: value.clone(),
            delta_abs: delta,
            share_of_delta: cmp.share_of_delta,
            wow: cmp.wow,
        };
        if delta > 0 {
            gainers.push(mover);
        } else if delta < 0 {
            losers.push(mover);
        }
    }
    gainers.sort_by(|a, b| b.delta_abs.cmp(&a.delta_abs));
    losers.sort_by(|a, b| a.delta_abs.cmp(&b.delta_abs));
    gainers.truncate(limit);
    losers.truncate(limit);
    Movers { gainers, losers }
}
