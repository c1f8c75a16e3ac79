//! End-of-week projection from a partial cumulative total.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;

use crate::aggregate::Accumulator;
use crate::compare::{pct, PctChange};
use crate::period::{is_in_progress, period_progress, Granularity, PeriodKey};

pub const DEFAULT_GRACE_DAYS: i64 = 14;

/// Full-week total divided by the cumulative total through each weekday,
/// from the typical intra-week activity curve. Sunday closes the week.
pub const WEEKDAY_MULTIPLIERS: [(&str, f64); 7] = [
    ("Monday", 5.9),
    ("Tuesday", 3.05),
    ("Wednesday", 2.08),
    ("Thursday", 1.58),
    ("Friday", 1.27),
    ("Saturday", 1.12),
    ("Sunday", 1.0),
];

/// Unknown names map to 1.0.
pub fn multiplier(weekday: &str) -> f64 {
    let name = weekday.trim();
    WEEKDAY_MULTIPLIERS
        .iter()
        .find(|(day, _)| day.eq_ignore_ascii_case(name))
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

pub fn project(cumulative: i64, weekday: &str) -> i64 {
    (cumulative as f64 * multiplier(weekday)).round() as i64
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_MULTIPLIERS[day.num_days_from_monday() as usize].0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionInfo {
    pub eligible: bool,
    pub weekday: &'static str,
    pub multiplier: f64,
    /// Elapsed share of the reference period, 0–100.
    pub progress_pct: f64,
}

impl ProjectionInfo {
    /// No reference period (all-time or no data): nothing to extrapolate.
    pub fn disabled(now: NaiveDateTime) -> Self {
        Self {
            eligible: false,
            weekday: weekday_name(now.weekday()),
            multiplier: 1.0,
            progress_pct: 0.0,
        }
    }

    /// Whether two evaluations project the same numbers. Progress and the
    /// weekday label may differ.
    pub fn same_outcome(&self, other: &ProjectionInfo) -> bool {
        self.eligible == other.eligible && self.multiplier == other.multiplier
    }
}

/// Projection applies to weekly references that are still running or whose
/// end instant is at most `grace_days` days behind `now`, since upstream
/// rollups lag.
pub fn projection_info(
    reference: PeriodKey,
    granularity: Granularity,
    now: NaiveDateTime,
    grace_days: i64,
) -> ProjectionInfo {
    let weekday = weekday_name(now.weekday());
    let end = granularity
        .period_end(reference.start())
        .and_time(NaiveTime::MIN);
    let grace_end = end + Duration::days(grace_days.max(0));
    let recent =
        is_in_progress(reference, granularity, now) || (now >= end && now <= grace_end);
    let eligible = granularity == Granularity::Week && recent;
    ProjectionInfo {
        eligible,
        weekday,
        multiplier: if eligible { multiplier(weekday) } else { 1.0 },
        progress_pct: period_progress(reference, granularity, now),
    }
}

/// [`projection_info`] for an optional reference; `None` (all-time or no
/// data) is disabled.
pub fn current_projection(
    reference: Option<PeriodKey>,
    granularity: Granularity,
    now: NaiveDateTime,
    grace_days: i64,
) -> ProjectionInfo {
    match reference {
        Some(key) => projection_info(key, granularity, now, grace_days),
        None => ProjectionInfo::disabled(now),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedComparison {
    pub projected: i64,
    pub wow: Option<PctChange>,
    pub vs4: Option<PctChange>,
    pub vs12: Option<PctChange>,
    pub delta_abs: Option<i64>,
}

/// Comparisons against the projected total. Ineligible references project
/// to the raw current value, so these equal the actual comparisons.
pub fn project_comparison(acc: &Accumulator, info: &ProjectionInfo) -> ProjectedComparison {
    let projected = if info.eligible {
        project(acc.current, info.weekday)
    } else {
        acc.current
    };
    let value = projected as f64;
    ProjectedComparison {
        projected,
        wow: pct(value, acc.previous.map(|p| p as f64)),
        vs4: pct(value, acc.avg4()),
        vs12: pct(value, acc.avg12()),
        delta_abs: acc.previous.map(|p| projected - p),
    }
}
