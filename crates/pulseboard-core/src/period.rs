//! Period keys, granularity arithmetic, and the descending period index that
//! every other component addresses by offset.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metric::MetricRow;

/// Start date of a period bucket. Orders (and formats) as `YYYY-MM-DD`, so
/// the string and date orderings agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(NaiveDate);

impl PeriodKey {
    pub fn new(start: NaiveDate) -> Self {
        Self(start)
    }

    pub fn start(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for PeriodKey {
    type Err = chrono::ParseError;

    /// Accepts `YYYY-MM-DD` and anything DuckDB renders a truncated timestamp
    /// as (`YYYY-MM-DD 00:00:00`, `YYYY-MM-DDT00:00:00`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let date_part = trimmed.get(..10).unwrap_or(trimmed);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Week,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Week, Granularity::Month];

    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(str::trim) {
            None | Some("") | Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some(other) => Err(EngineError::UnknownGranularity(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Normalize any date to the start of its bucket (Monday, or the 1st).
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Exclusive end of the bucket starting at `start`.
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Week => start + Duration::days(7),
            Granularity::Month => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start + Duration::days(31)),
        }
    }

    pub fn period_hours(&self, start: NaiveDate) -> i64 {
        (self.period_end(start) - start).num_hours()
    }

    pub fn key_for(&self, date: NaiveDate) -> PeriodKey {
        PeriodKey(self.period_start(date))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinct period keys present in `rows`, most recent first.
///
/// Input order and duplicates are irrelevant; the result is ordered purely
/// by period value.
pub fn build_period_index<D>(rows: &[MetricRow<D>]) -> Vec<PeriodKey> {
    let mut keys: Vec<PeriodKey> = rows.iter().map(|r| r.period).collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.dedup();
    keys
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSelection {
    /// Most recent period in the index, even if still in progress.
    #[default]
    Latest,
    /// Most recent period whose end has passed.
    Complete,
    /// No single reference; totals span every period.
    AllTime,
}

impl ReferenceSelection {
    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(str::trim) {
            None | Some("") | Some("latest") => Ok(Self::Latest),
            Some("complete") => Ok(Self::Complete),
            Some("all_time") => Ok(Self::AllTime),
            Some(other) => Err(EngineError::UnknownReference(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSelection::Latest => "latest",
            ReferenceSelection::Complete => "complete",
            ReferenceSelection::AllTime => "all_time",
        }
    }
}

/// Parse a comma-separated period list, normalizing each date to the start
/// of its bucket. Order is kept; blank entries are skipped. `None` when the
/// list is absent or empty.
pub fn parse_periods(
    raw: Option<&str>,
    granularity: Granularity,
) -> Result<Option<Vec<PeriodKey>>, EngineError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut periods = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let key: PeriodKey = item
            .parse()
            .map_err(|_| EngineError::InvalidPeriod(item.to_string()))?;
        periods.push(granularity.key_for(key.start()));
    }
    Ok((!periods.is_empty()).then_some(periods))
}

/// A [`ReferenceSelection`] resolved against a concrete period index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Period { idx: usize, key: PeriodKey },
    AllTime,
    Empty,
}

impl Reference {
    pub fn key(&self) -> Option<PeriodKey> {
        match self {
            Reference::Period { key, .. } => Some(*key),
            _ => None,
        }
    }
}

pub fn resolve_reference(
    index: &[PeriodKey],
    granularity: Granularity,
    selection: ReferenceSelection,
    now: NaiveDateTime,
) -> Reference {
    let Some(latest) = index.first() else {
        return Reference::Empty;
    };
    let at = |idx: usize| {
        index
            .get(idx)
            .map(|key| Reference::Period { idx, key: *key })
            .unwrap_or(Reference::Empty)
    };
    match selection {
        ReferenceSelection::AllTime => Reference::AllTime,
        ReferenceSelection::Latest => at(0),
        ReferenceSelection::Complete => {
            if is_in_progress(*latest, granularity, now) {
                at(1)
            } else {
                at(0)
            }
        }
    }
}

/// True once `now` has reached the period start but not yet its end.
/// Future-dated keys also count as not elapsed.
pub fn is_in_progress(key: PeriodKey, granularity: Granularity, now: NaiveDateTime) -> bool {
    let end = granularity.period_end(key.start());
    now.date() < end
}

/// Share of the period elapsed at `now`, 0–100. Drives progress bars only.
pub fn period_progress(key: PeriodKey, granularity: Granularity, now: NaiveDateTime) -> f64 {
    let start = key.start().and_time(chrono::NaiveTime::MIN);
    let total_hours = granularity.period_hours(key.start());
    if total_hours <= 0 {
        return 0.0;
    }
    let elapsed_hours = (now - start).num_minutes() as f64 / 60.0;
    (elapsed_hours / total_hours as f64 * 100.0).clamp(0.0, 100.0)
}

/// Wall-clock time in the dashboard's zone.
pub fn local_now(tz: &Tz) -> NaiveDateTime {
    Utc::now().with_timezone(tz).naive_local()
}
