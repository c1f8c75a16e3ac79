//! Row shape shared by every rollup table, plus the metric and dimension
//! vocabularies.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::period::PeriodKey;

/// Substituted for null or empty dimension values at mapping time.
pub const NONE_SENTINEL: &str = "(none)";

pub const VALID_DIMENSIONS: &[&str] = &[
    "channel",
    "source",
    "medium",
    "campaign",
    "keyword",
    "first_touch_source",
];

pub fn is_valid_dimension(d: &str) -> bool {
    VALID_DIMENSIONS.contains(&d)
}

pub fn parse_dimension(raw: &str) -> Result<&'static str, EngineError> {
    VALID_DIMENSIONS
        .iter()
        .copied()
        .find(|d| *d == raw.trim())
        .ok_or_else(|| EngineError::UnknownDimension(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Sessions,
    Demos,
    Signups,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Sessions, Metric::Demos, Metric::Signups];

    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(str::trim) {
            None | Some("") | Some("sessions") => Ok(Self::Sessions),
            Some("demos") => Ok(Self::Demos),
            Some("signups") => Ok(Self::Signups),
            Some(other) => Err(EngineError::UnknownMetric(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Sessions => "sessions",
            Metric::Demos => "demos",
            Metric::Signups => "signups",
        }
    }

    /// Conversion rate only makes sense for metrics measured against sessions.
    pub fn has_conversion_rate(&self) -> bool {
        !matches!(self, Metric::Sessions)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rolled-up observation for a (period, dimension value) pair.
///
/// `D` is the dimension key. Rollup tables name their dimension column
/// differently; the fetch collaborator maps each table onto this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow<D = String> {
    pub period: PeriodKey,
    pub dimension: D,
    pub sessions: i64,
    pub demos: i64,
    pub signups: i64,
}

impl<D> MetricRow<D> {
    pub fn value(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Sessions => self.sessions,
            Metric::Demos => self.demos,
            Metric::Signups => self.signups,
        }
    }
}

impl MetricRow<String> {
    /// Build a row from a nullable source column, substituting
    /// [`NONE_SENTINEL`] for null or blank values.
    pub fn from_source(
        period: PeriodKey,
        dimension: Option<&str>,
        sessions: i64,
        demos: i64,
        signups: i64,
    ) -> Self {
        Self {
            period,
            dimension: normalize_dimension(dimension),
            sessions,
            demos,
            signups,
        }
    }
}

pub fn normalize_dimension(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NONE_SENTINEL.to_string(),
    }
}

/// SHA-256 over the row set in input order, as 16 hex chars.
///
/// Used by callers as the row-set identity for memoization; two fetches that
/// return the same rows in the same order share a fingerprint.
pub fn fingerprint_rows<D: AsRef<str>>(rows: &[MetricRow<D>]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(row.period.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(row.dimension.as_ref().as_bytes());
        hasher.update([0u8]);
        hasher.update(row.sessions.to_le_bytes());
        hasher.update(row.demos.to_le_bytes());
        hasher.update(row.signups.to_le_bytes());
    }
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}
