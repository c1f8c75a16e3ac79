use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::Accumulator;
use crate::error::EngineError;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankOptions {
    /// Case-insensitive substring; empty matches everything.
    pub search: String,
    /// `None` keeps every matching value.
    pub top_n: Option<usize>,
    pub include_zero: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            search: String::new(),
            top_n: Some(DEFAULT_TOP_N),
            include_zero: false,
        }
    }
}

impl RankOptions {
    /// Validates a caller-supplied limit. Negative limits are a contract
    /// violation; zero means "no limit".
    pub fn new(
        search: Option<&str>,
        top_n: Option<i64>,
        include_zero: bool,
    ) -> Result<Self, EngineError> {
        let top_n = match top_n {
            None => Some(DEFAULT_TOP_N),
            Some(n) if n < 0 => return Err(EngineError::InvalidTopN(n)),
            Some(0) => None,
            Some(n) => Some(n as usize),
        };
        Ok(Self {
            search: search.map(str::trim).unwrap_or_default().to_string(),
            top_n,
            include_zero,
        })
    }
}

fn matches_search<D: AsRef<str>>(value: &D, needle: &str) -> bool {
    needle.is_empty() || value.as_ref().to_lowercase().contains(needle)
}

/// Dimension values ordered by reference-period magnitude.
///
/// Ties keep map order, which for a `BTreeMap` is ascending by value, so
/// equal totals rank alphabetically.
pub fn rank<D>(by_value: &BTreeMap<D, Accumulator>, options: &RankOptions) -> Vec<D>
where
    D: Clone + Ord + AsRef<str>,
{
    let needle = options.search.to_lowercase();
    let mut ranked: Vec<(&D, i64)> = by_value
        .iter()
        .filter(|(value, _)| matches_search(*value, &needle))
        .filter(|(_, acc)| options.include_zero || acc.current != 0)
        .map(|(value, acc)| (value, acc.current))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    if let Some(n) = options.top_n {
        ranked.truncate(n);
    }
    ranked.into_iter().map(|(value, _)| value.clone()).collect()
}
