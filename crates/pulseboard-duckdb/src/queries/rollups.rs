use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use pulseboard_core::metric::{is_valid_dimension, MetricRow};
use pulseboard_core::period::{Granularity, PeriodKey};
use pulseboard_core::source::RowsPage;

use crate::schema::{period_column, rollup_table, rollup_view_name};
use crate::DuckDbBackend;

/// One raw row of a rollup table, as the upstream pipeline writes it.
///
/// Used by fixtures and dev seeding; the dashboard itself never writes.
#[derive(Debug, Clone, Default)]
pub struct RollupRecord {
    pub period_start: NaiveDate,
    pub channel: Option<String>,
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub keyword: Option<String>,
    pub first_touch_source: Option<String>,
    pub sessions: i64,
    pub demos: i64,
    pub signups: i64,
}

/// One page of a per-dimension view, newest period first.
///
/// Within a period rows are ordered by dimension value with nulls first, so
/// pages are stable across calls as long as the data does not change.
pub async fn fetch_rows_page_inner(
    db: &DuckDbBackend,
    granularity: Granularity,
    dimension: &str,
    offset: i64,
    limit: i64,
) -> Result<RowsPage> {
    if !is_valid_dimension(dimension) {
        return Err(anyhow!("invalid dimension: {}", dimension));
    }
    if limit <= 0 || offset < 0 {
        return Err(anyhow!("invalid page: offset={} limit={}", offset, limit));
    }

    let view = rollup_view_name(granularity, dimension);
    let period = period_column(granularity);
    let conn = db.conn.lock().await;

    let total: i64 = conn
        .prepare(&format!("SELECT COUNT(*) FROM {view}"))?
        .query_row([], |row| row.get(0))?;

    let data_sql = format!(
        "SELECT CAST({period} AS VARCHAR), {dimension}, sessions, demos, signups \
         FROM {view} \
         ORDER BY {period} DESC, {dimension} ASC NULLS FIRST \
         LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&data_sql)?;
    let raw = stmt
        .query_map(duckdb::params![limit, offset], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(raw.len());
    for (period_start, value, sessions, demos, signups) in raw {
        let key: PeriodKey = period_start.parse()?;
        rows.push(MetricRow::from_source(
            key,
            value.as_deref(),
            sessions.unwrap_or(0),
            demos.unwrap_or(0),
            signups.unwrap_or(0),
        ));
    }

    let has_more = offset + (rows.len() as i64) < total;
    Ok(RowsPage { rows, has_more })
}

/// Append raw rollup records to the table for `granularity`.
pub async fn insert_rollups_inner(
    db: &DuckDbBackend,
    granularity: Granularity,
    records: &[RollupRecord],
) -> Result<()> {
    let table = rollup_table(granularity);
    let period = period_column(granularity);
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} \
         ({period}, channel, source, medium, campaign, keyword, first_touch_source, \
          sessions, demos, signups) \
         VALUES (CAST(?1 AS DATE), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    ))?;
    for record in records {
        stmt.execute(duckdb::params![
            record.period_start.format("%Y-%m-%d").to_string(),
            record.channel,
            record.source,
            record.medium,
            record.campaign,
            record.keyword,
            record.first_touch_source,
            record.sessions,
            record.demos,
            record.signups,
        ])?;
    }
    Ok(())
}
