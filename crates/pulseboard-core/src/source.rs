//! Row-fetch collaborator abstraction.

use async_trait::async_trait;

use crate::ignore::IgnoreRule;
use crate::metric::MetricRow;
use crate::period::Granularity;

#[derive(Debug, Clone)]
pub struct RowsPage {
    pub rows: Vec<MetricRow>,
    pub has_more: bool,
}

/// Storage holding the materialized rollups and the ignore-rule list.
///
/// Pages come back ordered by period descending. The engine never sees a
/// page: [`fetch_all_rows`] accumulates them first.
#[async_trait]
pub trait RollupSource: Send + Sync + 'static {
    async fn fetch_rows_page(
        &self,
        granularity: Granularity,
        dimension: &str,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<RowsPage>;

    async fn list_ignore_rules(&self) -> anyhow::Result<Vec<IgnoreRule>>;
}

/// Drain every page of one rollup.
pub async fn fetch_all_rows(
    source: &dyn RollupSource,
    granularity: Granularity,
    dimension: &str,
    page_size: i64,
) -> anyhow::Result<Vec<MetricRow>> {
    let limit = page_size.max(1);
    let mut offset = 0;
    let mut rows = Vec::new();
    loop {
        let page = source
            .fetch_rows_page(granularity, dimension, offset, limit)
            .await?;
        let fetched = page.rows.len() as i64;
        rows.extend(page.rows);
        if !page.has_more || fetched == 0 {
            break;
        }
        offset += fetched;
    }
    tracing::debug!(
        granularity = %granularity,
        dimension,
        rows = rows.len(),
        "Rollup fetched"
    );
    Ok(rows)
}
