use anyhow::Result;
use async_trait::async_trait;

use pulseboard_core::ignore::IgnoreRule;
use pulseboard_core::period::Granularity;
use pulseboard_core::source::{RollupSource, RowsPage};

use crate::queries::rollups::RollupRecord;
use crate::DuckDbBackend;

#[async_trait]
impl RollupSource for DuckDbBackend {
    async fn fetch_rows_page(
        &self,
        granularity: Granularity,
        dimension: &str,
        offset: i64,
        limit: i64,
    ) -> Result<RowsPage> {
        crate::queries::rollups::fetch_rows_page_inner(self, granularity, dimension, offset, limit)
            .await
    }

    async fn list_ignore_rules(&self) -> Result<Vec<IgnoreRule>> {
        crate::queries::ignore_rules::list_ignore_rules_inner(self).await
    }
}

impl DuckDbBackend {
    pub async fn insert_rollups(
        &self,
        granularity: Granularity,
        records: &[RollupRecord],
    ) -> Result<()> {
        crate::queries::rollups::insert_rollups_inner(self, granularity, records).await
    }

    pub async fn insert_ignore_rule(&self, rule: &IgnoreRule) -> Result<()> {
        crate::queries::ignore_rules::insert_ignore_rule_inner(self, rule).await
    }
}
