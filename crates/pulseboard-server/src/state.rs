use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use pulseboard_core::{
    config::Config,
    ignore::{IgnoreMatcher, IgnoreRule, RuleKind},
    metric::{fingerprint_rows, MetricRow, VALID_DIMENSIONS},
    period::{local_now, Granularity, PeriodKey},
    projection::{current_projection, ProjectionInfo},
    report::ReportSettings,
    source::{fetch_all_rows, RollupSource},
};
use pulseboard_duckdb::DuckDbBackend;

/// Memoized reports are dropped wholesale past this many entries.
const MAX_CACHED_REPORTS: usize = 512;

/// One fully accumulated rollup for a (granularity, dimension) pair.
#[derive(Debug)]
pub struct RowSnapshot {
    pub rows: Vec<MetricRow>,
    /// Row-set identity; see [`fingerprint_rows`].
    pub fingerprint: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RuleSnapshot {
    pub rules: Vec<IgnoreRule>,
    pub matcher: IgnoreMatcher,
    pub fingerprint: String,
}

/// Identity of a memoized report.
///
/// `params` carries everything besides the two inputs' fingerprints that the
/// report depends on: route, dimension, controls and the local date. Within
/// a date only the projection drifts; see [`AppState::cached_report`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub rows_fingerprint: String,
    pub rules_fingerprint: String,
    pub params: String,
}

/// A memoized report body plus what is needed to re-evaluate its
/// projection block against the clock.
#[derive(Debug, Clone)]
pub struct CachedReport {
    pub data: serde_json::Value,
    pub reference: Option<PeriodKey>,
    pub granularity: Granularity,
    pub projection: ProjectionInfo,
}

/// Snapshot freshness as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStatus {
    pub loaded: usize,
    pub oldest_age_secs: Option<i64>,
    pub rules_loaded: bool,
}

type SnapshotKey = (Granularity, &'static str);

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// The engine in `pulseboard-core` is stateless; snapshots and the report
/// memo live here.
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// The same backend seen through the fetch collaborator trait.
    source: Arc<dyn RollupSource>,

    /// Latest accumulated rows per (granularity, dimension).
    ///
    /// Replaced wholesale by the refresh loop; a missing entry is fetched on
    /// first request.
    snapshots: Arc<RwLock<HashMap<SnapshotKey, Arc<RowSnapshot>>>>,

    rules: Arc<RwLock<Option<Arc<RuleSnapshot>>>>,

    reports: Arc<Mutex<HashMap<ReportKey, CachedReport>>>,

    /// Pinned local clock; `None` reads the configured timezone.
    clock: StdRwLock<Option<NaiveDateTime>>,
}

impl AppState {
    /// Construct a new `AppState` wrapping the given backend and config.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        let source: Arc<dyn RollupSource> = db.clone();
        Self {
            db,
            config: Arc::new(config),
            source,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            rules: Arc::new(RwLock::new(None)),
            reports: Arc::new(Mutex::new(HashMap::new())),
            clock: StdRwLock::new(None),
        }
    }

    /// Pin the local clock instead of reading the configured timezone.
    pub fn with_fixed_now(self, now: NaiveDateTime) -> Self {
        self.pin_clock(now);
        self
    }

    pub fn pin_clock(&self, now: NaiveDateTime) {
        if let Ok(mut clock) = self.clock.write() {
            *clock = Some(now);
        }
    }

    /// Wall-clock time in the dashboard's timezone.
    pub fn now(&self) -> NaiveDateTime {
        self.clock
            .read()
            .ok()
            .and_then(|clock| *clock)
            .unwrap_or_else(|| local_now(&self.config.timezone))
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            series_len: self.config.series_len,
            grace_days: self.config.projection_grace_days,
        }
    }

    /// Rows for one rollup, from the snapshot map or fetched on a miss.
    pub async fn rows(
        &self,
        granularity: Granularity,
        dimension: &'static str,
    ) -> anyhow::Result<Arc<RowSnapshot>> {
        {
            let snapshots = self.snapshots.read().await;
            if let Some(snapshot) = snapshots.get(&(granularity, dimension)) {
                return Ok(Arc::clone(snapshot));
            }
        }
        self.load_rows(granularity, dimension).await
    }

    pub async fn ignore_rules(&self) -> anyhow::Result<Arc<RuleSnapshot>> {
        {
            let rules = self.rules.read().await;
            if let Some(snapshot) = rules.as_ref() {
                return Ok(Arc::clone(snapshot));
            }
        }
        self.load_rules().await
    }

    async fn load_rows(
        &self,
        granularity: Granularity,
        dimension: &'static str,
    ) -> anyhow::Result<Arc<RowSnapshot>> {
        let rows = fetch_all_rows(
            self.source.as_ref(),
            granularity,
            dimension,
            self.config.page_size,
        )
        .await?;
        let snapshot = Arc::new(RowSnapshot {
            fingerprint: fingerprint_rows(&rows),
            rows,
            fetched_at: Utc::now(),
        });

        let previous = self
            .snapshots
            .write()
            .await
            .insert((granularity, dimension), Arc::clone(&snapshot));
        if let Some(previous) = previous {
            if previous.fingerprint != snapshot.fingerprint {
                debug!(
                    granularity = %granularity,
                    dimension,
                    fingerprint = %snapshot.fingerprint,
                    "Rollup changed"
                );
            }
        }
        Ok(snapshot)
    }

    async fn load_rules(&self) -> anyhow::Result<Arc<RuleSnapshot>> {
        let rules = self.source.list_ignore_rules().await?;
        let snapshot = Arc::new(RuleSnapshot {
            matcher: IgnoreMatcher::compile(&rules),
            fingerprint: fingerprint_rules(&rules),
            rules,
        });
        *self.rules.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Refetch the ignore rules and every rollup, then drop memoized reports
    /// built from data that is no longer current.
    pub async fn refresh_all(&self) -> anyhow::Result<()> {
        self.load_rules().await?;
        for granularity in Granularity::ALL {
            for &dimension in VALID_DIMENSIONS {
                self.load_rows(granularity, dimension).await?;
            }
        }
        self.prune_reports().await;
        Ok(())
    }

    /// Background loop: refresh snapshots on a fixed interval.
    ///
    /// Spawned as a `tokio::spawn` task in `main.rs`. A failed refresh keeps
    /// the previous snapshots in place.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let interval = self.config.refresh_interval();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.refresh_all().await {
                Ok(()) => info!("Rollup snapshots refreshed"),
                Err(e) => error!(error = %e, "Snapshot refresh failed, serving previous data"),
            }
        }
    }

    /// A memoized report with its projection block brought up to `now`.
    ///
    /// Returns `None` when the projection outcome has changed since the
    /// report was built, so the caller rebuilds it.
    pub async fn cached_report(&self, key: &ReportKey) -> Option<serde_json::Value> {
        let hit = self.reports.lock().await.get(key).cloned()?;
        let projection = current_projection(
            hit.reference,
            hit.granularity,
            self.now(),
            self.config.projection_grace_days,
        );
        if !projection.same_outcome(&hit.projection) {
            return None;
        }
        let mut data = hit.data;
        if let Some(slot) = data.get_mut("projection") {
            *slot = serde_json::to_value(&projection).ok()?;
        }
        Some(data)
    }

    pub async fn store_report(&self, key: ReportKey, report: CachedReport) {
        let mut reports = self.reports.lock().await;
        if reports.len() >= MAX_CACHED_REPORTS {
            reports.clear();
        }
        reports.insert(key, report);
    }

    pub async fn cached_report_count(&self) -> usize {
        self.reports.lock().await.len()
    }

    pub async fn snapshot_status(&self) -> SnapshotStatus {
        let now = Utc::now();
        let snapshots = self.snapshots.read().await;
        let oldest: Option<DateTime<Utc>> = snapshots.values().map(|s| s.fetched_at).min();
        SnapshotStatus {
            loaded: snapshots.len(),
            oldest_age_secs: oldest.map(|at| (now - at).num_seconds().max(0)),
            rules_loaded: self.rules.read().await.is_some(),
        }
    }

    async fn prune_reports(&self) {
        let live: HashSet<String> = self
            .snapshots
            .read()
            .await
            .values()
            .map(|s| s.fingerprint.clone())
            .collect();
        let rules_fingerprint = self
            .rules
            .read()
            .await
            .as_ref()
            .map(|r| r.fingerprint.clone());

        let mut reports = self.reports.lock().await;
        let before = reports.len();
        reports.retain(|key, _| {
            live.contains(&key.rows_fingerprint)
                && rules_fingerprint.as_deref() == Some(key.rules_fingerprint.as_str())
        });
        if reports.len() != before {
            debug!(dropped = before - reports.len(), "Stale reports pruned");
        }
    }
}

/// SHA-256 over the rule list in order, as 16 hex chars.
pub fn fingerprint_rules(rules: &[IgnoreRule]) -> String {
    let mut hasher = Sha256::new();
    for rule in rules {
        let kind: u8 = match rule.kind {
            RuleKind::Literal => 0,
            RuleKind::Glob => 1,
            RuleKind::Regex => 2,
        };
        hasher.update(rule.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(rule.pattern.as_bytes());
        hasher.update([0u8, kind]);
    }
    hex::encode(&hasher.finalize()[..8])
}
