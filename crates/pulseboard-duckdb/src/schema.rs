use pulseboard_core::metric::VALID_DIMENSIONS;
use pulseboard_core::period::Granularity;

/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// Every statement is idempotent (`IF NOT EXISTS` / `OR REPLACE`) so it is
/// safe to re-run on every startup.
///
/// The rollup tables are written by the upstream pipeline; this service only
/// reads them. One row per (period, channel, source, medium, campaign,
/// keyword, first-touch source) combination. The per-dimension views fold
/// the other columns away.
///
/// IMPORTANT:
///   - Always set an explicit memory limit. The DuckDB default (80% of
///     system RAM) is not acceptable for a server process.
///   - `SET threads = 2` limits the background thread pool.
pub fn init_sql(memory_limit: &str) -> String {
    let mut sql = format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- WEEKLY ROLLUPS (week_start is always a Monday)
-- ===========================================
CREATE TABLE IF NOT EXISTS weekly_rollups (
    week_start          DATE NOT NULL,
    channel             VARCHAR,
    source              VARCHAR,
    medium              VARCHAR,
    campaign            VARCHAR,
    keyword             VARCHAR,
    first_touch_source  VARCHAR,
    sessions            BIGINT NOT NULL DEFAULT 0,
    demos               BIGINT NOT NULL DEFAULT 0,   -- demo form submissions
    signups             BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_weekly_rollups_week ON weekly_rollups(week_start);

-- ===========================================
-- MONTHLY ROLLUPS (month_start is always the 1st)
-- ===========================================
CREATE TABLE IF NOT EXISTS monthly_rollups (
    month_start         DATE NOT NULL,
    channel             VARCHAR,
    source              VARCHAR,
    medium              VARCHAR,
    campaign            VARCHAR,
    keyword             VARCHAR,
    first_touch_source  VARCHAR,
    sessions            BIGINT NOT NULL DEFAULT 0,
    demos               BIGINT NOT NULL DEFAULT 0,
    signups             BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_monthly_rollups_month ON monthly_rollups(month_start);

-- ===========================================
-- IGNORE RULES (managed elsewhere; read-only here)
-- is_regex wins over is_glob; neither flag means exact match.
-- ===========================================
CREATE TABLE IF NOT EXISTS ignore_rules (
    id              VARCHAR PRIMARY KEY,
    pattern         VARCHAR NOT NULL,
    is_regex        BOOLEAN NOT NULL DEFAULT false,
    is_glob         BOOLEAN NOT NULL DEFAULT false,
    note            VARCHAR,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#
    );

    for granularity in Granularity::ALL {
        let table = rollup_table(granularity);
        let period = period_column(granularity);
        for dimension in VALID_DIMENSIONS {
            // SUM over BIGINT widens to HUGEINT; cast back so rows read as i64.
            sql.push_str(&format!(
                "CREATE OR REPLACE VIEW {view} AS \
                 SELECT {period}, {dimension}, \
                        CAST(SUM(sessions) AS BIGINT) AS sessions, \
                        CAST(SUM(demos) AS BIGINT) AS demos, \
                        CAST(SUM(signups) AS BIGINT) AS signups \
                 FROM {table} \
                 GROUP BY {period}, {dimension};\n",
                view = rollup_view_name(granularity, dimension),
            ));
        }
    }
    sql
}

pub fn rollup_table(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Week => "weekly_rollups",
        Granularity::Month => "monthly_rollups",
    }
}

pub fn period_column(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Week => "week_start",
        Granularity::Month => "month_start",
    }
}

/// e.g. `weekly_by_channel`. Callers must pass a validated dimension; the
/// name is interpolated into SQL.
pub fn rollup_view_name(granularity: Granularity, dimension: &str) -> String {
    let prefix = match granularity {
        Granularity::Week => "weekly",
        Granularity::Month => "monthly",
    };
    format!("{prefix}_by_{dimension}")
}
