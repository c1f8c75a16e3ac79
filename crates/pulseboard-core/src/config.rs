use std::time::Duration;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    /// IANA zone the "now" clock is read in. Weekday and period progress
    /// follow the dashboard's local calendar, not UTC.
    pub timezone: Tz,
    pub refresh_interval_secs: u64,
    pub page_size: i64,
    pub projection_grace_days: i64,
    pub series_len: usize,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            timezone: Tz::UTC,
            refresh_interval_secs: 60,
            page_size: 1000,
            projection_grace_days: 14,
            series_len: 12,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("PULSEBOARD_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("PULSEBOARD_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("PULSEBOARD_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            timezone: {
                let raw =
                    std::env::var("PULSEBOARD_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
                raw.parse::<Tz>()
                    .map_err(|_| format!("invalid timezone: {raw}"))?
            },
            refresh_interval_secs: std::env::var("PULSEBOARD_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60)
                .max(1),
            page_size: std::env::var("PULSEBOARD_PAGE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000)
                .clamp(1, 100_000),
            projection_grace_days: std::env::var("PULSEBOARD_PROJECTION_GRACE_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse()
                .unwrap_or(14)
                .max(0),
            series_len: std::env::var("PULSEBOARD_SERIES_LEN")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .unwrap_or(12)
                .clamp(1, 104),
            cors_origins: std::env::var("PULSEBOARD_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
