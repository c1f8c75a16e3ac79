use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use pulseboard_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulseboard=info".parse()?),
        )
        .json()
        .init();

    let cfg = pulseboard_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/pulseboard.db", cfg.data_dir);

    let db = pulseboard_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    let state = Arc::new(AppState::new(db, cfg.clone()));

    // Spawn background snapshot refresh. The first tick fires immediately,
    // so snapshots are warm shortly after startup.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_refresh_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = pulseboard_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        timezone = %cfg.timezone,
        refresh_secs = cfg.refresh_interval_secs,
        "Pulseboard listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
