//! Database maintenance commands: `orion init-db` and `orion sweep`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use orion::config::{MAX_DURATION_SECS, OrionConfig};
use orion::studio::db::DbHandle;
use orion::studio::runner::sweep_stale_runs;
use orion::studio::server::open_database;
use tracing::info;

pub fn cmd_init_db(config: &OrionConfig, db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or_else(|| config.database.path.clone());
    open_database(&path)?;
    info!(path = %path.display(), "Database schema ready");
    println!("Database initialized at {}", path.display());
    Ok(())
}

pub async fn cmd_sweep(
    config: &OrionConfig,
    db_path: Option<PathBuf>,
    stale_after_secs: Option<u64>,
) -> Result<()> {
    let path = db_path.unwrap_or_else(|| config.database.path.clone());
    let stale_after = stale_after_secs.unwrap_or(config.runs.stale_after_secs);
    if stale_after == 0 || stale_after > MAX_DURATION_SECS {
        anyhow::bail!(
            "--stale-after-secs must be between 1 and {}",
            MAX_DURATION_SECS
        );
    }

    let db = DbHandle::new(open_database(&path)?);
    let failed = sweep_stale_runs(&db, Duration::from_secs(stale_after)).await?;
    println!(
        "Swept {} stale run(s) older than {}s",
        failed, stale_after
    );
    Ok(())
}
