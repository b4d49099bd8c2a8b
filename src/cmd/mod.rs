//! CLI command implementations.
//!
//! | Module   | Commands handled    |
//! |----------|---------------------|
//! | `serve`  | `Serve`             |
//! | `db`     | `InitDb`, `Sweep`   |
//! | `config` | `Config`            |

pub mod config;
pub mod db;
pub mod serve;

use std::path::Path;

use anyhow::Result;
use orion::config::OrionConfig;

pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_sweep};
pub use serve::cmd_serve;

/// Read `orion.toml` (if present) and overlay the environment.
pub fn load_config(path: &Path) -> Result<OrionConfig> {
    let mut config = OrionConfig::load_or_default(path)?;
    config.apply_process_env()?;
    Ok(config)
}
