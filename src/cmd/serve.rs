//! API server command: `orion serve`.

use std::path::PathBuf;

use anyhow::Result;
use orion::config::OrionConfig;
use tracing::warn;

pub async fn cmd_serve(
    mut config: OrionConfig,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.database.path = db_path;
    }

    let problems = config.validate();
    if !problems.is_empty() {
        if !dev {
            anyhow::bail!(
                "Invalid configuration (use --dev to start anyway):\n  - {}",
                problems.join("\n  - ")
            );
        }
        for problem in &problems {
            warn!(%problem, "Configuration problem ignored in dev mode");
        }
    }

    orion::studio::server::start_server(config.to_server_config(dev)).await
}
