use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "orion")]
#[command(version, about = "Orion growth studio backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = orion::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and the run workers
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Development mode: permissive CORS, built-in JWT secret when none is set
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and its schema, then exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Fail runs stuck in `running` and exit
    Sweep {
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Age after which a running run counts as stale
        #[arg(long)]
        stale_after_secs: Option<u64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Report configuration problems; exits non-zero if any
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = cmd::load_config(&cli.config)?;
    let _log_guard = orion::telemetry::init(
        config.logging.format,
        config.logging.directory.as_deref(),
        cli.verbose,
    )?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            dev,
        } => cmd::cmd_serve(config, host, port, db_path, dev).await?,
        Commands::InitDb { db_path } => cmd::cmd_init_db(&config, db_path)?,
        Commands::Sweep {
            db_path,
            stale_after_secs,
        } => cmd::cmd_sweep(&config, db_path, stale_after_secs).await?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command)?,
    }

    Ok(())
}
