use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::agents::AgentEngine;
use super::api::{self, AppState, SharedState, WhatsAppSettings};
use super::db::{DbHandle, StudioDb};
use super::runner::{RunOrchestrator, RunnerConfig};
use super::whatsapp::{CloudApiSender, MessageSender};
use super::workflow::{DEFAULT_WEBHOOK_URL, WebhookWorkflowEngine};
use crate::auth::TokenService;

/// Configuration for the studio server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Allowed CORS origins; empty or `"*"` means any.
    pub cors_origins: Vec<String>,
    pub jwt_secret: Option<String>,
    pub token_ttl: Duration,
    pub dev_mode: bool,
    pub runner: RunnerConfig,
    pub sweep_interval: Duration,
    pub workflow_url: String,
    pub workflow_timeout: Duration,
    pub whatsapp_verify_token: Option<String>,
    pub whatsapp_api_url: Option<String>,
    pub whatsapp_access_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from(".orion/orion.db"),
            cors_origins: Vec::new(),
            jwt_secret: None,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            dev_mode: false,
            runner: RunnerConfig::default(),
            sweep_interval: Duration::from_secs(60),
            workflow_url: DEFAULT_WEBHOOK_URL.to_string(),
            workflow_timeout: Duration::from_secs(120),
            whatsapp_verify_token: None,
            whatsapp_api_url: None,
            whatsapp_access_token: None,
        }
    }
}

/// Open the database at `path`, creating its parent directory first.
pub fn open_database(path: &Path) -> Result<StudioDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    StudioDb::new(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Build the full application router.
pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    api::api_router()
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Periodically fail runs that have been `running` longer than the
/// orchestrator's `stale_after`.
pub fn spawn_sweeper(orchestrator: RunOrchestrator, interval: Duration) -> JoinHandle<()> {
    let stale_after = orchestrator.config().stale_after;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; startup recovery already ran.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = orchestrator.sweep_stale(stale_after).await {
                error!(error = %e, "Stale run sweep failed");
            }
        }
    })
}

fn token_service(config: &ServerConfig) -> Result<TokenService> {
    match &config.jwt_secret {
        Some(secret) => Ok(TokenService::new(secret.clone(), config.token_ttl)?),
        None if config.dev_mode => {
            warn!("No JWT secret configured; using the development secret");
            Ok(TokenService::new_dev(config.token_ttl))
        }
        None => anyhow::bail!("JWT_SECRET must be set (or run with --dev)"),
    }
}

fn whatsapp_settings(config: &ServerConfig) -> Result<WhatsAppSettings> {
    let sender: Option<Arc<dyn MessageSender>> =
        match (&config.whatsapp_api_url, &config.whatsapp_access_token) {
            (Some(url), Some(token)) => Some(Arc::new(CloudApiSender::new(
                url.clone(),
                token.clone(),
                config.workflow_timeout,
            )?)),
            _ => None,
        };
    Ok(WhatsAppSettings {
        verify_token: config.whatsapp_verify_token.clone(),
        sender,
    })
}

/// Start the studio server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let tokens = token_service(&config)?;
    let db = DbHandle::new(open_database(&config.db_path)?);

    let orchestrator = RunOrchestrator::new(
        db.clone(),
        Arc::new(AgentEngine::default()),
        config.runner.clone(),
    );
    orchestrator
        .recover()
        .await
        .context("Failed to recover runs from previous process")?;
    spawn_sweeper(orchestrator.clone(), config.sweep_interval);

    let workflow = WebhookWorkflowEngine::new(config.workflow_url.clone(), config.workflow_timeout)?;
    info!(url = %workflow.url(), "Workflow webhook configured");
    let state = Arc::new(AppState {
        db,
        orchestrator,
        tokens: Arc::new(tokens),
        workflow: Arc::new(workflow),
        whatsapp: whatsapp_settings(&config)?,
    });

    let app = build_router(state, &config.cors_origins);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, db = %config.db_path.display(), "ORION backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
