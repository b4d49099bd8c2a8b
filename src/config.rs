//! Layered configuration for the Orion server.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. `orion.toml` (missing file means all defaults)
//! 2. Environment variables (`.env` is loaded by the binary first)
//! 3. CLI flags, applied by the `serve` command
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! cors_origins = ["https://app.oriongrowthstudio.cloud"]
//!
//! [database]
//! path = ".orion/orion.db"
//!
//! [auth]
//! jwt_secret = "change-me-to-at-least-32-characters!"
//! token_ttl_minutes = 1440
//!
//! [runs]
//! workers = 4
//! run_timeout_secs = 300
//! stale_after_secs = 900
//! sweep_interval_secs = 60
//!
//! [integrations]
//! workflow_webhook_url = "http://n8n:5678/webhook/orion-execute-agent"
//! workflow_timeout_secs = 120
//! whatsapp_verify_token = "verify-me"
//!
//! [logging]
//! format = "json"
//! directory = "/var/log/orion"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::MIN_SECRET_LEN;
use crate::studio::runner::RunnerConfig;
use crate::studio::server::ServerConfig;
use crate::studio::workflow::DEFAULT_WEBHOOK_URL;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "orion.toml";

/// Upper bound for token lifetimes (one year).
pub const MAX_TOKEN_TTL_MINUTES: u64 = 365 * 24 * 60;

/// Upper bound for every run/sweep duration (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Output format of the stderr log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown log format '{}' (expected pretty or json)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["https://app.oriongrowthstudio.cloud".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".orion/orion.db")
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

fn default_token_ttl_minutes() -> u64 {
    24 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RunsSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            run_timeout_secs: default_run_timeout_secs(),
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IntegrationsSection {
    #[serde(default = "default_workflow_webhook_url")]
    pub workflow_webhook_url: String,
    #[serde(default = "default_workflow_timeout_secs")]
    pub workflow_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_verify_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_access_token: Option<String>,
}

impl Default for IntegrationsSection {
    fn default() -> Self {
        Self {
            workflow_webhook_url: default_workflow_webhook_url(),
            workflow_timeout_secs: default_workflow_timeout_secs(),
            whatsapp_verify_token: None,
            whatsapp_api_url: None,
            whatsapp_access_token: None,
        }
    }
}

impl fmt::Debug for IntegrationsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("IntegrationsSection")
            .field("workflow_webhook_url", &self.workflow_webhook_url)
            .field("workflow_timeout_secs", &self.workflow_timeout_secs)
            .field("whatsapp_verify_token", &redact(&self.whatsapp_verify_token))
            .field("whatsapp_api_url", &self.whatsapp_api_url)
            .field("whatsapp_access_token", &redact(&self.whatsapp_access_token))
            .finish()
    }
}

fn default_workflow_webhook_url() -> String {
    DEFAULT_WEBHOOK_URL.to_string()
}

fn default_workflow_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for daily rolling log files. Stderr only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// Parsed contents of `orion.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrionConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub runs: RunsSection,
    #[serde(default)]
    pub integrations: IntegrationsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl OrionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse orion.toml")
    }

    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Overlay process environment variables.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay variables read through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.path = sqlite_path_from_url(&url)?;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(minutes) = get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.auth.token_ttl_minutes = minutes.trim().parse().with_context(|| {
                format!("ACCESS_TOKEN_EXPIRE_MINUTES must be a whole number, got '{}'", minutes)
            })?;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", port))?;
        }
        if let Some(token) = get("WHATSAPP_VERIFY_TOKEN") {
            self.integrations.whatsapp_verify_token = Some(token);
        }
        if let Some(url) = get("WHATSAPP_API_URL") {
            self.integrations.whatsapp_api_url = Some(url);
        }
        if let Some(token) = get("WHATSAPP_ACCESS_TOKEN") {
            self.integrations.whatsapp_access_token = Some(token);
        }
        if let Some(url) = get("N8N_WEBHOOK_URL") {
            self.integrations.workflow_webhook_url = url;
        }
        if let Some(format) = get("ORION_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Human-readable problems that should stop a production start.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match &self.auth.jwt_secret {
            None => problems.push("auth.jwt_secret is not set (JWT_SECRET)".to_string()),
            Some(secret) if secret.len() < MIN_SECRET_LEN => problems.push(format!(
                "auth.jwt_secret must be at least {} characters (got {})",
                MIN_SECRET_LEN,
                secret.len()
            )),
            Some(_) => {}
        }
        if self.auth.token_ttl_minutes == 0 {
            problems.push("auth.token_ttl_minutes must be greater than 0".to_string());
        } else if self.auth.token_ttl_minutes > MAX_TOKEN_TTL_MINUTES {
            problems.push(format!(
                "auth.token_ttl_minutes must be at most {} (got {})",
                MAX_TOKEN_TTL_MINUTES, self.auth.token_ttl_minutes
            ));
        }
        if self.runs.workers == 0 {
            problems.push("runs.workers must be greater than 0".to_string());
        }
        if self.runs.run_timeout_secs == 0 {
            problems.push("runs.run_timeout_secs must be greater than 0".to_string());
        }
        if self.runs.stale_after_secs == 0 {
            problems.push("runs.stale_after_secs must be greater than 0".to_string());
        } else if self.runs.stale_after_secs < self.runs.run_timeout_secs {
            problems.push(format!(
                "runs.stale_after_secs ({}) is shorter than runs.run_timeout_secs ({}); live runs would be swept",
                self.runs.stale_after_secs, self.runs.run_timeout_secs
            ));
        }
        if self.runs.sweep_interval_secs == 0 {
            problems.push("runs.sweep_interval_secs must be greater than 0".to_string());
        }
        if self.integrations.workflow_timeout_secs == 0 {
            problems.push("integrations.workflow_timeout_secs must be greater than 0".to_string());
        }
        for (key, secs) in [
            ("runs.run_timeout_secs", self.runs.run_timeout_secs),
            ("runs.stale_after_secs", self.runs.stale_after_secs),
            ("runs.sweep_interval_secs", self.runs.sweep_interval_secs),
            (
                "integrations.workflow_timeout_secs",
                self.integrations.workflow_timeout_secs,
            ),
        ] {
            if secs > MAX_DURATION_SECS {
                problems.push(format!(
                    "{} must be at most {} (got {})",
                    key, MAX_DURATION_SECS, secs
                ));
            }
        }

        problems
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            workers: self.runs.workers.max(1),
            run_timeout: bounded_secs(self.runs.run_timeout_secs),
            stale_after: bounded_secs(self.runs.stale_after_secs),
        }
    }

    /// Resolve into the server's runtime configuration.
    ///
    /// In dev mode CORS is permissive and a secret that is too short is dropped
    /// so the development secret takes over.
    pub fn to_server_config(&self, dev_mode: bool) -> ServerConfig {
        let jwt_secret = match &self.auth.jwt_secret {
            Some(secret) if dev_mode && secret.len() < MIN_SECRET_LEN => None,
            other => other.clone(),
        };
        let cors_origins = if dev_mode {
            vec!["*".to_string()]
        } else {
            self.server.cors_origins.clone()
        };

        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            cors_origins,
            jwt_secret,
            token_ttl: Duration::from_secs(
                self.auth.token_ttl_minutes.clamp(1, MAX_TOKEN_TTL_MINUTES) * 60,
            ),
            dev_mode,
            runner: self.runner_config(),
            sweep_interval: bounded_secs(self.runs.sweep_interval_secs),
            workflow_url: self.integrations.workflow_webhook_url.clone(),
            workflow_timeout: bounded_secs(self.integrations.workflow_timeout_secs),
            whatsapp_verify_token: self.integrations.whatsapp_verify_token.clone(),
            whatsapp_api_url: self.integrations.whatsapp_api_url.clone(),
            whatsapp_access_token: self.integrations.whatsapp_access_token.clone(),
        }
    }
}

/// Seconds clamped into `1..=MAX_DURATION_SECS`.
fn bounded_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_DURATION_SECS))
}

/// Turn a `DATABASE_URL` into a SQLite file path.
///
/// Accepts `sqlite:///relative.db`, `sqlite:////abs/path.db`, `sqlite://path.db`
/// and bare paths.
pub fn sqlite_path_from_url(url: &str) -> Result<PathBuf> {
    let url = url.trim();
    if let Some(rest) = url
        .strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
    {
        if rest.is_empty() || rest == ":memory:" {
            anyhow::bail!("DATABASE_URL must name a database file, got '{}'", url);
        }
        return Ok(PathBuf::from(rest));
    }
    if url.contains("://") {
        anyhow::bail!("Only SQLite database URLs are supported, got '{}'", url);
    }
    Ok(PathBuf::from(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let config = OrionConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(
            config.server.cors_origins,
            vec!["https://app.oriongrowthstudio.cloud"]
        );
        assert_eq!(config.database.path, PathBuf::from(".orion/orion.db"));
        assert_eq!(config.auth.token_ttl_minutes, 1440);
        assert_eq!(config.runs.workers, 4);
        assert_eq!(config.integrations.workflow_webhook_url, DEFAULT_WEBHOOK_URL);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_partial_file_keeps_other_defaults() {
        let config = OrionConfig::parse(
            r#"
[server]
port = 9000

[runs]
workers = 8

[logging]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.runs.workers, 8);
        assert_eq!(config.runs.run_timeout_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_rejects_invalid_toml() {
        assert!(OrionConfig::parse("[server\nport = ").is_err());
        assert!(OrionConfig::parse("[server]\nport = \"abc\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrionConfig::load_or_default(&dir.path().join("orion.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orion.toml");
        std::fs::write(&path, "[database]\npath = \"/tmp/x.db\"\n").unwrap();
        let config = OrionConfig::load_or_default(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_toml_string_parses_back() {
        let mut config = OrionConfig::default();
        config.server.port = 1234;
        let text = config.to_toml_string().unwrap();
        assert_eq!(OrionConfig::parse(&text).unwrap().server.port, 1234);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = OrionConfig::parse("[server]\nport = 9000\n").unwrap();
        config
            .apply_env(env(&[
                ("PORT", "8080"),
                ("DATABASE_URL", "sqlite:///./orion.db"),
                ("JWT_SECRET", SECRET),
                ("ACCESS_TOKEN_EXPIRE_MINUTES", "60"),
                ("CORS_ORIGINS", "https://a.example, https://b.example,"),
                ("N8N_WEBHOOK_URL", "http://localhost:5678/hook"),
                ("WHATSAPP_VERIFY_TOKEN", "verify"),
                ("ORION_LOG_FORMAT", "JSON"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("./orion.db"));
        assert_eq!(config.auth.jwt_secret.as_deref(), Some(SECRET));
        assert_eq!(config.auth.token_ttl_minutes, 60);
        assert_eq!(
            config.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            config.integrations.workflow_webhook_url,
            "http://localhost:5678/hook"
        );
        assert_eq!(
            config.integrations.whatsapp_verify_token.as_deref(),
            Some("verify")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = OrionConfig::default();
        config
            .apply_env(env(&[("PORT", ""), ("JWT_SECRET", "  ")]))
            .unwrap();
        assert_eq!(config.server.port, 8000);
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        let mut config = OrionConfig::default();
        assert!(config.apply_env(env(&[("PORT", "eighty")])).is_err());
        assert!(
            config
                .apply_env(env(&[("ACCESS_TOKEN_EXPIRE_MINUTES", "-5")]))
                .is_err()
        );
        assert!(
            config
                .apply_env(env(&[("DATABASE_URL", "postgres://db/orion")]))
                .is_err()
        );
        assert!(config.apply_env(env(&[("ORION_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_sqlite_path_from_url() {
        assert_eq!(
            sqlite_path_from_url("sqlite:///./orion.db").unwrap(),
            PathBuf::from("./orion.db")
        );
        assert_eq!(
            sqlite_path_from_url("sqlite:////var/lib/orion.db").unwrap(),
            PathBuf::from("/var/lib/orion.db")
        );
        assert_eq!(
            sqlite_path_from_url("data/orion.db").unwrap(),
            PathBuf::from("data/orion.db")
        );
        assert!(sqlite_path_from_url("sqlite://").is_err());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some("short".into());
        config.runs.workers = 0;
        config.runs.run_timeout_secs = 0;
        let problems = config.validate();
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(problems.iter().any(|p| p.contains("at least 32")));
        assert!(problems.iter().any(|p| p.contains("runs.workers")));
        assert!(problems.iter().any(|p| p.contains("run_timeout_secs")));
    }

    #[test]
    fn test_validate_clean_config() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some(SECRET.into());
        assert!(config.validate().is_empty());

        config.auth.jwt_secret = None;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_validate_flags_sweep_shorter_than_timeout() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some(SECRET.into());
        config.runs.stale_after_secs = 60;
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("stale_after_secs"));
    }

    #[test]
    fn test_huge_durations_are_problems_not_panics() {
        let mut config = OrionConfig::default();
        config
            .apply_env(env(&[
                ("JWT_SECRET", SECRET),
                ("ACCESS_TOKEN_EXPIRE_MINUTES", &u64::MAX.to_string()),
            ]))
            .unwrap();
        config.runs.stale_after_secs = 10_000_000_000_000;

        let problems = config.validate();
        assert_eq!(problems.len(), 2, "{:?}", problems);
        assert!(problems.iter().any(|p| p.contains("token_ttl_minutes")));
        assert!(problems.iter().any(|p| p.contains("stale_after_secs")));

        let server = config.to_server_config(true);
        assert_eq!(
            server.token_ttl,
            Duration::from_secs(MAX_TOKEN_TTL_MINUTES * 60)
        );
        assert_eq!(
            server.runner.stale_after,
            Duration::from_secs(MAX_DURATION_SECS)
        );
    }

    #[test]
    fn test_server_config_conversion() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some(SECRET.into());
        config.auth.token_ttl_minutes = 30;
        config.runs.workers = 2;

        let server = config.to_server_config(false);
        assert_eq!(server.port, 8000);
        assert_eq!(server.token_ttl, Duration::from_secs(30 * 60));
        assert_eq!(server.runner.workers, 2);
        assert_eq!(server.runner.run_timeout, Duration::from_secs(300));
        assert_eq!(server.cors_origins, config.server.cors_origins);
        assert_eq!(server.jwt_secret.as_deref(), Some(SECRET));
        assert!(!server.dev_mode);
    }

    #[test]
    fn test_dev_mode_drops_short_secret_and_opens_cors() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some("short".into());
        let server = config.to_server_config(true);
        assert!(server.dev_mode);
        assert!(server.jwt_secret.is_none());
        assert_eq!(server.cors_origins, vec!["*"]);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = OrionConfig::default();
        config.auth.jwt_secret = Some(SECRET.into());
        config.integrations.whatsapp_access_token = Some("wa-token-value".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains(SECRET));
        assert!(!debug.contains("wa-token-value"));
        assert!(debug.contains("<redacted>"));
    }
}
