use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical agent name used for orchestration-level log entries.
pub const CORE_AGENT: &str = "ORION_CORE";

/// The only run type that schedules background execution.
pub const ROADMAP_GENERATE: &str = "roadmap_generate";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub id: i64,
    pub client_id: Option<i64>,
    pub project_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub project_id: i64,
    pub run_type: String,
    pub status: RunStatus,
    pub briefing_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Raw row before the status column is parsed.
pub(crate) struct RunRow {
    pub id: i64,
    pub project_id: i64,
    pub run_type: String,
    pub status: String,
    pub briefing_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl RunRow {
    pub fn into_run(self) -> anyhow::Result<Run> {
        let status = RunStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Run {
            id: self.id,
            project_id: self.project_id,
            run_type: self.run_type,
            status,
            briefing_id: self.briefing_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Severity of an agent log entry. Stored upper-case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLog {
    pub id: i64,
    pub run_id: i64,
    pub agent_name: String,
    pub level: LogLevel,
    pub message: String,
    pub payload: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: i64,
    pub briefing_id: i64,
    pub run_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

/// Outcome of the atomic `pending -> running` transition.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(Run),
    Missing,
    NotPending(RunStatus),
}

/// Response body of `POST /projects/{id}/runs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunCreated {
    pub run_id: i64,
    pub status: RunAcceptance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunAcceptance {
    /// Scheduled for background execution.
    Queued,
    /// Recorded only; the run type has no executor.
    Created,
}
