//! Run orchestrator: creates runs, drives them through
//! `pending -> running -> done | failed`, and serves the read side.
//!
//! Execution happens on a small in-process worker pool fed by an unbounded
//! channel, so request handlers only ever enqueue. Each job is bounded by
//! `RunnerConfig::run_timeout`; whatever happens inside a job, the run is
//! left terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use super::agents::AgentEngine;
use super::db::{DbHandle, format_timestamp};
use super::models::*;
use crate::errors::StudioError;

/// Tuning knobs for background execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workers: usize,
    pub run_timeout: Duration,
    pub stale_after: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            run_timeout: Duration::from_secs(300),
            stale_after: Duration::from_secs(900),
        }
    }
}

/// What `recover` did at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub abandoned: usize,
    pub requeued: usize,
}

struct RunJob {
    run_id: i64,
    briefing_id: i64,
}

/// Sending half of the run queue.
#[derive(Clone)]
pub struct RunQueue {
    tx: mpsc::UnboundedSender<RunJob>,
}

impl RunQueue {
    /// Spawn `workers` tasks draining a shared receiver. Must be called from
    /// inside a tokio runtime.
    fn start(workers: usize, run_timeout: Duration, executor: RunExecutor) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<RunJob>();
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let executor = executor.clone();
            tokio::spawn(async move {
                worker_task(worker_id, rx, executor, run_timeout).await;
            });
        }
        info!(workers, "Run queue started");

        Self { tx }
    }

    pub fn enqueue(&self, run_id: i64, briefing_id: i64) -> Result<(), StudioError> {
        self.tx
            .send(RunJob {
                run_id,
                briefing_id,
            })
            .map_err(|_| StudioError::Internal("Run queue is closed".into()))
    }
}

async fn worker_task(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<RunJob>>>,
    executor: RunExecutor,
    run_timeout: Duration,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(job) => job,
                None => {
                    debug!(worker_id, "Run worker shutting down (queue closed)");
                    return;
                }
            }
        };

        debug!(worker_id, run_id = job.run_id, "Worker picked up run");
        let run_id = job.run_id;
        if tokio::time::timeout(run_timeout, executor.execute(run_id, job.briefing_id))
            .await
            .is_err()
        {
            warn!(run_id, timeout_secs = run_timeout.as_secs_f64(), "Run timed out");
            executor
                .fail(
                    run_id,
                    &format!("Run timed out after {}s", run_timeout.as_secs_f64()),
                )
                .await;
        }
    }
}

/// The part of the orchestrator that worker tasks hold on to.
#[derive(Clone)]
struct RunExecutor {
    db: DbHandle,
    engine: Arc<AgentEngine>,
}

impl RunExecutor {
    async fn execute(&self, run_id: i64, briefing_id: i64) {
        match self.db.call(move |db| db.claim_run(run_id)).await {
            Ok(ClaimOutcome::Claimed(_)) => {}
            Ok(ClaimOutcome::Missing) => {
                warn!(run_id, "Run disappeared before execution");
                return;
            }
            Ok(ClaimOutcome::NotPending(status)) => {
                info!(run_id, %status, "Run already claimed, skipping");
                return;
            }
            Err(e) => {
                error!(run_id, error = %e, "Failed to claim run");
                return;
            }
        }
        info!(run_id, status = "running", "Run started");

        match self.generate(run_id, briefing_id).await {
            Ok(roadmap) => info!(run_id, roadmap_id = roadmap.id, status = "done", "Run finished"),
            Err(e) => self.fail(run_id, &format!("Generation failed: {}", e)).await,
        }
    }

    async fn generate(&self, run_id: i64, briefing_id: i64) -> anyhow::Result<Roadmap> {
        self.log(
            run_id,
            CORE_AGENT,
            LogLevel::Info,
            format!("Starting roadmap generation (run_id={})", run_id),
            None,
        )
        .await?;

        let briefing = self
            .db
            .call(move |db| db.get_briefing(briefing_id))
            .await?
            .context("Briefing not found")?;

        let agent = self.engine.select_agent(&briefing.content);
        self.log(
            run_id,
            agent.log_name(),
            LogLevel::Info,
            "Generating roadmap from briefing".into(),
            None,
        )
        .await?;

        let agent_name = agent.name();
        let result = tokio::task::spawn_blocking(move || agent.run(&briefing.content))
            .await
            .context("Agent task panicked")?;

        let roadmap = self
            .db
            .call(move |db| db.complete_run(run_id, briefing_id, &result.content))
            .await?;

        let payload = serde_json::json!({ "roadmap_id": roadmap.id, "agent": agent_name });
        self.log(
            run_id,
            CORE_AGENT,
            LogLevel::Info,
            "Roadmap generation completed".into(),
            Some(payload.to_string()),
        )
        .await?;
        Ok(roadmap)
    }

    async fn log(
        &self,
        run_id: i64,
        agent_name: &'static str,
        level: LogLevel,
        message: String,
        payload: Option<String>,
    ) -> anyhow::Result<()> {
        self.db
            .call(move |db| {
                db.append_log(run_id, agent_name, level, &message, payload.as_deref())
                    .map(|_| ())
            })
            .await
    }

    /// Best-effort transition to `failed`; never propagates.
    async fn fail(&self, run_id: i64, message: &str) {
        let msg = message.to_string();
        match self
            .db
            .call(move |db| db.fail_run_with_log(run_id, CORE_AGENT, &msg))
            .await
        {
            Ok(true) => error!(run_id, status = "failed", reason = message, "Run failed"),
            Ok(false) => warn!(run_id, reason = message, "Run was no longer running; failure not recorded"),
            Err(e) => error!(run_id, error = %e, reason = message, "Could not mark run failed"),
        }
    }
}

/// Fail every `running` run whose last status change is older than
/// `stale_after`. Returns how many were failed.
pub async fn sweep_stale_runs(db: &DbHandle, stale_after: Duration) -> Result<usize, StudioError> {
    let cutoff = chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
        .map(format_timestamp)
        .ok_or_else(|| {
            StudioError::BadRequest(format!(
                "Stale age of {}s is out of range",
                stale_after.as_secs()
            ))
        })?;
    let message = format!(
        "Run exceeded {}s without finishing",
        stale_after.as_secs()
    );

    let failed = db
        .call(move |db| {
            let mut failed = Vec::new();
            for run in db.stale_running_runs(&cutoff)? {
                if db.fail_run_with_log(run.id, CORE_AGENT, &message)? {
                    failed.push(run.id);
                }
            }
            Ok(failed)
        })
        .await
        .map_err(StudioError::from_db)?;

    for run_id in &failed {
        warn!(run_id, status = "failed", "Stale run failed by sweep");
    }
    Ok(failed.len())
}

/// Entry point for everything the API does with runs.
#[derive(Clone)]
pub struct RunOrchestrator {
    executor: RunExecutor,
    queue: RunQueue,
    config: RunnerConfig,
}

impl RunOrchestrator {
    /// Build the orchestrator and start its worker pool. Must be called from
    /// inside a tokio runtime.
    pub fn new(db: DbHandle, engine: Arc<AgentEngine>, config: RunnerConfig) -> Self {
        let executor = RunExecutor { db, engine };
        let queue = RunQueue::start(config.workers, config.run_timeout, executor.clone());
        Self {
            executor,
            queue,
            config,
        }
    }

    pub fn engine(&self) -> &AgentEngine {
        &self.executor.engine
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn db(&self) -> &DbHandle {
        &self.executor.db
    }

    /// Validate ownership and linkage, persist a `pending` run, and enqueue
    /// it when its type has an executor.
    pub async fn create_run(
        &self,
        user_id: i64,
        project_id: i64,
        run_type: &str,
        briefing_id: i64,
    ) -> Result<RunCreated, StudioError> {
        let run_type = run_type.to_string();
        let run = self
            .db()
            .call(move |db| {
                db.get_project_for_user(project_id, user_id)?
                    .ok_or_else(|| StudioError::NotFound("Project not found".into()))?;
                let briefing = db
                    .get_briefing(briefing_id)?
                    .ok_or_else(|| StudioError::NotFound("Briefing not found".into()))?;
                if briefing.project_id != Some(project_id) {
                    return Err(StudioError::BadRequest(
                        "Briefing is not linked to this project (project_id mismatch)".into(),
                    )
                    .into());
                }

                let run = db.create_run(project_id, &run_type, briefing_id)?;
                db.append_log(
                    run.id,
                    CORE_AGENT,
                    LogLevel::Info,
                    &format!("Run created: type={}", run.run_type),
                    None,
                )?;
                Ok(run)
            })
            .await
            .map_err(StudioError::from_db)?;

        info!(run_id = run.id, project_id, run_type = %run.run_type, "Run created");

        if run.run_type != ROADMAP_GENERATE {
            return Ok(RunCreated {
                run_id: run.id,
                status: RunAcceptance::Created,
            });
        }

        self.queue.enqueue(run.id, briefing_id)?;
        Ok(RunCreated {
            run_id: run.id,
            status: RunAcceptance::Queued,
        })
    }

    /// Execute a run inline. Worker tasks call the same code path; a run that
    /// is not `pending` is left untouched.
    pub async fn execute(&self, run_id: i64, briefing_id: i64) {
        self.executor.execute(run_id, briefing_id).await
    }

    pub async fn get_run(&self, user_id: i64, run_id: i64) -> Result<Run, StudioError> {
        self.db()
            .call(move |db| db.get_run_for_user(run_id, user_id))
            .await
            .map_err(StudioError::from_db)?
            .ok_or_else(|| StudioError::NotFound("Run not found".into()))
    }

    pub async fn get_run_logs(
        &self,
        user_id: i64,
        run_id: i64,
    ) -> Result<Vec<AgentLog>, StudioError> {
        self.db()
            .call(move |db| {
                db.get_run_for_user(run_id, user_id)?
                    .ok_or_else(|| StudioError::NotFound("Run not found".into()))?;
                db.list_logs(run_id)
            })
            .await
            .map_err(StudioError::from_db)
    }

    /// Latest roadmap produced by the run, if any.
    pub async fn get_run_roadmap(
        &self,
        user_id: i64,
        run_id: i64,
    ) -> Result<Option<Roadmap>, StudioError> {
        self.db()
            .call(move |db| {
                db.get_run_for_user(run_id, user_id)?
                    .ok_or_else(|| StudioError::NotFound("Run not found".into()))?;
                db.latest_roadmap_for_run(run_id)
            })
            .await
            .map_err(StudioError::from_db)
    }

    pub async fn list_project_runs(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Vec<Run>, StudioError> {
        self.db()
            .call(move |db| {
                db.get_project_for_user(project_id, user_id)?
                    .ok_or_else(|| StudioError::NotFound("Project not found".into()))?;
                db.list_runs_for_project(project_id)
            })
            .await
            .map_err(StudioError::from_db)
    }

    /// Generate and store a roadmap without creating a run.
    pub async fn generate_roadmap_sync(
        &self,
        user_id: i64,
        briefing_id: i64,
    ) -> Result<Roadmap, StudioError> {
        let briefing = self
            .db()
            .call(move |db| {
                let briefing = db
                    .get_briefing(briefing_id)?
                    .ok_or_else(|| StudioError::NotFound("Briefing not found".into()))?;
                if !db.user_owns_briefing(&briefing, user_id)? {
                    return Err(StudioError::Forbidden("Forbidden".into()).into());
                }
                Ok(briefing)
            })
            .await
            .map_err(StudioError::from_db)?;

        let engine = Arc::clone(&self.executor.engine);
        let result = tokio::task::spawn_blocking(move || engine.run(&briefing.content))
            .await
            .map_err(|e| StudioError::Internal(format!("Agent task panicked: {}", e)))?;

        let roadmap = self
            .db()
            .call(move |db| db.create_roadmap(briefing_id, None, &result.content))
            .await
            .map_err(StudioError::from_db)?;
        info!(briefing_id, roadmap_id = roadmap.id, "Roadmap generated synchronously");
        Ok(roadmap)
    }

    /// Reconcile runs left over from a previous process. Call once, before
    /// the server accepts requests: every `running` run is failed and every
    /// `pending` roadmap run is queued again.
    pub async fn recover(&self) -> Result<RecoveryReport, StudioError> {
        let (abandoned, pending) = self
            .db()
            .call(|db| {
                let mut abandoned = 0;
                for run in db.runs_with_status(RunStatus::Running)? {
                    if db.fail_run_with_log(run.id, CORE_AGENT, "Run abandoned after restart")? {
                        abandoned += 1;
                    }
                }
                let pending = db.pending_runs_of_type(ROADMAP_GENERATE)?;
                Ok((abandoned, pending))
            })
            .await
            .map_err(StudioError::from_db)?;

        let mut report = RecoveryReport {
            abandoned,
            requeued: 0,
        };
        for run in pending {
            match run.briefing_id {
                Some(briefing_id) => {
                    self.queue.enqueue(run.id, briefing_id)?;
                    report.requeued += 1;
                }
                None => warn!(run_id = run.id, "Pending run has no briefing; leaving it"),
            }
        }

        if report != RecoveryReport::default() {
            info!(
                abandoned = report.abandoned,
                requeued = report.requeued,
                "Recovered runs from previous process"
            );
        }
        Ok(report)
    }

    /// Fail runs stuck in `running` for longer than `stale_after`.
    pub async fn sweep_stale(&self, stale_after: Duration) -> Result<usize, StudioError> {
        sweep_stale_runs(self.db(), stale_after).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::agents::{Agent, AgentResult};
    use crate::studio::db::StudioDb;

    struct Fixture {
        db: DbHandle,
        orchestrator: RunOrchestrator,
        user_id: i64,
        project_id: i64,
        briefing_id: i64,
    }

    fn fixture_with(engine: AgentEngine, config: RunnerConfig) -> Fixture {
        let db = DbHandle::new(StudioDb::new_in_memory().unwrap());
        let (user_id, project_id, briefing_id) = {
            let guard = db.lock_sync().unwrap();
            let user = guard.create_user("a@x.com", "h").unwrap().unwrap();
            let project = guard.create_project(user.id, "P1").unwrap();
            let briefing = guard
                .create_briefing(None, Some(project.id), "Grow my SaaS")
                .unwrap();
            (user.id, project.id, briefing.id)
        };
        let orchestrator = RunOrchestrator::new(db.clone(), Arc::new(engine), config);
        Fixture {
            db,
            orchestrator,
            user_id,
            project_id,
            briefing_id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AgentEngine::default(), RunnerConfig::default())
    }

    async fn wait_for_terminal(db: &DbHandle, run_id: i64) -> Run {
        for _ in 0..500 {
            let run = db.call(move |db| db.get_run(run_id)).await.unwrap().unwrap();
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} never reached a terminal state", run_id);
    }

    struct SlowAgent;

    impl Agent for SlowAgent {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn log_name(&self) -> &'static str {
            "SLOW_AGENT"
        }
        fn run(&self, briefing: &str) -> AgentResult {
            std::thread::sleep(Duration::from_millis(300));
            AgentResult {
                content: briefing.to_string(),
                created_at: chrono::Utc::now(),
            }
        }
    }

    #[tokio::test]
    async fn test_roadmap_run_completes_in_background() {
        let f = fixture();
        let created = f
            .orchestrator
            .create_run(f.user_id, f.project_id, ROADMAP_GENERATE, f.briefing_id)
            .await
            .unwrap();
        assert_eq!(created.status, RunAcceptance::Queued);

        let run = wait_for_terminal(&f.db, created.run_id).await;
        assert_eq!(run.status, RunStatus::Done);

        let roadmap = f
            .orchestrator
            .get_run_roadmap(f.user_id, run.id)
            .await
            .unwrap()
            .unwrap();
        assert!(roadmap.content.contains("Grow my SaaS"));
        assert_eq!(roadmap.run_id, Some(run.id));
        assert_eq!(roadmap.briefing_id, f.briefing_id);

        let logs = f.orchestrator.get_run_logs(f.user_id, run.id).await.unwrap();
        let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages[0], "Run created: type=roadmap_generate");
        assert!(messages.contains(&"Generating roadmap from briefing"));
        assert_eq!(*messages.last().unwrap(), "Roadmap generation completed");
        assert!(logs.iter().any(|l| l.agent_name == "GROWTH_AGENT"));
        assert!(logs.iter().all(|l| l.level == LogLevel::Info));
    }

    #[tokio::test]
    async fn test_unknown_run_type_is_recorded_not_executed() {
        let f = fixture();
        let created = f
            .orchestrator
            .create_run(f.user_id, f.project_id, "audit", f.briefing_id)
            .await
            .unwrap();
        assert_eq!(created.status, RunAcceptance::Created);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let run = f.orchestrator.get_run(f.user_id, created.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(
            f.orchestrator
                .get_run_roadmap(f.user_id, run.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_mismatched_briefing_is_rejected_without_a_row() {
        let f = fixture();
        let other_project = {
            let guard = f.db.lock_sync().unwrap();
            guard.create_project(f.user_id, "P2").unwrap().id
        };

        let err = f
            .orchestrator
            .create_run(f.user_id, other_project, ROADMAP_GENERATE, f.briefing_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::BadRequest(_)));

        let runs = f
            .orchestrator
            .list_project_runs(f.user_id, other_project)
            .await
            .unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn test_create_run_checks_ownership_and_briefing() {
        let f = fixture();
        let stranger = {
            let guard = f.db.lock_sync().unwrap();
            guard.create_user("b@x.com", "h").unwrap().unwrap().id
        };

        let err = f
            .orchestrator
            .create_run(stranger, f.project_id, ROADMAP_GENERATE, f.briefing_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::NotFound(ref m) if m == "Project not found"));

        let err = f
            .orchestrator
            .create_run(f.user_id, f.project_id, ROADMAP_GENERATE, 9999)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::NotFound(ref m) if m == "Briefing not found"));
    }

    #[tokio::test]
    async fn test_missing_briefing_fails_run_with_error_log() {
        let f = fixture();
        let run_id = {
            let guard = f.db.lock_sync().unwrap();
            guard
                .create_run(f.project_id, ROADMAP_GENERATE, f.briefing_id)
                .unwrap()
                .id
        };

        f.orchestrator.execute(run_id, 9999).await;

        let run = f.orchestrator.get_run(f.user_id, run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let logs = f.orchestrator.get_run_logs(f.user_id, run_id).await.unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.agent_name, CORE_AGENT);
        assert!(last.message.contains("Briefing not found"));
    }

    #[tokio::test]
    async fn test_second_execution_is_a_no_op() {
        let f = fixture();
        let run_id = {
            let guard = f.db.lock_sync().unwrap();
            guard
                .create_run(f.project_id, ROADMAP_GENERATE, f.briefing_id)
                .unwrap()
                .id
        };

        f.orchestrator.execute(run_id, f.briefing_id).await;
        let logs_after_first = f.orchestrator.get_run_logs(f.user_id, run_id).await.unwrap().len();
        f.orchestrator.execute(run_id, f.briefing_id).await;

        let logs = f.orchestrator.get_run_logs(f.user_id, run_id).await.unwrap();
        assert_eq!(logs.len(), logs_after_first);
        let roadmaps = f
            .db
            .call(move |db| {
                let first = db.latest_roadmap_for_run(run_id)?;
                Ok(first.map(|r| r.id))
            })
            .await
            .unwrap();
        assert!(roadmaps.is_some());
        assert_eq!(
            f.orchestrator.get_run(f.user_id, run_id).await.unwrap().status,
            RunStatus::Done
        );
    }

    #[tokio::test]
    async fn test_timed_out_run_is_failed() {
        let engine = AgentEngine::with_agents(
            vec![("slow", Arc::new(SlowAgent) as Arc<dyn Agent>)],
            "slow",
        )
        .unwrap();
        let config = RunnerConfig {
            workers: 1,
            run_timeout: Duration::from_millis(50),
            ..RunnerConfig::default()
        };
        let f = fixture_with(engine, config);

        let created = f
            .orchestrator
            .create_run(f.user_id, f.project_id, ROADMAP_GENERATE, f.briefing_id)
            .await
            .unwrap();
        let run = wait_for_terminal(&f.db, created.run_id).await;
        assert_eq!(run.status, RunStatus::Failed);

        let logs = f.orchestrator.get_run_logs(f.user_id, run.id).await.unwrap();
        assert!(logs.iter().any(|l| l.level == LogLevel::Error && l.message.contains("timed out")));
        assert!(
            f.orchestrator
                .get_run_roadmap(f.user_id, run.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reads_are_scoped_to_owner() {
        let f = fixture();
        let created = f
            .orchestrator
            .create_run(f.user_id, f.project_id, "audit", f.briefing_id)
            .await
            .unwrap();
        let stranger = {
            let guard = f.db.lock_sync().unwrap();
            guard.create_user("b@x.com", "h").unwrap().unwrap().id
        };

        for err in [
            f.orchestrator.get_run(stranger, created.run_id).await.unwrap_err(),
            f.orchestrator
                .get_run_logs(stranger, created.run_id)
                .await
                .unwrap_err(),
            f.orchestrator
                .get_run_roadmap(stranger, created.run_id)
                .await
                .unwrap_err(),
            f.orchestrator
                .list_project_runs(stranger, f.project_id)
                .await
                .unwrap_err(),
        ] {
            assert!(err.is_not_found(), "unexpected error: {}", err);
        }
    }

    #[tokio::test]
    async fn test_recover_fails_running_and_requeues_pending() {
        let f = fixture();
        let (stuck, pending) = {
            let guard = f.db.lock_sync().unwrap();
            let stuck = guard
                .create_run(f.project_id, ROADMAP_GENERATE, f.briefing_id)
                .unwrap()
                .id;
            guard.claim_run(stuck).unwrap();
            let pending = guard
                .create_run(f.project_id, ROADMAP_GENERATE, f.briefing_id)
                .unwrap()
                .id;
            (stuck, pending)
        };

        let report = f.orchestrator.recover().await.unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                abandoned: 1,
                requeued: 1
            }
        );

        let stuck_run = f.orchestrator.get_run(f.user_id, stuck).await.unwrap();
        assert_eq!(stuck_run.status, RunStatus::Failed);
        let logs = f.orchestrator.get_run_logs(f.user_id, stuck).await.unwrap();
        assert_eq!(logs.last().unwrap().message, "Run abandoned after restart");

        let pending_run = wait_for_terminal(&f.db, pending).await;
        assert_eq!(pending_run.status, RunStatus::Done);
    }

    #[tokio::test]
    async fn test_sweep_fails_only_stale_runs() {
        let f = fixture();
        let run_id = {
            let guard = f.db.lock_sync().unwrap();
            let id = guard
                .create_run(f.project_id, ROADMAP_GENERATE, f.briefing_id)
                .unwrap()
                .id;
            guard.claim_run(id).unwrap();
            id
        };

        let swept = f.orchestrator.sweep_stale(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(swept, 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let swept = f.orchestrator.sweep_stale(Duration::ZERO).await.unwrap();
        assert_eq!(swept, 1);

        let run = f.orchestrator.get_run(f.user_id, run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let logs = f.orchestrator.get_run_logs(f.user_id, run_id).await.unwrap();
        assert!(logs.last().unwrap().message.starts_with("Run exceeded"));
    }

    #[tokio::test]
    async fn test_sweep_rejects_out_of_range_age() {
        let f = fixture();
        let err = sweep_stale_runs(&f.db, Duration::from_secs(10_000_000_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_generate_roadmap_sync_checks_ownership() {
        let f = fixture();
        let stranger = {
            let guard = f.db.lock_sync().unwrap();
            guard.create_user("b@x.com", "h").unwrap().unwrap().id
        };

        let err = f
            .orchestrator
            .generate_roadmap_sync(stranger, f.briefing_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Forbidden(_)));

        let err = f
            .orchestrator
            .generate_roadmap_sync(f.user_id, 9999)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let roadmap = f
            .orchestrator
            .generate_roadmap_sync(f.user_id, f.briefing_id)
            .await
            .unwrap();
        assert!(roadmap.content.contains("Grow my SaaS"));
        assert_eq!(roadmap.run_id, None);
    }
}
