//! Growth Studio: briefings in, agent-generated roadmaps out.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (SPA)   │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘   JSON   │         │                                        │
//!                       │         │ RunOrchestrator::create_run()          │
//!                       │         v                                        │
//!                       │  runner.rs  (RunOrchestrator, RunQueue workers)  │
//!                       │         │                                        │
//!                       │         │ AgentEngine::select_agent().run()      │
//!                       │         v                                        │
//!                       │  agents.rs  (Agent trait, GrowthStrategistAgent) │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                             |
//! |------------|------------------------------------------------------------|
//! | `models`   | Shared types: `Run`, `RunStatus`, `AgentLog`, `Roadmap`    |
//! | `db`       | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)        |
//! | `workflow` | `WorkflowEngine` trait + n8n webhook relay                 |
//! | `whatsapp` | Cloud API webhook handshake, inbound parsing, replies      |
//!
//! ## Typical Request Flow (roadmap generation)
//!
//! 1. `POST /projects/{id}/runs` → `api::create_run()`
//! 2. `RunOrchestrator::create_run` checks the project belongs to the caller
//!    and the briefing belongs to the project, writes a `pending` run plus
//!    its first log line, and pushes a job onto the `RunQueue`.
//! 3. A worker claims the run with a compare-and-set (`pending -> running`),
//!    so a run is never executed twice.
//! 4. The selected agent renders the roadmap; the roadmap insert and the
//!    `running -> done` transition commit together.
//! 5. Any error, or the per-run timeout, marks the run `failed` with an
//!    ERROR log entry. Clients learn the outcome by polling
//!    `GET /runs/{id}`, `/logs` and `/roadmap`.
//!
//! Runs left `running` by a crash are failed on the next startup
//! (`RunOrchestrator::recover`) or by the periodic stale sweep.

pub mod agents;
pub mod api;
pub mod db;
pub mod models;
pub mod runner;
pub mod server;
pub mod whatsapp;
pub mod workflow;
