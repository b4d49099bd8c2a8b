use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, FromRequest, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use super::db::DbHandle;
use super::models::{AgentLog, Briefing, Client, Project, Roadmap, Run, RunCreated};
use super::runner::RunOrchestrator;
use super::whatsapp::{self, MessageSender};
use super::workflow::{WorkflowEngine, WorkflowOutcome};
use crate::auth::{AuthContext, AuthError, AuthUser, TokenService, hash_password, verify_password};
use crate::errors::StudioError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub orchestrator: RunOrchestrator,
    pub tokens: Arc<TokenService>,
    pub workflow: Arc<dyn WorkflowEngine>,
    pub whatsapp: WhatsAppSettings,
}

#[derive(Clone, Default)]
pub struct WhatsAppSettings {
    pub verify_token: Option<String>,
    pub sender: Option<Arc<dyn MessageSender>>,
}

pub type SharedState = Arc<AppState>;

impl FromRef<SharedState> for AuthContext {
    fn from_ref(state: &SharedState) -> Self {
        AuthContext {
            tokens: Arc::clone(&state.tokens),
            db: state.db.clone(),
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateBriefingRequest {
    pub client_id: Option<i64>,
    pub project_id: Option<i64>,
    pub content: String,
}

#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub run_type: String,
    pub briefing_id: i64,
}

#[derive(Deserialize)]
pub struct CreateRoadmapRequest {
    pub briefing_id: i64,
    pub content: String,
}

#[derive(Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<String>,
    pub default: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    /// Body extraction failure; keeps the rejection's own status.
    Rejected(StatusCode, String),
    Internal(String),
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        match err {
            StudioError::Forbidden(msg) => ApiError::Forbidden(msg),
            StudioError::NotFound(msg) => ApiError::NotFound(msg),
            StudioError::BadRequest(msg) => ApiError::BadRequest(msg),
            // Duplicate keys have always been reported as plain 400s.
            StudioError::Conflict(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(format!("{:#}", anyhow::Error::new(other))),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Hashing(_) | AuthError::Config(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Unauthorized("Could not validate credentials".into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Rejected(status, msg) => (status, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        let mut response = (status, Json(serde_json::json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// `Json<T>` whose rejections use the `{"detail": ...}` error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| ApiError::Rejected(rejection.status(), rejection.body_text()))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/clients", get(list_clients).post(create_client))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}/runs",
            get(list_project_runs).post(create_run),
        )
        .route("/briefings", get(list_briefings).post(create_briefing))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/logs", get(get_run_logs))
        .route("/runs/{id}/roadmap", get(get_run_roadmap))
        .route("/roadmaps", post(create_roadmap))
        .route("/agents", get(list_agents))
        .route(
            "/agents/generate-roadmap/{briefing_id}",
            post(generate_roadmap_compat),
        )
        .route("/agents/{name}/execute", post(execute_agent))
        .route(
            "/whatsapp/webhook",
            get(whatsapp_verify).post(whatsapp_receive),
        )
}

// ── Validation ────────────────────────────────────────────────────────

fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

/// Shape check only: `local@domain.tld`, no whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, _)| !host.is_empty())
        && !domain.ends_with('.')
}

/// Trim and lower-case the domain part; the local part keeps its case.
fn normalize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_ascii_lowercase()),
        None => trimmed.to_string(),
    }
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(e.to_string())
}

// ── Handlers: service ─────────────────────────────────────────────────

async fn root() -> Json<Value> {
    Json(serde_json::json!({ "message": "ORION SaaS API active" }))
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "orion-backend",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

// ── Handlers: auth ────────────────────────────────────────────────────

async fn register(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".into()));
    }

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(internal)??;

    let user = state
        .db
        .call(move |db| db.create_user(&email, &hash))
        .await
        .map_err(StudioError::from_db)?
        .ok_or_else(|| StudioError::Conflict("Email already exists".into()))?;

    info!(user_id = user.id, "User registered");
    Ok(Json(serde_json::json!({ "message": "User created" })))
}

async fn login(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let email = normalize_email(&req.email);
    let user = state
        .db
        .call(move |db| db.find_user_by_email(&email))
        .await
        .map_err(StudioError::from_db)?
        .ok_or_else(invalid)?;

    let password = req.password;
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(internal)?
        .unwrap_or_else(|e| {
            warn!(user_id = user.id, error = %e, "Stored password hash is unreadable");
            false
        });
    if !verified {
        return Err(invalid());
    }

    let access_token = state.tokens.issue(user.id).map_err(internal)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
    }))
}

// ── Handlers: clients & projects ──────────────────────────────────────

async fn create_client(
    State(state): State<SharedState>,
    user: AuthUser,
    ApiJson(req): ApiJson<NameRequest>,
) -> Result<Json<Client>, ApiError> {
    let name = require_non_empty("name", &req.name)?.to_string();
    let client = state
        .db
        .call(move |db| db.create_client(user.id, &name))
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(client))
}

async fn list_clients(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<Client>>, ApiError> {
    let clients = state
        .db
        .call(move |db| db.list_clients(user.id))
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(clients))
}

async fn create_project(
    State(state): State<SharedState>,
    user: AuthUser,
    ApiJson(req): ApiJson<NameRequest>,
) -> Result<Json<Project>, ApiError> {
    let name = require_non_empty("name", &req.name)?.to_string();
    let project = state
        .db
        .call(move |db| db.create_project(user.id, &name))
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(project))
}

async fn list_projects(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state
        .db
        .call(move |db| db.list_projects(user.id))
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(projects))
}

// ── Handlers: briefings & roadmaps ────────────────────────────────────

/// `client_id` and `project_id` are each optional, but at least one is
/// required: a briefing with neither would have no owner and could never
/// be read back or used for a run.
async fn create_briefing(
    State(state): State<SharedState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateBriefingRequest>,
) -> Result<Json<Briefing>, ApiError> {
    let content = require_non_empty("content", &req.content)?.to_string();
    if req.client_id.is_none() && req.project_id.is_none() {
        return Err(ApiError::BadRequest(
            "Briefing must reference a project or a client".into(),
        ));
    }

    let (client_id, project_id, user_id) = (req.client_id, req.project_id, user.id);
    let briefing = state
        .db
        .call(move |db| {
            if let Some(client_id) = client_id
                && db.get_client_for_user(client_id, user_id)?.is_none()
            {
                return Err(StudioError::NotFound("Client not found".into()).into());
            }
            if let Some(project_id) = project_id
                && db.get_project_for_user(project_id, user_id)?.is_none()
            {
                return Err(StudioError::NotFound("Project not found".into()).into());
            }
            db.create_briefing(client_id, project_id, &content)
        })
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(briefing))
}

async fn list_briefings(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<Briefing>>, ApiError> {
    let briefings = state
        .db
        .call(move |db| db.list_briefings_for_user(user.id))
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(briefings))
}

async fn create_roadmap(
    State(state): State<SharedState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateRoadmapRequest>,
) -> Result<Json<Roadmap>, ApiError> {
    let content = require_non_empty("content", &req.content)?.to_string();
    let (briefing_id, user_id) = (req.briefing_id, user.id);
    let roadmap = state
        .db
        .call(move |db| {
            let briefing = db
                .get_briefing(briefing_id)?
                .ok_or_else(|| StudioError::NotFound("Briefing not found".into()))?;
            if !db.user_owns_briefing(&briefing, user_id)? {
                return Err(StudioError::Forbidden("Forbidden".into()).into());
            }
            db.create_roadmap(briefing_id, None, &content)
        })
        .await
        .map_err(StudioError::from_db)?;
    Ok(Json(roadmap))
}

// ── Handlers: runs ────────────────────────────────────────────────────

async fn create_run(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    ApiJson(req): ApiJson<CreateRunRequest>,
) -> Result<Json<RunCreated>, ApiError> {
    let run_type = require_non_empty("run_type", &req.run_type)?;
    let created = state
        .orchestrator
        .create_run(user.id, project_id, run_type, req.briefing_id)
        .await?;
    Ok(Json(created))
}

async fn list_project_runs(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Run>>, ApiError> {
    let runs = state
        .orchestrator
        .list_project_runs(user.id, project_id)
        .await?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(run_id): Path<i64>,
) -> Result<Json<Run>, ApiError> {
    Ok(Json(state.orchestrator.get_run(user.id, run_id).await?))
}

async fn get_run_logs(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(run_id): Path<i64>,
) -> Result<Json<Vec<AgentLog>>, ApiError> {
    Ok(Json(state.orchestrator.get_run_logs(user.id, run_id).await?))
}

async fn get_run_roadmap(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(run_id): Path<i64>,
) -> Result<Response, ApiError> {
    let roadmap = state.orchestrator.get_run_roadmap(user.id, run_id).await?;
    Ok(match roadmap {
        Some(roadmap) => Json(roadmap).into_response(),
        None => Json(serde_json::json!({ "message": "No roadmap found for this run" }))
            .into_response(),
    })
}

// ── Handlers: agents ──────────────────────────────────────────────────

async fn list_agents(State(state): State<SharedState>, _user: AuthUser) -> Json<AgentsResponse> {
    let engine = state.orchestrator.engine();
    Json(AgentsResponse {
        agents: engine.names(),
        default: engine.default_key().to_string(),
    })
}

async fn generate_roadmap_compat(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(briefing_id): Path<i64>,
) -> Result<Json<Roadmap>, ApiError> {
    let roadmap = state
        .orchestrator
        .generate_roadmap_sync(user.id, briefing_id)
        .await?;
    Ok(Json(roadmap))
}

/// Relay an arbitrary JSON payload to the external workflow engine.
async fn execute_agent(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<WorkflowOutcome>, ApiError> {
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {}", e)))?
    };
    let outcome = state.workflow.execute(&name, Some(user.id), payload).await;
    Ok(Json(outcome))
}

// ── Handlers: WhatsApp ────────────────────────────────────────────────

async fn whatsapp_verify(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let param = |dotted: &str, plain: &str| {
        params
            .get(dotted)
            .or_else(|| params.get(plain))
            .map(String::as_str)
    };
    match whatsapp::verify_subscription(
        param("hub.mode", "mode"),
        param("hub.verify_token", "token"),
        param("hub.challenge", "challenge"),
        state.whatsapp.verify_token.as_deref(),
    ) {
        Some(challenge) => challenge.into_response(),
        None => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "status": "error", "detail": "Invalid verify token" })),
        )
            .into_response(),
    }
}

/// Always answers 200 so the platform does not redeliver; failures are
/// reported in the body.
async fn whatsapp_receive(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let sender = state.whatsapp.sender.as_deref();
    match whatsapp::handle_inbound(&payload, state.workflow.as_ref(), sender).await {
        Ok(_) => Json(serde_json::json!({ "status": "ok" })),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Could not handle WhatsApp delivery");
            Json(serde_json::json!({ "status": "error", "detail": format!("{:#}", e) }))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
