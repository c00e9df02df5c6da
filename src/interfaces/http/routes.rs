//! Route table and handlers for the HTTP gateway.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::application::tool_registry::ToolListFilter;
use crate::domain::errors::OrchestratorError;
use crate::domain::models::{TargetEnvironment, TaskState};
use crate::domain::ports::TaskFilter;

use super::dto::{
    AuditTrailResponse, ErrorResponse, ExecutionResponse, ModifyPlanRequest, RejectPlanRequest, SubmitTaskRequest, SubmitTaskResponse,
    TaskListQuery,
};
use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/tasks", post(submit_task).get(list_tasks))
        .route("/v1/tasks/:task_id", get(show_task))
        .route("/v1/tasks/:task_id/plan", get(show_plan))
        .route("/v1/tasks/:task_id/plan/approve", post(approve_plan))
        .route("/v1/tasks/:task_id/plan/reject", post(reject_plan))
        .route("/v1/tasks/:task_id/plan/cancel", post(cancel_plan))
        .route("/v1/tasks/:task_id/plan/modify", post(modify_plan))
        .route("/v1/tasks/:task_id/execution", get(show_execution).post(start_execution))
        .route("/v1/tasks/:task_id/audit", get(audit_trail))
        .route("/v1/executions/:execution_id/pause", post(pause_execution))
        .route("/v1/executions/:execution_id/resume", post(resume_execution))
        .route("/v1/executions/:execution_id/cancel", post(cancel_execution))
        .route("/v1/agents", get(list_agents))
        .route("/v1/tools", get(list_tools))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn org_id(headers: &HeaderMap) -> String {
    headers.get("x-org-id").and_then(|v| v.to_str().ok()).unwrap_or("default").to_string()
}

fn user_id(headers: &HeaderMap) -> String {
    headers.get("x-user-id").and_then(|v| v.to_str().ok()).unwrap_or("operator").to_string()
}

fn error_response(err: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse { code: err.code().to_string(), message: err.to_string() }))
}

async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitTaskRequest>,
) -> impl IntoResponse {
    let environment_hint = req.environment.as_deref().and_then(TargetEnvironment::from_str);
    match state
        .orchestrator
        .submit_task(&org_id(&headers), &user_id(&headers), &req.intent, environment_hint, req.context)
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(SubmitTaskResponse { task: outcome.task, plan: outcome.plan })).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn list_tasks(State(state): State<AppState>, headers: HeaderMap, Query(query): Query<TaskListQuery>) -> impl IntoResponse {
    let task_state = match query.state.as_deref().map(parse_task_state).transpose() {
        Ok(s) => s,
        Err(err) => return error_response(err).into_response(),
    };
    let filter = TaskFilter { state: task_state, limit: query.limit, ..Default::default() };
    match state.tasks.list(&org_id(&headers), filter).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(err) => error_response(OrchestratorError::from(err)).into_response(),
    }
}

async fn show_task(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.tasks.get(&org_id(&headers), task_id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => error_response(OrchestratorError::NotFound(format!("task {task_id}"))).into_response(),
        Err(err) => error_response(OrchestratorError::from(err)).into_response(),
    }
}

async fn show_plan(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.plans.get_latest_for_task(&org_id(&headers), task_id).await {
        Ok(Some(plan)) => Json(plan).into_response(),
        Ok(None) => error_response(OrchestratorError::NotFound(format!("plan for task {task_id}"))).into_response(),
        Err(err) => error_response(OrchestratorError::from(err)).into_response(),
    }
}

async fn approve_plan(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.approve_plan(&org_id(&headers), task_id, &user_id(&headers)).await {
        Ok(plan) => Json(plan).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn reject_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(req): Json<RejectPlanRequest>,
) -> impl IntoResponse {
    match state.orchestrator.reject_plan(&org_id(&headers), task_id, &user_id(&headers), req.reason).await {
        Ok(plan) => Json(plan).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn modify_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ModifyPlanRequest>,
) -> impl IntoResponse {
    match state.orchestrator.modify_plan(&org_id(&headers), task_id, &user_id(&headers), req.reason, req.phases).await {
        Ok(plan) => Json(plan).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn cancel_plan(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.cancel_plan(&org_id(&headers), task_id, &user_id(&headers)).await {
        Ok(plan) => Json(plan).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn start_execution(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.start_execution(&org_id(&headers), task_id).await {
        Ok(execution) => Json(ExecutionResponse { execution }).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn show_execution(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    let org = org_id(&headers);
    let plan = match state.plans.get_latest_for_task(&org, task_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => return error_response(OrchestratorError::NotFound(format!("plan for task {task_id}"))).into_response(),
        Err(err) => return error_response(OrchestratorError::from(err)).into_response(),
    };
    match state.executions.get_for_plan(&org, plan.id).await {
        Ok(Some(execution)) => Json(ExecutionResponse { execution }).into_response(),
        Ok(None) => error_response(OrchestratorError::NotFound(format!("execution for task {task_id}"))).into_response(),
        Err(err) => error_response(OrchestratorError::from(err)).into_response(),
    }
}

async fn pause_execution(State(state): State<AppState>, headers: HeaderMap, Path(execution_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.pause_execution(&org_id(&headers), execution_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn resume_execution(State(state): State<AppState>, headers: HeaderMap, Path(execution_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.resume_execution(&org_id(&headers), execution_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn cancel_execution(State(state): State<AppState>, headers: HeaderMap, Path(execution_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.cancel_execution(&org_id(&headers), execution_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn audit_trail(State(state): State<AppState>, headers: HeaderMap, Path(task_id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.audit_trail(&org_id(&headers), task_id).await {
        Ok(entries) => {
            let entries = entries
                .into_iter()
                .map(|entry| match entry {
                    crate::application::audit::AuditEntry::ToolInvocation(inv) => serde_json::json!({ "kind": "tool_invocation", "record": inv }),
                    crate::application::audit::AuditEntry::Approval(record) => serde_json::json!({ "kind": "approval", "record": record }),
                })
                .collect();
            Json(AuditTrailResponse { task_id, entries }).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agents.list()).into_response()
}

async fn list_tools(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    let safety_class = match query.get("safety_class").map(|s| parse_safety_class(s)).transpose() {
        Ok(s) => s,
        Err(err) => return error_response(err).into_response(),
    };
    Json(state.tools.list(ToolListFilter { safety_class, names: None })).into_response()
}

fn parse_task_state(s: &str) -> Result<TaskState, OrchestratorError> {
    match s {
        "draft" => Ok(TaskState::Draft),
        "awaiting_approval" => Ok(TaskState::AwaitingApproval),
        "awaiting_second_approval" => Ok(TaskState::AwaitingSecondApproval),
        "approved" => Ok(TaskState::Approved),
        "running" => Ok(TaskState::Running),
        "completed" => Ok(TaskState::Completed),
        "failed" => Ok(TaskState::Failed),
        "cancelled" => Ok(TaskState::Cancelled),
        "rejected" => Ok(TaskState::Rejected),
        other => Err(OrchestratorError::InputInvalid(format!("unknown task state: {other}"))),
    }
}

fn parse_safety_class(s: &str) -> Result<crate::domain::models::SafetyClass, OrchestratorError> {
    use crate::domain::models::SafetyClass;
    match s {
        "read_only" => Ok(SafetyClass::ReadOnly),
        "mutating" => Ok(SafetyClass::Mutating),
        "destructive" => Ok(SafetyClass::Destructive),
        other => Err(OrchestratorError::InputInvalid(format!("unknown safety class: {other}"))),
    }
}
