//! Request/response bodies for the HTTP gateway. Thin wrappers around the
//! domain models — no independent validation logic lives here, that's the
//! Meta-Engine's and Validation Pipeline's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Execution, Phase, Plan, Task};

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub intent: String,
    pub environment: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task: Task,
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct RejectPlanRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ModifyPlanRequest {
    pub reason: String,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub execution: Execution,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub state: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AuditTrailResponse {
    pub task_id: Uuid,
    pub entries: Vec<serde_json::Value>,
}
