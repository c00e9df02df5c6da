//! Domain and orchestration error taxonomy.
//!
//! `DomainError` covers repository/persistence-layer failures. `OrchestratorError`
//! sits one layer up and maps 1:1 onto the abstract error kinds the application
//! layer must surface (spec §7); the HTTP gateway derives its status code
//! straight from the variant instead of re-deriving policy at the edge.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors raised by repositories and domain model operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("concurrency conflict: {entity} {id} was modified by another writer")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("tenant isolation violation: entity {entity} does not belong to org {org_id}")]
    TenantMismatch { entity: String, org_id: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Application-layer error taxonomy (spec §7). Each variant carries exactly
/// the context the HTTP gateway needs to render its status code and body
/// without re-deriving anything.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("state conflict: cannot apply action from state {current_state}")]
    StateConflict { current_state: String },

    #[error("plan rejected by validator: {0:?}")]
    ValidatorRejected(Vec<String>),

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("tool invocation failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("planner did not converge after {steps} steps")]
    PlannerDidNotConverge { steps: u32 },

    #[error("planner token budget exceeded: used {used}, budget {budget}")]
    TokenBudgetExceeded { used: u64, budget: u64 },

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("asset failed during execution: {asset_id}: {message}")]
    ExecutorAssetFailed { asset_id: String, message: String },

    #[error("execution aborted: {0}")]
    ExecutionAborted(String),

    #[error("self-approval forbidden: user {0} already holds one approval slot")]
    SelfApprovalForbidden(String),

    #[error("durability lost for workflow {0}: {1}")]
    DurabilityLost(String, String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<DomainError> for OrchestratorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::TaskNotFound(id) => OrchestratorError::NotFound(format!("task {id}")),
            DomainError::PlanNotFound(id) => OrchestratorError::NotFound(format!("plan {id}")),
            DomainError::ExecutionNotFound(id) => {
                OrchestratorError::NotFound(format!("execution {id}"))
            }
            DomainError::InvalidStateTransition { from, to } => OrchestratorError::StateConflict {
                current_state: format!("{from} (attempted -> {to})"),
            },
            DomainError::ConcurrencyConflict { entity, id } => OrchestratorError::StateConflict {
                current_state: format!("{entity} {id} changed concurrently"),
            },
            DomainError::ValidationFailed(msg) => OrchestratorError::InputInvalid(msg),
            DomainError::TenantMismatch { entity, org_id } => {
                OrchestratorError::NotFound(format!("{entity} not visible to org {org_id}"))
            }
            DomainError::DatabaseError(msg) | DomainError::SerializationError(msg) => {
                OrchestratorError::Internal(msg)
            }
        }
    }
}

impl OrchestratorError {
    /// HTTP status code this error maps onto, per spec §6/§7.
    pub fn status_code(&self) -> u16 {
        match self {
            OrchestratorError::InputInvalid(_) => 400,
            OrchestratorError::NotFound(_) => 404,
            OrchestratorError::StateConflict { .. }
            | OrchestratorError::SelfApprovalForbidden(_) => 409,
            OrchestratorError::ValidatorRejected(_) => 422,
            _ => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::InputInvalid(_) => "InputInvalid",
            OrchestratorError::NotFound(_) => "NotFound",
            OrchestratorError::StateConflict { .. } => "StateConflict",
            OrchestratorError::ValidatorRejected(_) => "ValidatorRejected",
            OrchestratorError::LlmUnavailable(_) => "LLMUnavailable",
            OrchestratorError::ToolFailed { .. } => "ToolFailed",
            OrchestratorError::PlannerDidNotConverge { .. } => "PlannerDidNotConverge",
            OrchestratorError::TokenBudgetExceeded { .. } => "TokenBudgetExceeded",
            OrchestratorError::PolicyDenied(_) => "PolicyDenied",
            OrchestratorError::ExecutorAssetFailed { .. } => "ExecutorAssetFailed",
            OrchestratorError::ExecutionAborted(_) => "ExecutionAborted",
            OrchestratorError::SelfApprovalForbidden(_) => "SelfApprovalForbidden",
            OrchestratorError::DurabilityLost(..) => "DurabilityLost",
            OrchestratorError::Internal(_) => "Internal",
        }
    }
}
