//! Domain models: pure entities and value objects with business logic and
//! validation rules. Framework-agnostic — no infrastructure concerns.

pub mod agent;
pub mod approval;
pub mod config;
pub mod execution;
pub mod plan;
pub mod quality;
pub mod task;
pub mod tool;

pub use agent::AgentDefinition;
pub use approval::{ApprovalAction, ApprovalRecord};
pub use config::{
    Config, DatabaseConfig, DurabilityConfig, DurabilityMode, ExecutorConfig, HttpConfig,
    LlmConfig, LoggingConfig, PolicyConfig, PolicyRule,
};
pub use execution::{AssetState, Execution, ExecutionStatus, PhaseExecutionState, RollbackInfo};
pub use plan::{
    HealthCheckSpec, ModificationRecord, Phase, Plan, PlanApprovalError, PlanState,
    RollbackScope, RollbackStrategy, Selector,
};
pub use quality::{Dimension, EnvironmentTier, QualityScore};
pub use task::{RiskLevel, Task, TaskSource, TaskSpec, TaskState, TargetEnvironment, TaskType};
pub use tool::{SafetyClass, ToolCall, ToolDescriptor, ToolInvocation};
