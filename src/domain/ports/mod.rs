//! Domain ports (traits) the application layer depends on and the
//! adapters layer implements.

pub mod approval_repository;
pub mod durability;
pub mod execution_repository;
pub mod llm_provider;
pub mod notifier;
pub mod plan_repository;
pub mod task_repository;
pub mod tool_handler;
pub mod tool_invocation_repository;

pub use approval_repository::ApprovalRepository;
pub use durability::{DurabilityAdapter, DurabilityError, WorkflowHandle, WorkflowStatus};
pub use execution_repository::ExecutionRepository;
pub use llm_provider::{
    ChatMessage, ChatRole, CompletionParameters, CompletionRequest, CompletionResponse,
    HealthStatus, LlmProvider, LlmProviderError, RequestedToolCall, StopReason, TokenUsage,
};
pub use notifier::{NotificationEvent, Notifier};
pub use plan_repository::PlanRepository;
pub use task_repository::{TaskFilter, TaskRepository};
pub use tool_handler::{ToolContext, ToolHandler, ToolHandlerError};
pub use tool_invocation_repository::ToolInvocationRepository;
