//! Tool invocation audit repository port (C9).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ToolInvocation;

#[async_trait]
pub trait ToolInvocationRepository: Send + Sync {
    /// Append-only: tool invocations are never updated after creation.
    async fn record(&self, invocation: &ToolInvocation) -> DomainResult<()>;

    async fn list_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<ToolInvocation>>;

    async fn list_for_execution(&self, org_id: &str, execution_id: Uuid) -> DomainResult<Vec<ToolInvocation>>;
}
