//! Execution repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Execution, ExecutionStatus};

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, execution: &Execution) -> DomainResult<()>;

    async fn get(&self, org_id: &str, id: Uuid) -> DomainResult<Option<Execution>>;

    async fn get_for_plan(&self, org_id: &str, plan_id: Uuid) -> DomainResult<Option<Execution>>;

    /// Update an existing execution, enforcing optimistic locking on `version`.
    async fn update(&self, execution: &Execution) -> DomainResult<()>;

    /// All non-terminal executions across every tenant, used by the
    /// in-process Durability Adapter (C8) to resume work after a restart.
    async fn list_non_terminal(&self) -> DomainResult<Vec<Execution>>;

    async fn list_by_status(&self, org_id: &str, status: ExecutionStatus) -> DomainResult<Vec<Execution>>;
}
