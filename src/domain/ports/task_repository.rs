//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskState};

/// Filter criteria for listing tasks. Every query is implicitly scoped to a
/// single `org_id` at the call site (spec §8 property 1: tenant isolation),
/// not carried as a filter field, so that it can never accidentally be left
/// unset by a caller.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub created_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Repository interface for Task persistence, scoped per-tenant.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, org_id: &str, id: Uuid) -> DomainResult<Option<Task>>;

    /// Update an existing task, enforcing optimistic-locking: the write
    /// fails with `DomainError::ConcurrencyConflict` if `task.version` does
    /// not match the currently stored version.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    async fn list(&self, org_id: &str, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    async fn get_by_idempotency_key(&self, org_id: &str, key: &str) -> DomainResult<Option<Task>>;

    async fn count_by_state(&self, org_id: &str) -> DomainResult<std::collections::HashMap<TaskState, u64>>;
}
