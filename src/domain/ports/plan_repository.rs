//! Plan repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Plan;

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: &Plan) -> DomainResult<()>;

    async fn get(&self, org_id: &str, id: Uuid) -> DomainResult<Option<Plan>>;

    async fn get_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<Plan>>;

    /// Most recent plan for a task (the one the task's `state` mirrors),
    /// including any that superseded a rejected predecessor.
    async fn get_latest_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Option<Plan>>;

    /// Update an existing plan, enforcing optimistic locking on `version`.
    async fn update(&self, plan: &Plan) -> DomainResult<()>;
}
