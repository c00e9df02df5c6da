//! Approval record audit repository port (C9).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ApprovalRecord;

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Append-only: approval records are never updated after creation.
    async fn record(&self, record: &ApprovalRecord) -> DomainResult<()>;

    async fn list_for_plan(&self, org_id: &str, plan_id: Uuid) -> DomainResult<Vec<ApprovalRecord>>;

    async fn list_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<ApprovalRecord>>;
}
