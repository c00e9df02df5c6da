//! Audit Trail (C9): read-side facade merging the Tool Invocation and
//! Approval repositories into a single, time-ordered record of every action
//! taken against a Task (spec §4.9).
//!
//! Phase transitions are not tracked through a separate append-only table:
//! an `Execution`'s own `phases`/`version`/`updated_at` fields are already
//! durably persisted on every transition by the Executor (C7), and
//! reconstructing "what happened to this execution" from its current row
//! plus the `ToolInvocation`s it produced needs no further ledger. Widening
//! the write surface with a dedicated phase-transition table was judged
//! unnecessary duplication of state the Execution row already owns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ApprovalRecord, ToolInvocation};
use crate::domain::ports::{ApprovalRepository, ToolInvocationRepository};

#[derive(Debug, Clone)]
pub enum AuditEntry {
    ToolInvocation(ToolInvocation),
    Approval(ApprovalRecord),
}

impl AuditEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ToolInvocation(invocation) => invocation.invoked_at,
            Self::Approval(record) => record.timestamp,
        }
    }
}

pub struct AuditTrail {
    tool_invocations: Arc<dyn ToolInvocationRepository>,
    approvals: Arc<dyn ApprovalRepository>,
}

impl AuditTrail {
    pub fn new(tool_invocations: Arc<dyn ToolInvocationRepository>, approvals: Arc<dyn ApprovalRepository>) -> Self {
        Self { tool_invocations, approvals }
    }

    /// Every tool call and approval action taken against a task, in
    /// timestamp order. Each source repository is itself append-only and
    /// returns its own records in write order, so a stable sort by
    /// timestamp preserves total order even when two entries from
    /// different sources land in the same second.
    pub async fn for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<AuditEntry>> {
        let invocations = self.tool_invocations.list_for_task(org_id, task_id).await?;
        let approvals = self.approvals.list_for_task(org_id, task_id).await?;

        let mut entries: Vec<AuditEntry> = invocations
            .into_iter()
            .map(AuditEntry::ToolInvocation)
            .chain(approvals.into_iter().map(AuditEntry::Approval))
            .collect();
        entries.sort_by_key(AuditEntry::timestamp);
        Ok(entries)
    }

    pub async fn for_execution(&self, org_id: &str, execution_id: Uuid) -> DomainResult<Vec<ToolInvocation>> {
        self.tool_invocations.list_for_execution(org_id, execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteApprovalRepository, SqliteToolInvocationRepository};
    use crate::domain::models::ApprovalAction;

    #[tokio::test]
    async fn merges_and_orders_tool_invocations_and_approvals() {
        let pool = create_migrated_test_pool().await.unwrap();
        let tool_invocations = Arc::new(SqliteToolInvocationRepository::new(pool.clone()));
        let approvals = Arc::new(SqliteApprovalRepository::new(pool));
        let trail = AuditTrail::new(tool_invocations.clone(), approvals.clone());

        let task_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();

        let invocation = ToolInvocation::new("org-1", task_id, "patcher", "ssm_patch", serde_json::json!({}))
            .complete_ok(serde_json::json!({"ok": true}), 50);
        tool_invocations.record(&invocation).await.unwrap();

        let record = ApprovalRecord::new("org-1", plan_id, task_id, "approver", ApprovalAction::Approve, "awaiting_approval", "approved");
        approvals.record(&record).await.unwrap();

        let entries = trail.for_task("org-1", task_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[tokio::test]
    async fn for_execution_scopes_to_tool_invocations_only() {
        let pool = create_migrated_test_pool().await.unwrap();
        let tool_invocations = Arc::new(SqliteToolInvocationRepository::new(pool.clone()));
        let approvals = Arc::new(SqliteApprovalRepository::new(pool));
        let trail = AuditTrail::new(tool_invocations.clone(), approvals);

        let task_id = Uuid::new_v4();
        let execution_id = Uuid::new_v4();
        let invocation = ToolInvocation::new("org-1", task_id, "patcher", "ssm_patch", serde_json::json!({}))
            .with_execution_id(execution_id)
            .complete_ok(serde_json::json!({}), 10);
        tool_invocations.record(&invocation).await.unwrap();

        let scoped = trail.for_execution("org-1", execution_id).await.unwrap();
        assert_eq!(scoped.len(), 1);
    }
}
