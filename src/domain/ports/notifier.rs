//! Notifier port (ambient): tells a human an approval is waiting, or that
//! an execution finished, without this crate owning any particular channel
//! (email, Slack, webhook — all external collaborators per spec §1).

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum NotificationEvent {
    PlanAwaitingApproval { plan_id: Uuid },
    PlanApproved { plan_id: Uuid },
    PlanRejected { plan_id: Uuid },
    ExecutionCompleted { execution_id: Uuid },
    ExecutionFailed { execution_id: Uuid },
    ExecutionRolledBack { execution_id: Uuid },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, org_id: &str, event: NotificationEvent);
}
