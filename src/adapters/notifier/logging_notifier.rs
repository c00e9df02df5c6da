//! Ambient notifier that emits a structured log line per event. This is the
//! default `Notifier` in every deployment — it always runs alongside
//! whatever channel-specific notifier an operator layers on top, so the
//! audit trail has a record of every notification even if the channel
//! adapter itself is down.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{NotificationEvent, Notifier};

#[derive(Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, org_id: &str, event: NotificationEvent) {
        match event {
            NotificationEvent::PlanAwaitingApproval { plan_id } => {
                info!(org_id, %plan_id, "plan awaiting approval");
            }
            NotificationEvent::PlanApproved { plan_id } => {
                info!(org_id, %plan_id, "plan approved");
            }
            NotificationEvent::PlanRejected { plan_id } => {
                info!(org_id, %plan_id, "plan rejected");
            }
            NotificationEvent::ExecutionCompleted { execution_id } => {
                info!(org_id, %execution_id, "execution completed");
            }
            NotificationEvent::ExecutionFailed { execution_id } => {
                info!(org_id, %execution_id, "execution failed");
            }
            NotificationEvent::ExecutionRolledBack { execution_id } => {
                info!(org_id, %execution_id, "execution rolled back");
            }
        }
    }
}
