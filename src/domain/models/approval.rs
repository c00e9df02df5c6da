//! Approval domain model: the durable audit trail the Approval State
//! Machine (C6) produces for every action taken against a plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The action a user took against a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Modify,
    Cancel,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Modify => "modify",
            Self::Cancel => "cancel",
        }
    }
}

/// One durable record of an approval-related action taken against a plan.
/// Never mutated after creation; this is the append-only ledger that
/// satisfies spec §8's audit-completeness property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub org_id: String,
    pub plan_id: Uuid,
    pub task_id: Uuid,
    pub user_id: String,
    pub action: ApprovalAction,
    pub reason: Option<String>,
    pub prior_state: String,
    pub resulting_state: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: impl Into<String>,
        plan_id: Uuid,
        task_id: Uuid,
        user_id: impl Into<String>,
        action: ApprovalAction,
        prior_state: impl Into<String>,
        resulting_state: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            plan_id,
            task_id,
            user_id: user_id.into(),
            action,
            reason: None,
            prior_state: prior_state.into(),
            resulting_state: resulting_state.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_record_captures_state_transition() {
        let rec = ApprovalRecord::new(
            "org-1",
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            ApprovalAction::Approve,
            "awaiting_approval",
            "approved",
        );
        assert_eq!(rec.action.as_str(), "approve");
        assert_eq!(rec.prior_state, "awaiting_approval");
        assert_eq!(rec.resulting_state, "approved");
        assert!(rec.reason.is_none());
    }
}
