//! Tool domain model: the registry's (C1) catalog entries and invocation
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Safety classification assigned to a tool at registration time (spec §4.1).
/// Drives which approval policy applies when a plan calls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyClass {
    /// Never mutates state; safe to call during planning without HITL.
    ReadOnly,
    /// Mutates state but is reversible or low blast radius.
    Mutating,
    /// Mutates state with a wide or irreversible blast radius; always
    /// gated by the Approval State Machine before first invocation.
    Destructive,
}

/// A tool the orchestrator can call on an agent's behalf, with its JSON
/// Schema contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub safety_class: SafetyClass,
    pub max_duration_secs: u64,
    pub rate_limit_per_minute: u32,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        safety_class: SafetyClass,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            safety_class,
            max_duration_secs: 300,
            rate_limit_per_minute: 60,
        }
    }

    pub fn with_max_duration_secs(mut self, secs: u64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }
}

/// A tool call an agent requested, before it has been invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Durable audit record of a single tool invocation (C9). Persisted
/// regardless of success so that the full audit trail (spec §4.9) can
/// reconstruct every action taken against the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: Uuid,
    pub org_id: String,
    pub task_id: Uuid,
    pub execution_id: Option<Uuid>,
    pub agent_name: String,
    pub tool_name: String,
    /// Secret-scrubbed before persistence (infrastructure::logging::secret_scrubbing).
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub success: bool,
    pub invoked_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ToolInvocation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: impl Into<String>,
        task_id: Uuid,
        agent_name: impl Into<String>,
        tool_name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            task_id,
            execution_id: None,
            agent_name: agent_name.into(),
            tool_name: tool_name.into(),
            parameters,
            result: None,
            error: None,
            success: false,
            invoked_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn complete_ok(mut self, result: serde_json::Value, duration_ms: u64) -> Self {
        self.result = Some(result);
        self.success = true;
        self.duration_ms = duration_ms;
        self
    }

    pub fn complete_err(mut self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.error = Some(error.into());
        self.success = false;
        self.duration_ms = duration_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_class_orders_readonly_below_destructive() {
        assert!(SafetyClass::ReadOnly < SafetyClass::Mutating);
        assert!(SafetyClass::Mutating < SafetyClass::Destructive);
    }

    #[test]
    fn tool_invocation_records_success() {
        let inv = ToolInvocation::new("org-1", Uuid::new_v4(), "patcher", "ssm_patch", serde_json::json!({}))
            .complete_ok(serde_json::json!({"ok": true}), 120);
        assert!(inv.success);
        assert_eq!(inv.duration_ms, 120);
        assert!(inv.error.is_none());
    }

    #[test]
    fn tool_invocation_records_failure() {
        let inv = ToolInvocation::new("org-1", Uuid::new_v4(), "patcher", "ssm_patch", serde_json::json!({}))
            .complete_err("timeout", 5000);
        assert!(!inv.success);
        assert_eq!(inv.error.as_deref(), Some("timeout"));
    }
}
