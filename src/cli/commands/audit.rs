//! Audit trail CLI command.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::application::audit::AuditEntry;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;

pub async fn handle(ctx: &CliContext, task_id: Uuid) -> Result<()> {
    let entries = ctx.orchestrator.audit_trail(&ctx.org_id, task_id).await?;
    output(&AuditOutput { task_id, entries }, ctx.json);
    Ok(())
}

struct AuditOutput {
    task_id: Uuid,
    entries: Vec<AuditEntry>,
}

impl Serialize for AuditOutput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl CommandOutput for AuditOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return format!("No audit entries for task {}.", self.task_id);
        }
        let mut lines = vec![format!("Audit trail for task {}:", self.task_id)];
        for entry in &self.entries {
            lines.push(match entry {
                AuditEntry::ToolInvocation(inv) => format!(
                    "  [{}] tool_invocation  {} -> {}  ({}ms, success={})",
                    inv.invoked_at.to_rfc3339(),
                    inv.agent_name,
                    inv.tool_name,
                    inv.duration_ms,
                    inv.success
                ),
                AuditEntry::Approval(record) => format!(
                    "  [{}] approval  {} by {}  {} -> {}",
                    record.timestamp.to_rfc3339(),
                    record.action.as_str(),
                    record.user_id,
                    record.prior_state,
                    record.resulting_state
                ),
            });
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "task_id": self.task_id, "entries": self.entries.iter().map(entry_json).collect::<Vec<_>>() })
    }
}

fn entry_json(entry: &AuditEntry) -> serde_json::Value {
    match entry {
        AuditEntry::ToolInvocation(inv) => json!({ "kind": "tool_invocation", "record": inv }),
        AuditEntry::Approval(record) => json!({ "kind": "approval", "record": record }),
    }
}
