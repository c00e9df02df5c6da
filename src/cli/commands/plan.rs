//! Plan approval CLI commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::PlanCommands;
use crate::cli::CliContext;
use crate::domain::models::Plan;

pub async fn handle(ctx: &CliContext, cmd: PlanCommands) -> Result<()> {
    match cmd {
        PlanCommands::Show { task_id } => {
            let plan = ctx
                .plans
                .get_latest_for_task(&ctx.org_id, task_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no plan for task {task_id}"))?;
            output(&PlanOutput { plan }, ctx.json);
        }
        PlanCommands::Approve { task_id } => {
            let plan = ctx.orchestrator.approve_plan(&ctx.org_id, task_id, &ctx.user_id).await?;
            output(&PlanOutput { plan }, ctx.json);
        }
        PlanCommands::Reject { task_id, reason } => {
            let plan = ctx.orchestrator.reject_plan(&ctx.org_id, task_id, &ctx.user_id, reason).await?;
            output(&PlanOutput { plan }, ctx.json);
        }
        PlanCommands::Cancel { task_id } => {
            let plan = ctx.orchestrator.cancel_plan(&ctx.org_id, task_id, &ctx.user_id).await?;
            output(&PlanOutput { plan }, ctx.json);
        }
        PlanCommands::Modify { task_id, reason, phases_file } => {
            let raw = std::fs::read_to_string(&phases_file)?;
            let phases = serde_json::from_str(&raw)?;
            let plan = ctx.orchestrator.modify_plan(&ctx.org_id, task_id, &ctx.user_id, reason, phases).await?;
            output(&PlanOutput { plan }, ctx.json);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PlanOutput {
    plan: Plan,
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Plan {} for task {}\n  state: {}  dual_signer_required: {}  approvals: {}",
            self.plan.id,
            self.plan.task_id,
            self.plan.state.as_str(),
            self.plan.requires_dual_signer,
            self.plan.approved_by.join(", ")
        )];
        if let Some(reason) = &self.plan.rejection_reason {
            lines.push(format!("  rejection_reason: {reason}"));
        }
        lines.push(format!("  phases ({}):", self.plan.phases.len()));
        for (i, phase) in self.plan.phases.iter().enumerate() {
            lines.push(format!("    {}. {} -> {}", i + 1, phase.name, phase.tool_name));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "plan": self.plan })
    }
}
