//! Execution lifecycle CLI commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ExecutionCommands;
use crate::cli::CliContext;
use crate::domain::models::Execution;

pub async fn handle(ctx: &CliContext, cmd: ExecutionCommands) -> Result<()> {
    match cmd {
        ExecutionCommands::Start { task_id } => {
            let execution = ctx.orchestrator.start_execution(&ctx.org_id, task_id).await?;
            output(&ExecutionOutput { execution }, ctx.json);
        }
        ExecutionCommands::Show { task_id } => {
            let plan = ctx
                .plans
                .get_latest_for_task(&ctx.org_id, task_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no plan for task {task_id}"))?;
            let execution = ctx
                .executions
                .get_for_plan(&ctx.org_id, plan.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no execution for task {task_id}"))?;
            output(&ExecutionOutput { execution }, ctx.json);
        }
        ExecutionCommands::Pause { execution_id } => {
            ctx.orchestrator.pause_execution(&ctx.org_id, execution_id).await?;
            output(&ActionOutput { execution_id, action: "paused" }, ctx.json);
        }
        ExecutionCommands::Resume { execution_id } => {
            ctx.orchestrator.resume_execution(&ctx.org_id, execution_id).await?;
            output(&ActionOutput { execution_id, action: "resumed" }, ctx.json);
        }
        ExecutionCommands::Cancel { execution_id } => {
            ctx.orchestrator.cancel_execution(&ctx.org_id, execution_id).await?;
            output(&ActionOutput { execution_id, action: "cancelled" }, ctx.json);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ExecutionOutput {
    execution: Execution,
}

impl CommandOutput for ExecutionOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Execution {} (plan {}, task {})\n  status: {}  phase {}/{}",
            self.execution.id,
            self.execution.plan_id,
            self.execution.task_id,
            self.execution.status.as_str(),
            self.execution.current_phase_index + 1,
            self.execution.phases.len()
        )];
        if let Some(err) = &self.execution.terminal_error {
            lines.push(format!("  terminal_error: {err}"));
        }
        if let Some(rollback) = &self.execution.rollback {
            lines.push(format!("  rollback: {rollback:?}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "execution": self.execution })
    }
}

#[derive(Serialize)]
struct ActionOutput {
    execution_id: Uuid,
    action: &'static str,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        format!("Execution {} {}", self.execution_id, self.action)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "execution_id": self.execution_id, "action": self.action })
    }
}
