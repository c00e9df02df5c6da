//! Task CLI commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::TaskCommands;
use crate::cli::CliContext;
use crate::domain::models::{Task, TargetEnvironment, TaskState};
use crate::domain::ports::TaskFilter;

pub async fn handle(ctx: &CliContext, cmd: TaskCommands) -> Result<()> {
    match cmd {
        TaskCommands::Submit { intent, environment } => {
            let environment_hint = environment.as_deref().and_then(TargetEnvironment::from_str);
            let outcome = ctx
                .orchestrator
                .submit_task(&ctx.org_id, &ctx.user_id, &intent, environment_hint, Default::default())
                .await?;
            output(
                &SubmitOutput { task: outcome.task, plan_id: outcome.plan.id, plan_state: outcome.plan.state.as_str().to_string() },
                ctx.json,
            );
        }
        TaskCommands::List { state, limit } => {
            let state = state.as_deref().map(parse_state).transpose()?;
            let tasks = ctx.tasks.list(&ctx.org_id, TaskFilter { state, limit: Some(limit), ..Default::default() }).await?;
            output(&TaskListOutput { tasks }, ctx.json);
        }
        TaskCommands::Show { task_id } => {
            let task = ctx
                .tasks
                .get(&ctx.org_id, task_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("task {task_id} not found"))?;
            output(&TaskShowOutput { task }, ctx.json);
        }
    }
    Ok(())
}

fn parse_state(s: &str) -> Result<TaskState> {
    match s {
        "draft" => Ok(TaskState::Draft),
        "awaiting_approval" => Ok(TaskState::AwaitingApproval),
        "awaiting_second_approval" => Ok(TaskState::AwaitingSecondApproval),
        "approved" => Ok(TaskState::Approved),
        "running" => Ok(TaskState::Running),
        "completed" => Ok(TaskState::Completed),
        "failed" => Ok(TaskState::Failed),
        "cancelled" => Ok(TaskState::Cancelled),
        "rejected" => Ok(TaskState::Rejected),
        other => anyhow::bail!("unknown task state: {other}"),
    }
}

#[derive(Serialize)]
struct SubmitOutput {
    task: Task,
    plan_id: Uuid,
    plan_state: String,
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        format!(
            "Task {} submitted (type {}, risk {})\nPlan {} -> {}",
            self.task.id,
            self.task.task_spec.task_type.as_str(),
            self.task.task_spec.risk_level.as_str(),
            self.plan_id,
            self.plan_state
        )
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "task": self.task, "plan_id": self.plan_id, "plan_state": self.plan_state })
    }
}

#[derive(Serialize)]
struct TaskListOutput {
    tasks: Vec<Task>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        let mut lines = vec![format!("{:<36}  {:<24}  {:<10}  INTENT", "ID", "STATE", "TYPE")];
        for t in &self.tasks {
            lines.push(format!(
                "{}  {:<24}  {:<10}  {}",
                t.id,
                t.state.as_str(),
                t.task_spec.task_type.as_str(),
                truncate(&t.raw_intent, 60)
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "tasks": self.tasks })
    }
}

#[derive(Serialize)]
struct TaskShowOutput {
    task: Task,
}

impl CommandOutput for TaskShowOutput {
    fn to_human(&self) -> String {
        format!(
            "Task {}\n  state: {}\n  type: {}  risk: {}  environment: {}\n  hitl_required: {}  dual_signer_required: {}\n  confidence: {:.2}{}\n  intent: {}",
            self.task.id,
            self.task.state.as_str(),
            self.task.task_spec.task_type.as_str(),
            self.task.task_spec.risk_level.as_str(),
            self.task.task_spec.environment.as_str(),
            self.task.task_spec.hitl_required,
            self.task.task_spec.dual_signer_required,
            self.task.task_spec.confidence,
            if self.task.task_spec.low_confidence { " (low confidence)" } else { "" },
            self.task.raw_intent,
        )
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "task": self.task })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
