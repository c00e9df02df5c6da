//! Agent registry CLI commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::AgentCommands;
use crate::cli::CliContext;

pub async fn handle(ctx: &CliContext, cmd: AgentCommands) -> Result<()> {
    match cmd {
        AgentCommands::List => {
            let agents: Vec<AgentSummary> = ctx
                .agents
                .list()
                .into_iter()
                .map(|a| AgentSummary {
                    name: a.name.clone(),
                    task_type: a.task_type.as_str().to_string(),
                    priority: a.priority,
                    min_quality_threshold: a.min_quality_threshold,
                    allowed_tools: a.allowed_tools.clone(),
                })
                .collect();
            output(&AgentListOutput { agents }, ctx.json);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AgentSummary {
    name: String,
    task_type: String,
    priority: i32,
    min_quality_threshold: u8,
    allowed_tools: Vec<String>,
}

#[derive(Serialize)]
struct AgentListOutput {
    agents: Vec<AgentSummary>,
}

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        if self.agents.is_empty() {
            return "No agents registered.".to_string();
        }
        let mut lines = vec![format!("{:<24}  {:<12}  {:<8}  TOOLS", "NAME", "TASK TYPE", "PRIORITY")];
        for a in &self.agents {
            lines.push(format!("{:<24}  {:<12}  {:<8}  {}", a.name, a.task_type, a.priority, a.allowed_tools.join(", ")));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "agents": self.agents })
    }
}
