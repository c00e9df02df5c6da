//! Tool registry CLI commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::application::tool_registry::ToolListFilter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ToolCommands;
use crate::cli::CliContext;
use crate::domain::models::SafetyClass;

pub async fn handle(ctx: &CliContext, cmd: ToolCommands) -> Result<()> {
    match cmd {
        ToolCommands::List { safety_class } => {
            let safety_class = safety_class.as_deref().map(parse_safety_class).transpose()?;
            let tools = ctx.tools.list(ToolListFilter { safety_class, names: None });
            output(&ToolListOutput { tools }, ctx.json);
        }
    }
    Ok(())
}

fn parse_safety_class(s: &str) -> Result<SafetyClass> {
    match s {
        "read_only" => Ok(SafetyClass::ReadOnly),
        "mutating" => Ok(SafetyClass::Mutating),
        "destructive" => Ok(SafetyClass::Destructive),
        other => anyhow::bail!("unknown safety class: {other}"),
    }
}

#[derive(Serialize)]
struct ToolListOutput {
    tools: Vec<crate::domain::models::ToolDescriptor>,
}

impl CommandOutput for ToolListOutput {
    fn to_human(&self) -> String {
        if self.tools.is_empty() {
            return "No tools registered.".to_string();
        }
        let mut lines = vec![format!("{:<24}  {:<12}  {:<6}  {:<6}  DESCRIPTION", "NAME", "SAFETY", "MAXS", "RPM")];
        for t in &self.tools {
            lines.push(format!(
                "{:<24}  {:<12}  {:<6}  {:<6}  {}",
                t.name,
                format!("{:?}", t.safety_class),
                t.max_duration_secs,
                t.rate_limit_per_minute,
                t.description
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "tools": self.tools })
    }
}
