//! CLI interface module.
//!
//! This module contains command definitions (`types`), per-group handlers
//! (`commands`), and terminal output formatting (`output`). `main.rs` builds
//! a [`CliContext`] from the wired-up application components and dispatches
//! into it.

pub mod commands;
pub mod output;
pub mod types;

use std::sync::Arc;

use anyhow::Result;

use crate::application::{AgentRegistry, Orchestrator, ToolRegistry};
use crate::domain::ports::{ExecutionRepository, PlanRepository, TaskRepository};

pub use types::{Cli, Commands};

/// Everything a CLI command handler needs: the composition root for
/// mutations, the read-only repositories for listing, and the tenant/actor
/// identity carried on every invocation.
pub struct CliContext {
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: Arc<dyn TaskRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub org_id: String,
    pub user_id: String,
    pub json: bool,
}

/// Dispatch a parsed [`Commands`] against the context, printing output as
/// it goes. Returns an error only for failures that happen before a result
/// is available to print through [`output::output`].
pub async fn dispatch(ctx: &CliContext, command: Commands) -> Result<()> {
    match command {
        Commands::Task(cmd) => commands::task::handle(ctx, cmd).await,
        Commands::Plan(cmd) => commands::plan::handle(ctx, cmd).await,
        Commands::Execution(cmd) => commands::execution::handle(ctx, cmd).await,
        Commands::Audit { task_id } => commands::audit::handle(ctx, task_id).await,
        Commands::Agent(cmd) => commands::agent::handle(ctx, cmd).await,
        Commands::Tool(cmd) => commands::tool::handle(ctx, cmd).await,
        Commands::Serve { .. } => {
            anyhow::bail!("`fleetctl serve` is dispatched directly from main, not through CliContext")
        }
    }
}
