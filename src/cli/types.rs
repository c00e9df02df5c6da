//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "AI task orchestrator for fleet remediation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Tenant organization ID
    #[arg(long, global = true, default_value = "default", env = "FLEETCTL_ORG_ID")]
    pub org: String,

    /// User ID performing the action (for approval attribution)
    #[arg(long, global = true, default_value = "operator", env = "FLEETCTL_USER_ID")]
    pub user: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Task submission and inspection
    #[command(subcommand)]
    Task(TaskCommands),

    /// Plan approval workflow
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Execution lifecycle control
    #[command(subcommand)]
    Execution(ExecutionCommands),

    /// Audit trail inspection
    Audit {
        /// Task ID
        task_id: Uuid,
    },

    /// Registered agent definitions
    #[command(subcommand)]
    Agent(AgentCommands),

    /// Registered tool handlers
    #[command(subcommand)]
    Tool(ToolCommands),

    /// Run the HTTP gateway
    Serve {
        /// Address to bind, overrides config's `http.bind`
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Submit a new intent for classification and planning
    Submit {
        /// Raw operator intent, e.g. "patch all staging web servers for CVE-2026-1234"
        intent: String,

        /// Target environment hint (dev, staging, prod, all)
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// List tasks
    List {
        /// Filter by state (draft, awaiting_approval, approved, running, completed, failed, cancelled, rejected)
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show details for a specific task
    Show {
        /// Task ID
        task_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Show the latest plan for a task
    Show {
        /// Task ID
        task_id: Uuid,
    },

    /// Approve the plan awaiting approval for a task
    Approve {
        /// Task ID
        task_id: Uuid,
    },

    /// Reject the plan awaiting approval for a task
    Reject {
        /// Task ID
        task_id: Uuid,

        /// Reason for rejection
        #[arg(short, long)]
        reason: String,
    },

    /// Cancel a task's non-terminal plan
    Cancel {
        /// Task ID
        task_id: Uuid,
    },

    /// Replace a plan's phases, resetting it to awaiting_approval
    Modify {
        /// Task ID
        task_id: Uuid,

        /// Reason for the modification
        #[arg(short, long)]
        reason: String,

        /// Path to a JSON file containing the replacement phases array
        #[arg(short, long)]
        phases_file: std::path::PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// Start execution of a task's approved plan
    Start {
        /// Task ID
        task_id: Uuid,
    },

    /// Show the execution for a task
    Show {
        /// Task ID
        task_id: Uuid,
    },

    /// Pause an in-flight execution
    Pause {
        /// Execution ID
        execution_id: Uuid,
    },

    /// Resume a paused execution
    Resume {
        /// Execution ID
        execution_id: Uuid,
    },

    /// Cancel an in-flight execution
    Cancel {
        /// Execution ID
        execution_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// List registered agent definitions
    List,
}

#[derive(Subcommand)]
pub enum ToolCommands {
    /// List registered tool handlers
    List {
        /// Filter by safety class (read_only, mutating, destructive)
        #[arg(short, long)]
        safety_class: Option<String>,
    },
}
