//! fleetctl CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use fleetctl_orchestrator::adapters::durability::{InProcessDurabilityAdapter, RemoteWorkflowAdapter, RemoteWorkflowConfig};
use fleetctl_orchestrator::adapters::llm::{AnthropicProvider, AnthropicProviderConfig, MockLlmProvider};
use fleetctl_orchestrator::adapters::notifier::LoggingNotifier;
use fleetctl_orchestrator::adapters::sqlite::{
    initialize_database, PoolConfig, SqliteApprovalRepository, SqliteExecutionRepository, SqlitePlanRepository,
    SqliteTaskRepository, SqliteToolInvocationRepository,
};
use fleetctl_orchestrator::adapters::tools::{
    self, AzureUpdateManagementHandler, GcpOsConfigHandler, InMemoryAssetInventory, K8sRolloutHandler,
    ManualStepHandler, QueryAssetsHandler, SsmPatchHandler, VsphereUpdateHandler,
};
use fleetctl_orchestrator::application::{
    AgentRegistry, ApprovalStateMachine, AuditTrail, Executor, MetaEngine, Orchestrator, PlannerLoop, ToolRegistry,
    ValidationPipeline,
};
use fleetctl_orchestrator::cli::{dispatch, Cli, CliContext, Commands};
use fleetctl_orchestrator::domain::models::{AgentDefinition, DurabilityMode, TaskType};
use fleetctl_orchestrator::domain::ports::{DurabilityAdapter, LlmProvider};
use fleetctl_orchestrator::infrastructure::config::ConfigLoader;
use fleetctl_orchestrator::infrastructure::logging::{LogConfig, LoggerImpl};
use fleetctl_orchestrator::infrastructure::resilience::RetryPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;

    let log_config: LogConfig = (&config.logging).into();
    let _logger_guard = LoggerImpl::init(&log_config).context("failed to initialize logging")?;

    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        acquire_timeout: Duration::from_secs(config.database.busy_timeout_secs),
    };
    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url, Some(pool_config))
        .await
        .context("failed to initialize database")?;

    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let plans = Arc::new(SqlitePlanRepository::new(pool.clone()));
    let executions = Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let approvals = Arc::new(SqliteApprovalRepository::new(pool.clone()));
    let invocations = Arc::new(SqliteToolInvocationRepository::new(pool.clone()));

    let llm: Arc<dyn LlmProvider> = build_llm_provider(&config)?;

    let asset_inventory = Arc::new(InMemoryAssetInventory::new());

    let tool_registry = Arc::new(ToolRegistry::new(invocations.clone()));
    for descriptor in tools::builtin_tool_descriptors() {
        match descriptor.name.as_str() {
            "query_assets" => tool_registry.register(descriptor, Arc::new(QueryAssetsHandler::new(asset_inventory.clone()))),
            "ssm_patch" => tool_registry.register(descriptor, Arc::new(SsmPatchHandler)),
            "azure_update_management" => tool_registry.register(descriptor, Arc::new(AzureUpdateManagementHandler)),
            "gcp_os_config" => tool_registry.register(descriptor, Arc::new(GcpOsConfigHandler)),
            "k8s_rollout" => tool_registry.register(descriptor, Arc::new(K8sRolloutHandler)),
            "vsphere_update" => tool_registry.register(descriptor, Arc::new(VsphereUpdateHandler)),
            "manual_step" => tool_registry.register(descriptor, Arc::new(ManualStepHandler)),
            other => tracing::warn!(tool = other, "no handler wired for builtin tool descriptor"),
        }
    }

    let agent_registry = Arc::new(AgentRegistry::new(builtin_agent_definitions()));
    let notifier = Arc::new(LoggingNotifier::new());

    let meta_engine = Arc::new(MetaEngine::new(llm.clone(), config.policy.clone()));
    let planner_loop = Arc::new(PlannerLoop::new(llm.clone(), tool_registry.clone(), config.llm.max_planning_tokens));
    let validation_pipeline = Arc::new(ValidationPipeline::new(asset_inventory.clone(), tool_registry.clone(), tasks.clone()));
    let approval_state_machine = Arc::new(ApprovalStateMachine::new(plans.clone(), tasks.clone(), approvals.clone(), notifier.clone()));
    let executor = Arc::new(Executor::new(asset_inventory.clone(), tool_registry.clone(), executions.clone(), notifier.clone(), config.executor.clone()));
    let audit_trail = Arc::new(AuditTrail::new(invocations.clone(), approvals.clone()));
    let durability: Arc<dyn DurabilityAdapter> = build_durability_adapter(&config, executions.clone())?;

    let orchestrator = Arc::new(Orchestrator::new(
        meta_engine,
        agent_registry.clone(),
        planner_loop,
        validation_pipeline,
        approval_state_machine,
        executor,
        audit_trail,
        durability,
        tasks.clone(),
        plans.clone(),
        executions.clone(),
        config.policy.clone(),
    ));

    orchestrator.recover_on_boot().await;

    let ctx = CliContext {
        orchestrator,
        tasks,
        plans,
        executions,
        agents: agent_registry,
        tools: tool_registry,
        org_id: cli.org,
        user_id: cli.user,
        json: cli.json,
    };

    match cli.command {
        Commands::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.http.bind.clone());
            let state = fleetctl_orchestrator::interfaces::http::AppState {
                orchestrator: ctx.orchestrator.clone(),
                tasks: ctx.tasks.clone(),
                plans: ctx.plans.clone(),
                executions: ctx.executions.clone(),
                agents: ctx.agents.clone(),
                tools: ctx.tools.clone(),
            };
            fleetctl_orchestrator::interfaces::http::serve(state, &bind_addr, &config.http).await
        }
        other => dispatch(&ctx, other).await,
    }
}

fn build_llm_provider(config: &fleetctl_orchestrator::domain::models::Config) -> Result<Arc<dyn LlmProvider>> {
    match config.llm.provider.as_str() {
        "anthropic" => {
            let api_key = config.llm.api_key.clone().unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!("no LLM API key configured; falling back to the mock provider");
                return Ok(Arc::new(MockLlmProvider::unavailable()));
            }
            let provider_config = AnthropicProviderConfig {
                api_key,
                base_url: config.llm.base_url.clone().unwrap_or_else(|| "https://api.anthropic.com".to_string()),
                model: config.llm.model.clone(),
                rate_limit_rpm: config.llm.requests_per_minute,
                retry_policy: RetryPolicy {
                    max_retries: config.llm.max_retries,
                    initial_backoff_ms: config.llm.initial_backoff_ms,
                    max_backoff_ms: config.llm.max_backoff_ms,
                },
            };
            Ok(Arc::new(AnthropicProvider::new(provider_config)?))
        }
        other => anyhow::bail!("unsupported llm provider: {other}"),
    }
}

fn build_durability_adapter(
    config: &fleetctl_orchestrator::domain::models::Config,
    executions: Arc<dyn fleetctl_orchestrator::domain::ports::ExecutionRepository>,
) -> Result<Arc<dyn DurabilityAdapter>> {
    match config.durability.mode {
        DurabilityMode::InProcess => Ok(Arc::new(InProcessDurabilityAdapter::new(executions))),
        DurabilityMode::Durable => {
            let endpoint = config
                .durability
                .remote_endpoint
                .clone()
                .context("durability.mode is `durable` but no remote_endpoint was configured")?;
            let remote_config = RemoteWorkflowConfig {
                endpoint,
                retry_policy: RetryPolicy {
                    max_retries: config.llm.max_retries,
                    initial_backoff_ms: config.llm.initial_backoff_ms,
                    max_backoff_ms: config.llm.max_backoff_ms,
                },
            };
            Ok(Arc::new(RemoteWorkflowAdapter::new(remote_config)?))
        }
    }
}

/// Stock agent catalog, one definition per task type, each scoped to the
/// tools its remediation class actually needs (spec §4.1's per-agent
/// `allowed_tools` allowlist). Operators extending this for a real fleet
/// register additional, higher-priority definitions ahead of these.
fn builtin_agent_definitions() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new("drift-remediator", TaskType::Drift, "You detect and correct configuration drift against the declared baseline.")
            .with_allowed_tools(vec!["query_assets".into(), "ssm_patch".into(), "azure_update_management".into(), "gcp_os_config".into()]),
        AgentDefinition::new("patch-manager", TaskType::Patch, "You roll out OS and package patches across the fleet in controlled waves.")
            .with_allowed_tools(vec!["query_assets".into(), "ssm_patch".into(), "azure_update_management".into(), "gcp_os_config".into()]),
        AgentDefinition::new("image-updater", TaskType::Image, "You roll container workloads forward to a target image.")
            .with_allowed_tools(vec!["query_assets".into(), "k8s_rollout".into()]),
        AgentDefinition::new("compliance-auditor", TaskType::Compliance, "You bring assets back into compliance with a named control.")
            .with_allowed_tools(vec!["query_assets".into(), "ssm_patch".into(), "gcp_os_config".into(), "manual_step".into()]),
        AgentDefinition::new("cost-optimizer", TaskType::Cost, "You right-size or decommission underutilized fleet assets.")
            .with_allowed_tools(vec!["query_assets".into(), "manual_step".into()]),
        AgentDefinition::new("dr-operator", TaskType::Dr, "You execute disaster-recovery failover and failback plans.")
            .with_allowed_tools(vec!["query_assets".into(), "vsphere_update".into(), "manual_step".into()])
            .with_min_quality_threshold(70),
        AgentDefinition::new("incident-responder", TaskType::Incident, "You remediate an active incident with the narrowest safe blast radius.")
            .with_allowed_tools(vec!["query_assets".into(), "k8s_rollout".into(), "ssm_patch".into(), "manual_step".into()])
            .with_min_quality_threshold(60),
        AgentDefinition::new("security-responder", TaskType::Security, "You contain and remediate a security finding across affected assets.")
            .with_allowed_tools(vec!["query_assets".into(), "ssm_patch".into(), "azure_update_management".into(), "gcp_os_config".into(), "k8s_rollout".into()])
            .with_min_quality_threshold(75)
            .with_priority(1),
    ]
}
