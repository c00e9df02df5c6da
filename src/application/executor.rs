//! Executor (C7): drives an approved [`Plan`] through its phase loop
//! (preflight -> apply -> health_check -> gate -> wait), with pause/resume/
//! cancel and rollback semantics layered on top (spec §4.7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::tools::AssetInventory;
use crate::domain::errors::OrchestratorError;
use crate::domain::models::{
    AssetState, Execution, ExecutionStatus, ExecutorConfig, Phase, Plan, PhaseExecutionState,
    RollbackInfo, RollbackScope, RollbackStrategy, Selector,
};
use crate::domain::ports::{
    ExecutionRepository, NotificationEvent, Notifier, ToolContext,
};
use crate::infrastructure::resilience::{RetryPolicy, Transient};

use super::tool_registry::ToolRegistry;

/// Cooperative pause/resume/cancel signal shared between a caller and the
/// execution loop currently running an `Execution`. Suspension points only
/// exist between asset batches and between phases, matching spec §4.7's
/// "in-flight work is NOT interrupted" guarantee.
#[derive(Default)]
pub struct ExecutionControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    resume: Notify,
}

impl ExecutionControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume.notify_waiters();
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.resume.notify_waiters();
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait_for_resume(&self) {
        self.resume.notified().await;
    }
}

#[derive(Debug, Deserialize, Default)]
struct HealthCheckResult {
    #[serde(default)]
    healthy: bool,
    #[serde(default)]
    metrics: HashMap<String, f64>,
}

struct ToolInvocationError(OrchestratorError);

impl Transient for ToolInvocationError {
    fn is_transient(&self) -> bool {
        matches!(self.0, OrchestratorError::ToolFailed { .. })
    }
}

pub struct Executor {
    asset_inventory: Arc<dyn AssetInventory>,
    tool_registry: Arc<ToolRegistry>,
    executions: Arc<dyn ExecutionRepository>,
    notifier: Arc<dyn Notifier>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        asset_inventory: Arc<dyn AssetInventory>,
        tool_registry: Arc<ToolRegistry>,
        executions: Arc<dyn ExecutionRepository>,
        notifier: Arc<dyn Notifier>,
        config: ExecutorConfig,
    ) -> Self {
        Self { asset_inventory, tool_registry, executions, notifier, config }
    }

    fn resolve_selector(&self, selector: &Selector) -> Vec<String> {
        match selector {
            Selector::AssetIds(ids) => ids.clone(),
            Selector::Criteria { platforms, regions, environments, tags, exclude_asset_ids } => self
                .asset_inventory
                .query(platforms, regions, environments, tags, exclude_asset_ids)
                .into_iter()
                .map(|a| a.id)
                .filter(|id| !exclude_asset_ids.contains(id))
                .collect(),
        }
    }

    /// Build and persist a fresh `Pending` execution for an approved plan.
    /// Phase selectors are resolved to concrete asset IDs once, up front, so
    /// every subsequent phase operates on a fixed roster.
    pub async fn start(&self, plan: &Plan) -> Result<Execution, OrchestratorError> {
        let phases = plan
            .phases
            .iter()
            .map(|phase| PhaseExecutionState::new(&phase.name, &self.resolve_selector(&phase.selector)))
            .collect();
        let execution = Execution::new(plan.id, plan.task_id, plan.org_id.clone(), phases);
        self.executions.create(&execution).await?;
        Ok(execution)
    }

    /// Drive `execution` through the phase loop to a terminal state, or
    /// until `control` reports a cancellation. Returns the final, persisted
    /// execution.
    pub async fn run(&self, mut execution: Execution, plan: &Plan, control: Arc<ExecutionControl>) -> Result<Execution, OrchestratorError> {
        if execution.status == ExecutionStatus::Pending {
            execution
                .transition_to(ExecutionStatus::Running)
                .map_err(OrchestratorError::ExecutionAborted)?;
            self.executions.update(&execution).await?;
        }

        for (phase_index, phase_spec) in plan.phases.iter().enumerate() {
            if control.is_cancelled() {
                return self.finish_cancelled(execution).await;
            }
            execution.current_phase_index = phase_index;

            self.preflight(&mut execution, phase_spec);
            self.apply_phase(&mut execution, phase_spec, &control).await;

            if let Some(health_check) = &phase_spec.health_check {
                self.run_health_check(&mut execution, phase_spec, health_check).await;
            }

            let phase_state = execution.phases[phase_index].clone();
            if phase_spec.rollback_triggered(&phase_state.observed_metrics) {
                warn!(execution_id = %execution.id, phase = %phase_spec.name, "rollback_if triggered, rolling back phase");
                self.rollback(&mut execution, phase_spec, RollbackScope::Phase, "rollback_if triggered").await?;
                self.executions.update(&execution).await?;
                self.notifier.notify(&execution.org_id, NotificationEvent::ExecutionRolledBack { execution_id: execution.id }).await;
                return Ok(execution);
            }

            let failure_threshold = if phase_spec.max_failure_fraction > 0.0 {
                phase_spec.max_failure_fraction
            } else {
                self.config.default_max_failure_fraction
            };
            if phase_state.failure_fraction() >= failure_threshold {
                warn!(execution_id = %execution.id, phase = %phase_spec.name, "failure threshold exceeded, rolling back campaign");
                self.rollback(&mut execution, phase_spec, RollbackScope::Campaign, "failure threshold exceeded").await?;
                self.executions.update(&execution).await?;
                self.notifier.notify(&execution.org_id, NotificationEvent::ExecutionFailed { execution_id: execution.id }).await;
                return Ok(execution);
            }

            if control.is_paused() {
                execution
                    .transition_to(ExecutionStatus::Paused)
                    .map_err(OrchestratorError::ExecutionAborted)?;
                self.executions.update(&execution).await?;
                while control.is_paused() && !control.is_cancelled() {
                    control.wait_for_resume().await;
                }
                if control.is_cancelled() {
                    return self.finish_cancelled(execution).await;
                }
                execution
                    .transition_to(ExecutionStatus::Running)
                    .map_err(OrchestratorError::ExecutionAborted)?;
                self.executions.update(&execution).await?;
            }

            if let Some(duration) = phase_spec.parse_wait_time().and_then(|d| d.to_std().ok()) {
                tokio::time::sleep(duration).await;
            }
        }

        execution
            .transition_to(ExecutionStatus::Completed)
            .map_err(OrchestratorError::ExecutionAborted)?;
        self.executions.update(&execution).await?;
        self.notifier.notify(&execution.org_id, NotificationEvent::ExecutionCompleted { execution_id: execution.id }).await;
        info!(execution_id = %execution.id, "execution completed");
        Ok(execution)
    }

    async fn finish_cancelled(&self, mut execution: Execution) -> Result<Execution, OrchestratorError> {
        execution
            .transition_to(ExecutionStatus::Cancelled)
            .map_err(OrchestratorError::ExecutionAborted)?;
        self.executions.update(&execution).await?;
        Ok(execution)
    }

    /// Mark any asset that the inventory no longer reports as reachable as
    /// `Skipped`, otherwise advance it into `Preflight`.
    fn preflight(&self, execution: &mut Execution, phase_spec: &Phase) {
        let reachable: std::collections::HashSet<String> = match &phase_spec.selector {
            Selector::AssetIds(ids) => ids.iter().cloned().collect(),
            Selector::Criteria { platforms, regions, environments, tags, exclude_asset_ids } => self
                .asset_inventory
                .query(platforms, regions, environments, tags, exclude_asset_ids)
                .into_iter()
                .map(|a| a.id)
                .collect(),
        };
        let Some(phase_state) = execution.current_phase_mut() else { return };
        for (asset_id, state) in phase_state.assets.iter_mut() {
            if state.is_terminal() {
                continue;
            }
            *state = if reachable.contains(asset_id) { AssetState::Preflight } else { AssetState::Skipped };
        }
    }

    /// Apply the phase's tool to every non-skipped asset, fanned out up to
    /// `concurrency_cap` at a time. Each asset's own retry loop is strictly
    /// sequential; assets themselves run unordered relative to each other.
    async fn apply_phase(&self, execution: &mut Execution, phase_spec: &Phase, control: &ExecutionControl) {
        let org_id = execution.org_id.clone();
        let task_id = execution.task_id;
        let cap = self.config.max_concurrent_assets.max(1);

        let asset_ids: Vec<String> = execution
            .current_phase()
            .map(|p| {
                p.assets
                    .iter()
                    .filter(|(_, state)| matches!(state, AssetState::Preflight))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut results: HashMap<String, AssetState> = HashMap::new();
        let mut pending = asset_ids.into_iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < cap {
                let Some(asset_id) = pending.next() else { break };
                if control.is_cancelled() {
                    break;
                }
                let phase_spec = phase_spec.clone();
                let org_id = org_id.clone();
                let retry = RetryPolicy::new(
                    self.config.tool_retry_attempts,
                    self.config.tool_retry_initial_backoff_ms,
                    self.config.tool_retry_max_backoff_ms,
                );
                let registry = Arc::clone(&self.tool_registry);
                in_flight.push(async move {
                    let step_id = format!("{task_id}:{}:{asset_id}", phase_spec.name);
                    let ctx = ToolContext { org_id, task_id, dry_run: false, step_id };
                    let mut arguments = phase_spec.tool_arguments.clone();
                    if let Some(obj) = arguments.as_object_mut() {
                        obj.insert("asset_ids".to_string(), serde_json::json!([asset_id.clone()]));
                    }
                    let outcome = retry
                        .execute(|| {
                            let registry = Arc::clone(&registry);
                            let arguments = arguments.clone();
                            let ctx = ctx.clone();
                            let tool_name = phase_spec.tool_name.clone();
                            async move {
                                registry
                                    .invoke(&tool_name, arguments, ctx, None, "executor")
                                    .await
                                    .map_err(ToolInvocationError)
                            }
                        })
                        .await;
                    (asset_id, outcome.is_ok())
                });
            }

            let Some((asset_id, succeeded)) = in_flight.next().await else { break };
            results.insert(asset_id, if succeeded { AssetState::Completed } else { AssetState::Failed });
        }

        if let Some(phase_state) = execution.current_phase_mut() {
            for (asset_id, state) in results {
                phase_state.assets.insert(asset_id, state);
            }
            if phase_state.started_at.is_none() {
                phase_state.started_at = Some(chrono::Utc::now());
            }
        }
    }

    /// Poll the phase's declared health check tool until it reports
    /// healthy, the timeout elapses, or `rollback_if` trips against
    /// collected metrics. A timed-out check marks every non-terminal asset
    /// `Failed` so the fraction feeds into the failure-threshold gate below.
    async fn run_health_check(&self, execution: &mut Execution, phase_spec: &Phase, health_check: &crate::domain::models::HealthCheckSpec) {
        let org_id = execution.org_id.clone();
        let task_id = execution.task_id;
        let deadline = tokio::time::Instant::now() + StdDuration::from_secs(health_check.timeout_secs);
        let asset_ids: Vec<String> = execution.current_phase().map(|p| p.assets.keys().cloned().collect()).unwrap_or_default();

        loop {
            let ctx = ToolContext { org_id: org_id.clone(), task_id, dry_run: false, step_id: format!("{task_id}:{}:health", phase_spec.name) };
            let arguments = serde_json::json!({"asset_ids": asset_ids});
            let outcome = self.tool_registry.invoke(&health_check.check_type, arguments, ctx, None, "executor").await;

            if let Ok(value) = outcome {
                let parsed: HealthCheckResult = serde_json::from_value(value).unwrap_or_default();
                if let Some(phase_state) = execution.current_phase_mut() {
                    phase_state.observed_metrics.extend(parsed.metrics);
                }
                if parsed.healthy || phase_spec.rollback_triggered(&execution.current_phase().map(|p| p.observed_metrics.clone()).unwrap_or_default()) {
                    return;
                }
            }

            if tokio::time::Instant::now() >= deadline {
                if let Some(phase_state) = execution.current_phase_mut() {
                    for state in phase_state.assets.values_mut() {
                        if !state.is_terminal() {
                            *state = AssetState::Failed;
                        }
                    }
                }
                return;
            }

            tokio::time::sleep(StdDuration::from_secs(health_check.poll_interval_secs.max(1))).await;
        }
    }

    /// Perform (or record the intent for) a rollback per the phase's
    /// declared strategy, then move the execution to its terminal rollback
    /// state. A rollback that itself fails leaves the execution `Failed`,
    /// never `RolledBack` (spec §4.7).
    async fn rollback(&self, execution: &mut Execution, phase_spec: &Phase, scope: RollbackScope, reason: &str) -> Result<(), OrchestratorError> {
        let rollback_error = match phase_spec.rollback_strategy {
            RollbackStrategy::Manual => None,
            RollbackStrategy::Snapshot | RollbackStrategy::ReverseApply => {
                let org_id = execution.org_id.clone();
                let task_id = execution.task_id;
                let ctx = ToolContext { org_id, task_id, dry_run: false, step_id: format!("{task_id}:{}:rollback", phase_spec.name) };
                let asset_ids: Vec<String> = execution.current_phase().map(|p| p.assets.keys().cloned().collect()).unwrap_or_default();
                let arguments = serde_json::json!({"asset_ids": asset_ids, "rollback": true});
                match self.tool_registry.invoke(&phase_spec.tool_name, arguments, ctx, None, "executor").await {
                    Ok(_) => None,
                    Err(err) => Some(err.to_string()),
                }
            }
        };

        execution.record_rollback(RollbackInfo {
            strategy: phase_spec.rollback_strategy,
            scope,
            triggered_by: reason.to_string(),
            rollback_error: rollback_error.clone(),
            at: chrono::Utc::now(),
        });

        let target = if rollback_error.is_some() { ExecutionStatus::Failed } else { ExecutionStatus::RolledBack };
        execution.transition_to(target).map_err(OrchestratorError::ExecutionAborted)?;
        Ok(())
    }

    pub async fn pause(&self, org_id: &str, execution_id: Uuid, control: &ExecutionControl) -> Result<(), OrchestratorError> {
        let execution = self
            .executions
            .get(org_id, execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("execution {execution_id}")))?;
        if execution.status != ExecutionStatus::Running {
            return Err(OrchestratorError::StateConflict { current_state: execution.status.as_str().to_string() });
        }
        control.pause();
        Ok(())
    }

    pub async fn resume(&self, org_id: &str, execution_id: Uuid, control: &ExecutionControl) -> Result<(), OrchestratorError> {
        let execution = self
            .executions
            .get(org_id, execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("execution {execution_id}")))?;
        if execution.status != ExecutionStatus::Paused {
            return Err(OrchestratorError::StateConflict { current_state: execution.status.as_str().to_string() });
        }
        control.resume();
        Ok(())
    }

    pub async fn cancel(&self, org_id: &str, execution_id: Uuid, control: &ExecutionControl) -> Result<(), OrchestratorError> {
        let execution = self
            .executions
            .get(org_id, execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("execution {execution_id}")))?;
        if execution.status.is_terminal() {
            return Err(OrchestratorError::StateConflict { current_state: execution.status.as_str().to_string() });
        }
        control.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::notifier::LoggingNotifier;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteExecutionRepository, SqliteToolInvocationRepository};
    use crate::adapters::tools::InMemoryAssetInventory;
    use crate::domain::models::{RollbackScope as RScope, RollbackStrategy as RStrat, SafetyClass, ToolDescriptor};
    use crate::domain::ports::ToolHandler;
    use crate::domain::ports::ToolHandlerError;
    use async_trait::async_trait;

    struct AlwaysOkHandler;

    #[async_trait]
    impl ToolHandler for AlwaysOkHandler {
        async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
            Ok(arguments)
        }
    }

    struct AlwaysFailHandler;

    #[async_trait]
    impl ToolHandler for AlwaysFailHandler {
        async fn invoke(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
            Err(ToolHandlerError::Upstream("boom".to_string()))
        }
    }

    fn phase_with(name: &str, tool_name: &str, asset_ids: &[&str], rollback_if: Option<&str>, max_failure_fraction: f64) -> Phase {
        Phase {
            name: name.to_string(),
            selector: Selector::AssetIds(asset_ids.iter().map(|s| s.to_string()).collect()),
            tool_name: tool_name.to_string(),
            tool_arguments: serde_json::json!({"baseline_id": "b1"}),
            wait_time: "PT0S".to_string(),
            health_check: None,
            rollback_if: rollback_if.map(str::to_string),
            rollback_strategy: RStrat::Manual,
            rollback_scope: RScope::Phase,
            max_failure_fraction,
        }
    }

    async fn executor_with(tool_name: &str, handler: Arc<dyn ToolHandler>) -> Executor {
        let pool = create_migrated_test_pool().await.unwrap();
        let tool_registry = Arc::new(ToolRegistry::new(Arc::new(SqliteToolInvocationRepository::new(pool.clone()))));
        tool_registry
            .register(
                ToolDescriptor::new(tool_name, "d", serde_json::json!({"type": "object"}), SafetyClass::Mutating),
                handler,
            )
            .unwrap();
        Executor::new(
            Arc::new(InMemoryAssetInventory::new()),
            tool_registry,
            Arc::new(SqliteExecutionRepository::new(pool)),
            Arc::new(LoggingNotifier::new()),
            ExecutorConfig::default(),
        )
    }

    fn plan_with(phases: Vec<Phase>) -> Plan {
        Plan::new(Uuid::new_v4(), "org-1", phases, false)
    }

    #[tokio::test]
    async fn successful_phases_complete_the_execution() {
        let executor = executor_with("ssm_patch", Arc::new(AlwaysOkHandler)).await;
        let plan = plan_with(vec![phase_with("p1", "ssm_patch", &["a1", "a2"], None, 0.5)]);
        let execution = executor.start(&plan).await.unwrap();
        let control = ExecutionControl::new();
        let result = executor.run(execution, &plan, control).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn failure_threshold_triggers_rollback_and_fails() {
        let executor = executor_with("ssm_patch", Arc::new(AlwaysFailHandler)).await;
        let plan = plan_with(vec![phase_with("p1", "ssm_patch", &["a1", "a2"], None, 0.1)]);
        let execution = executor.start(&plan).await.unwrap();
        let control = ExecutionControl::new();
        let result = executor.run(execution, &plan, control).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.rollback.is_some());
    }

    #[tokio::test]
    async fn cancel_before_run_leaves_execution_cancelled() {
        let executor = executor_with("ssm_patch", Arc::new(AlwaysOkHandler)).await;
        let plan = plan_with(vec![phase_with("p1", "ssm_patch", &["a1"], None, 0.5), phase_with("p2", "ssm_patch", &["a1"], None, 0.5)]);
        let execution = executor.start(&plan).await.unwrap();
        let control = ExecutionControl::new();
        control.cancel();
        let result = executor.run(execution, &plan, control).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
    }
}
