//! Composition root: wires C1-C9 and the repositories behind them into the
//! handful of entry points the CLI and HTTP gateway actually call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{Execution, ExecutionStatus, Plan, PlanState, PolicyConfig, Task, TargetEnvironment, TaskState};
use crate::domain::ports::{DurabilityAdapter, ExecutionRepository, PlanRepository, TaskRepository};

use super::audit::AuditTrail;
use super::agent_registry::AgentRegistry;
use super::approval_state_machine::ApprovalStateMachine;
use super::executor::{Executor, ExecutionControl};
use super::meta_engine::MetaEngine;
use super::planner_loop::PlannerLoop;
use super::validation_pipeline::{HumanReviewState, ValidationPipeline};

/// Outcome of [`Orchestrator::submit_task`]: the persisted task plus
/// whatever plan state the submission settled into (awaiting approval, or
/// already approved for a zero-HITL policy rule).
pub struct SubmissionOutcome {
    pub task: Task,
    pub plan: Plan,
}

pub struct Orchestrator {
    meta_engine: Arc<MetaEngine>,
    agent_registry: Arc<AgentRegistry>,
    planner_loop: Arc<PlannerLoop>,
    validation_pipeline: Arc<ValidationPipeline>,
    approval_state_machine: Arc<ApprovalStateMachine>,
    executor: Arc<Executor>,
    audit_trail: Arc<AuditTrail>,
    durability: Arc<dyn DurabilityAdapter>,
    tasks: Arc<dyn TaskRepository>,
    plans: Arc<dyn PlanRepository>,
    executions: Arc<dyn ExecutionRepository>,
    policy: PolicyConfig,
    /// Live suspension handles for in-flight executions, keyed by execution
    /// id. An execution only has an entry while `Executor::run` is actually
    /// polling it; a restart loses this map entirely, which is fine because
    /// the Durability Adapter's boot-time recovery scan re-populates it.
    controls: AsyncMutex<HashMap<Uuid, Arc<ExecutionControl>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        meta_engine: Arc<MetaEngine>,
        agent_registry: Arc<AgentRegistry>,
        planner_loop: Arc<PlannerLoop>,
        validation_pipeline: Arc<ValidationPipeline>,
        approval_state_machine: Arc<ApprovalStateMachine>,
        executor: Arc<Executor>,
        audit_trail: Arc<AuditTrail>,
        durability: Arc<dyn DurabilityAdapter>,
        tasks: Arc<dyn TaskRepository>,
        plans: Arc<dyn PlanRepository>,
        executions: Arc<dyn ExecutionRepository>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            meta_engine,
            agent_registry,
            planner_loop,
            validation_pipeline,
            approval_state_machine,
            executor,
            audit_trail,
            durability,
            tasks,
            plans,
            executions,
            policy,
            controls: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Classify -> pick agent -> plan -> validate -> submit into approval
    /// (spec §4.3-§4.6 end to end). Returns the persisted task and the plan
    /// it produced, whatever state the plan landed in.
    pub async fn submit_task(
        &self,
        org_id: &str,
        user_id: &str,
        raw_intent: &str,
        environment_hint: Option<TargetEnvironment>,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<SubmissionOutcome, OrchestratorError> {
        let task_spec = self.meta_engine.classify(raw_intent, user_id, environment_hint, context).await;
        let task = Task::new(org_id, raw_intent, task_spec.clone());
        self.tasks.create(&task).await?;

        let agent = self.agent_registry.pick(task_spec.task_type)?;

        let outcome = self.planner_loop.run(agent, &task_spec, raw_intent, org_id, task.id).await?;

        let (policy_hitl, dual_signer) = self.policy.resolve(task_spec.task_type, task_spec.risk_level, task_spec.environment);
        let hitl_required = task_spec.hitl_required || policy_hitl || task_spec.low_confidence;

        let mut plan = Plan::new(task.id, org_id, outcome.phases, dual_signer);

        let validation = self.validation_pipeline.validate(&plan, agent, &task_spec, HumanReviewState::NotReviewed).await;
        if !validation.valid {
            return Err(OrchestratorError::ValidatorRejected(validation.reasons));
        }
        plan.quality_score = Some(validation.quality_score);

        self.plans.create(&plan).await?;
        let plan = self.approval_state_machine.submit(task.clone(), plan, hitl_required || validation.requires_approval).await?;

        let task = self.tasks.get(org_id, task.id).await?.ok_or_else(|| OrchestratorError::NotFound(format!("task {}", task.id)))?;
        Ok(SubmissionOutcome { task, plan })
    }

    pub async fn approve_plan(&self, org_id: &str, task_id: Uuid, user_id: &str) -> Result<Plan, OrchestratorError> {
        self.approval_state_machine.approve(org_id, task_id, user_id).await
    }

    pub async fn reject_plan(&self, org_id: &str, task_id: Uuid, user_id: &str, reason: impl Into<String>) -> Result<Plan, OrchestratorError> {
        self.approval_state_machine.reject(org_id, task_id, user_id, reason).await
    }

    pub async fn cancel_plan(&self, org_id: &str, task_id: Uuid, user_id: &str) -> Result<Plan, OrchestratorError> {
        self.approval_state_machine.cancel(org_id, task_id, user_id).await
    }

    /// Replace a plan's phases (spec §4.6 `modify`): resets it to
    /// `awaiting_approval` with its prior approvals cleared.
    pub async fn modify_plan(
        &self,
        org_id: &str,
        task_id: Uuid,
        user_id: &str,
        reason: impl Into<String>,
        new_phases: Vec<crate::domain::models::Phase>,
    ) -> Result<Plan, OrchestratorError> {
        self.approval_state_machine.modify(org_id, task_id, user_id, reason, new_phases).await
    }

    /// Start executing an approved plan. The returned `Execution` reflects
    /// whatever state the phase loop reached by the time this call returns
    /// (for an in-process run that's terminal; callers that want to poll a
    /// long-running execution should read it back via the repository
    /// instead of blocking on this future).
    pub async fn start_execution(&self, org_id: &str, task_id: Uuid) -> Result<Execution, OrchestratorError> {
        let plan = self
            .plans
            .get_latest_for_task(org_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("plan for task {task_id}")))?;
        if plan.state != PlanState::Approved {
            return Err(OrchestratorError::StateConflict { current_state: plan.state.as_str().to_string() });
        }

        let mut task = self
            .tasks
            .get(org_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("task {task_id}")))?;

        let execution = self.executor.start(&plan).await?;
        let execution_id = execution.id;
        self.durability.start(execution_id).await.map_err(|e| OrchestratorError::DurabilityLost(execution_id.to_string(), e.to_string()))?;

        task.set_state(TaskState::Running);
        self.tasks.update(&task).await?;

        let control = ExecutionControl::new();
        self.controls.lock().await.insert(execution_id, control.clone());

        let result = self.executor.run(execution, &plan, control).await;
        self.controls.lock().await.remove(&execution_id);

        let execution = result?;
        task.set_state(if execution.is_terminal() && execution.terminal_error.is_none() { TaskState::Completed } else { TaskState::Failed });
        self.tasks.update(&task).await?;
        Ok(execution)
    }

    pub async fn pause_execution(&self, org_id: &str, execution_id: Uuid) -> Result<(), OrchestratorError> {
        let control = self.control_for(execution_id).await?;
        self.executor.pause(org_id, execution_id, &control).await
    }

    pub async fn resume_execution(&self, org_id: &str, execution_id: Uuid) -> Result<(), OrchestratorError> {
        let control = self.control_for(execution_id).await?;
        self.executor.resume(org_id, execution_id, &control).await
    }

    pub async fn cancel_execution(&self, org_id: &str, execution_id: Uuid) -> Result<(), OrchestratorError> {
        let control = self.control_for(execution_id).await?;
        self.executor.cancel(org_id, execution_id, &control).await
    }

    async fn control_for(&self, execution_id: Uuid) -> Result<Arc<ExecutionControl>, OrchestratorError> {
        self.controls
            .lock()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("no running execution {execution_id} in this process")))
    }

    pub async fn audit_trail(&self, org_id: &str, task_id: Uuid) -> Result<Vec<super::audit::AuditEntry>, OrchestratorError> {
        Ok(self.audit_trail.for_task(org_id, task_id).await?)
    }

    /// Boot-time recovery (spec §4.8): ask the Durability Adapter which
    /// executions were in flight when the process last stopped, reload each
    /// one's plan and execution state, and drive its phase loop to
    /// completion. An execution whose plan is gone, or whose persisted state
    /// cannot be reconciled, is marked `failed` with `DurabilityLost` instead
    /// of being silently skipped (spec §7). Never called implicitly by `new`
    /// so that startup order (migrations, then recovery) stays explicit at
    /// the call site.
    pub async fn recover_on_boot(&self) {
        let in_flight = match self.durability.recover_in_flight().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "durability adapter recovery scan failed");
                return;
            }
        };
        info!(count = in_flight.len(), "resuming in-flight executions");

        let non_terminal = match self.executions.list_non_terminal().await {
            Ok(executions) => executions,
            Err(err) => {
                warn!(error = %err, "failed to reload non-terminal executions for boot recovery");
                return;
            }
        };
        let mut by_id: HashMap<Uuid, Execution> = non_terminal.into_iter().map(|e| (e.id, e)).collect();

        for execution_id in in_flight {
            let Some(execution) = by_id.remove(&execution_id) else {
                warn!(%execution_id, "durability adapter reported an execution this process has no record of");
                continue;
            };
            self.resume_recovered(execution).await;
        }
    }

    /// Reload a single recovered execution's plan and drive it through
    /// `Executor::run` under a fresh `ExecutionControl`, or mark it
    /// unrecoverable if its plan is gone or its persisted state can't be
    /// reconciled.
    async fn resume_recovered(&self, mut execution: Execution) {
        let execution_id = execution.id;
        let org_id = execution.org_id.clone();

        let plan = match self.plans.get(&org_id, execution.plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => return self.fail_unrecoverable(execution, "plan no longer exists").await,
            Err(err) => return self.fail_unrecoverable(execution, &err.to_string()).await,
        };

        // The in-process pause signal lives only in memory and doesn't
        // survive a restart; a recovered paused execution is un-paused so
        // its phase loop can proceed. Operators who still want it paused
        // must re-request it via `pause_execution` after boot.
        if execution.status == ExecutionStatus::Paused {
            if let Err(err) = execution.transition_to(ExecutionStatus::Running) {
                return self.fail_unrecoverable(execution, &err).await;
            }
        }

        let control = ExecutionControl::new();
        self.controls.lock().await.insert(execution_id, control.clone());
        let result = self.executor.run(execution, &plan, control).await;
        self.controls.lock().await.remove(&execution_id);

        match result {
            Ok(execution) => match self.tasks.get(&org_id, execution.task_id).await {
                Ok(Some(mut task)) => {
                    task.set_state(if execution.is_terminal() && execution.terminal_error.is_none() { TaskState::Completed } else { TaskState::Failed });
                    if let Err(err) = self.tasks.update(&task).await {
                        warn!(%execution_id, error = %err, "failed to persist task state after boot-recovered execution");
                    }
                }
                Ok(None) => warn!(%execution_id, "task for boot-recovered execution no longer exists"),
                Err(err) => warn!(%execution_id, error = %err, "failed to reload task after boot-recovered execution"),
            },
            Err(err) => warn!(%execution_id, error = %err, "boot-recovered execution failed"),
        }
    }

    async fn fail_unrecoverable(&self, mut execution: Execution, cause: &str) {
        let execution_id = execution.id;
        let lost = OrchestratorError::DurabilityLost(execution_id.to_string(), cause.to_string());
        warn!(%execution_id, cause, "execution unrecoverable at boot, marking failed");

        if execution.status == ExecutionStatus::Paused {
            let _ = execution.transition_to(ExecutionStatus::Running);
        }
        if execution.status != ExecutionStatus::Failed {
            if let Err(err) = execution.transition_to(ExecutionStatus::Failed) {
                warn!(%execution_id, error = %err, "could not transition unrecoverable execution to failed");
                return;
            }
        }
        execution.terminal_error = Some(lost.to_string());
        if let Err(err) = self.executions.update(&execution).await {
            warn!(%execution_id, error = %err, "failed to persist unrecoverable execution state");
        }
    }
}
