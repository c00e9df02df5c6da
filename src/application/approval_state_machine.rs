//! Approval State Machine (C6): drives a [`Plan`] through spec §4.6's
//! transition graph, persisting the mirrored [`Task`] state and appending an
//! [`ApprovalRecord`] for every action.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{ApprovalAction, ApprovalRecord, Plan, PlanApprovalError, PlanState, Task, TaskState};
use crate::domain::ports::{ApprovalRepository, NotificationEvent, Notifier, PlanRepository, TaskRepository};

pub struct ApprovalStateMachine {
    plans: Arc<dyn PlanRepository>,
    tasks: Arc<dyn TaskRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    notifier: Arc<dyn Notifier>,
}

fn task_state_for(plan_state: PlanState) -> TaskState {
    match plan_state {
        PlanState::Draft => TaskState::Draft,
        PlanState::AwaitingApproval => TaskState::AwaitingApproval,
        PlanState::AwaitingSecond => TaskState::AwaitingSecondApproval,
        PlanState::Approved => TaskState::Approved,
        PlanState::Rejected => TaskState::Rejected,
        PlanState::Cancelled => TaskState::Cancelled,
    }
}

impl From<PlanApprovalError> for OrchestratorError {
    fn from(err: PlanApprovalError) -> Self {
        match err {
            PlanApprovalError::SelfApprovalForbidden(user_id) => OrchestratorError::SelfApprovalForbidden(user_id),
            PlanApprovalError::InvalidState { .. } => OrchestratorError::StateConflict { current_state: err.to_string() },
        }
    }
}

impl ApprovalStateMachine {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        tasks: Arc<dyn TaskRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { plans, tasks, approvals, notifier }
    }

    /// Load the task and its latest plan, scoped to `org_id` (spec §8
    /// property 1: every lookup is tenant-scoped at the call site).
    async fn load(&self, org_id: &str, task_id: Uuid) -> Result<(Task, Plan), OrchestratorError> {
        let task = self
            .tasks
            .get(org_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("task {task_id}")))?;
        let plan = self
            .plans
            .get_latest_for_task(org_id, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("plan for task {task_id}")))?;
        Ok((task, plan))
    }

    /// Submit a freshly validated draft plan into the approval pipeline.
    pub async fn submit(&self, mut task: Task, mut plan: Plan, hitl_required: bool) -> Result<Plan, OrchestratorError> {
        let prior_state = plan.state.as_str().to_string();
        plan.submit(hitl_required)?;
        self.persist_transition(&mut task, &mut plan, None, None, &prior_state).await?;

        if plan.state == PlanState::AwaitingApproval {
            self.notifier.notify(&plan.org_id, NotificationEvent::PlanAwaitingApproval { plan_id: plan.id }).await;
        } else {
            self.notifier.notify(&plan.org_id, NotificationEvent::PlanApproved { plan_id: plan.id }).await;
        }
        Ok(plan)
    }

    pub async fn approve(&self, org_id: &str, task_id: Uuid, user_id: &str) -> Result<Plan, OrchestratorError> {
        let (mut task, mut plan) = self.load(org_id, task_id).await?;
        let prior_state = plan.state.as_str().to_string();
        let outcome = plan.approve(user_id)?;

        if !outcome.idempotent_noop {
            self.persist_transition(&mut task, &mut plan, Some(user_id), Some(ApprovalAction::Approve), &prior_state).await?;
            if plan.state == PlanState::Approved {
                self.notifier.notify(&plan.org_id, NotificationEvent::PlanApproved { plan_id: plan.id }).await;
            }
        }
        Ok(plan)
    }

    pub async fn reject(&self, org_id: &str, task_id: Uuid, user_id: &str, reason: impl Into<String>) -> Result<Plan, OrchestratorError> {
        let (mut task, mut plan) = self.load(org_id, task_id).await?;
        let prior_state = plan.state.as_str().to_string();
        plan.reject(reason)?;
        self.persist_transition(&mut task, &mut plan, Some(user_id), Some(ApprovalAction::Reject), &prior_state).await?;
        self.notifier.notify(&plan.org_id, NotificationEvent::PlanRejected { plan_id: plan.id }).await;
        Ok(plan)
    }

    pub async fn modify(
        &self,
        org_id: &str,
        task_id: Uuid,
        user_id: &str,
        reason: impl Into<String>,
        new_phases: Vec<crate::domain::models::Phase>,
    ) -> Result<Plan, OrchestratorError> {
        let (mut task, mut plan) = self.load(org_id, task_id).await?;
        let prior_state = plan.state.as_str().to_string();
        plan.modify(user_id, reason, new_phases)?;
        self.persist_transition(&mut task, &mut plan, Some(user_id), Some(ApprovalAction::Modify), &prior_state).await?;
        Ok(plan)
    }

    pub async fn cancel(&self, org_id: &str, task_id: Uuid, user_id: &str) -> Result<Plan, OrchestratorError> {
        let (mut task, mut plan) = self.load(org_id, task_id).await?;
        let prior_state = plan.state.as_str().to_string();
        plan.cancel()?;
        self.persist_transition(&mut task, &mut plan, Some(user_id), Some(ApprovalAction::Cancel), &prior_state).await?;
        Ok(plan)
    }

    /// Persists the plan, the mirrored task state, and an audit record for
    /// the action in that fixed order. True cross-table atomicity would
    /// require threading a shared transaction through every repository
    /// port; absent that, ordering plan-then-task-then-audit keeps the Plan
    /// row (the source of truth the state machine itself reads back) always
    /// ahead of its dependents, so a crash between writes never leaves the
    /// plan looking less advanced than the audit trail claims.
    async fn persist_transition(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        user_id: Option<&str>,
        action: Option<ApprovalAction>,
        prior_state: &str,
    ) -> Result<(), OrchestratorError> {
        self.plans.update(plan).await?;

        task.set_state(task_state_for(plan.state));
        self.tasks.update(task).await?;

        if let (Some(user_id), Some(action)) = (user_id, action) {
            let record = ApprovalRecord::new(&plan.org_id, plan.id, task.id, user_id, action, prior_state, plan.state.as_str());
            self.approvals.record(&record).await?;
        }

        Ok(())
    }
}
