//! Execution domain model: the Executor's (C7) runtime state for a plan.
//!
//! Unlike [`crate::domain::models::plan::Plan`], which is terminal once
//! approved, an Execution owns its own state machine that moves through
//! phases: preflight -> apply -> health_check -> gate, with pause/resume/
//! cancel and rollback semantics layered on top (spec §4.7).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::{RollbackScope, RollbackStrategy};

/// Lifecycle state of an Execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    RolledBack,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::Cancelled
        )
    }

    /// Valid next states, mirroring the task/plan state-machine style used
    /// throughout this crate.
    pub fn valid_transitions(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Paused,
                Self::Completed,
                Self::Failed,
                Self::RolledBack,
                Self::Cancelled,
            ],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::Completed | Self::Failed | Self::RolledBack | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Per-asset progress within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    Pending,
    Preflight,
    Applying,
    HealthCheck,
    Completed,
    Failed,
    RolledBack,
    Skipped,
}

impl AssetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack | Self::Skipped)
    }
}

/// Runtime state of one phase within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecutionState {
    pub phase_name: String,
    pub assets: HashMap<String, AssetState>,
    /// Metrics observed after the health check ran, evaluated against the
    /// phase's `rollback_if` guard.
    pub observed_metrics: HashMap<String, f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseExecutionState {
    pub fn new(phase_name: impl Into<String>, asset_ids: &[String]) -> Self {
        Self {
            phase_name: phase_name.into(),
            assets: asset_ids
                .iter()
                .map(|id| (id.clone(), AssetState::Pending))
                .collect(),
            observed_metrics: HashMap::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Fraction of assets in `Failed` state, 0.0 when there are none.
    pub fn failure_fraction(&self) -> f64 {
        if self.assets.is_empty() {
            return 0.0;
        }
        let failed = self
            .assets
            .values()
            .filter(|s| matches!(s, AssetState::Failed))
            .count();
        failed as f64 / self.assets.len() as f64
    }

    pub fn all_assets_terminal(&self) -> bool {
        self.assets.values().all(AssetState::is_terminal)
    }
}

/// Details of a rollback that was performed (or attempted) during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub strategy: RollbackStrategy,
    pub scope: RollbackScope,
    pub triggered_by: String,
    pub rollback_error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Runtime state of a plan's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub task_id: Uuid,
    pub org_id: String,
    pub status: ExecutionStatus,
    pub current_phase_index: usize,
    pub phases: Vec<PhaseExecutionState>,
    pub rollback: Option<RollbackInfo>,
    pub terminal_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Execution {
    pub fn new(plan_id: Uuid, task_id: Uuid, org_id: impl Into<String>, phases: Vec<PhaseExecutionState>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan_id,
            task_id,
            org_id: org_id.into(),
            status: ExecutionStatus::Pending,
            current_phase_index: 0,
            phases,
            rollback: None,
            terminal_error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn transition_to(&mut self, next: ExecutionStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "cannot transition execution from {} to {}",
                self.status.as_str(),
                next.as_str()
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        self.version += 1;
        match next {
            ExecutionStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(self.updated_at);
            }
            ExecutionStatus::Completed
            | ExecutionStatus::Failed
            | ExecutionStatus::RolledBack
            | ExecutionStatus::Cancelled => {
                self.completed_at = Some(self.updated_at);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn current_phase(&self) -> Option<&PhaseExecutionState> {
        self.phases.get(self.current_phase_index)
    }

    pub fn current_phase_mut(&mut self) -> Option<&mut PhaseExecutionState> {
        self.phases.get_mut(self.current_phase_index)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn record_rollback(&mut self, info: RollbackInfo) {
        self.rollback = Some(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec() -> Execution {
        Execution::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "org-1",
            vec![PhaseExecutionState::new(
                "roll-out",
                &["asset-1".to_string(), "asset-2".to_string()],
            )],
        )
    }

    #[test]
    fn pending_to_running_sets_started_at() {
        let mut e = exec();
        assert!(e.started_at.is_none());
        e.transition_to(ExecutionStatus::Running).unwrap();
        assert!(e.started_at.is_some());
    }

    #[test]
    fn terminal_transitions_set_completed_at() {
        for target in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::RolledBack,
        ] {
            let mut e = exec();
            e.transition_to(ExecutionStatus::Running).unwrap();
            e.transition_to(target).unwrap();
            assert!(e.completed_at.is_some());
            assert!(e.is_terminal());
        }
    }

    #[test]
    fn cannot_leave_terminal_state() {
        let mut e = exec();
        e.transition_to(ExecutionStatus::Cancelled).unwrap();
        assert!(e.transition_to(ExecutionStatus::Running).is_err());
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let mut e = exec();
        e.transition_to(ExecutionStatus::Running).unwrap();
        e.transition_to(ExecutionStatus::Paused).unwrap();
        assert_eq!(e.status, ExecutionStatus::Paused);
        e.transition_to(ExecutionStatus::Running).unwrap();
        assert_eq!(e.status, ExecutionStatus::Running);
    }

    #[test]
    fn failure_fraction_computed_over_failed_assets() {
        let mut phase = PhaseExecutionState::new("p", &["a".into(), "b".into(), "c".into(), "d".into()]);
        *phase.assets.get_mut("a").unwrap() = AssetState::Failed;
        assert!((phase.failure_fraction() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn paused_execution_can_be_cancelled() {
        let mut e = exec();
        e.transition_to(ExecutionStatus::Running).unwrap();
        e.transition_to(ExecutionStatus::Paused).unwrap();
        assert!(e.transition_to(ExecutionStatus::Cancelled).is_ok());
    }
}
