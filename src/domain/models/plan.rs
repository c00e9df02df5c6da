//! Plan domain model: phased remediation plans and their approval state machine.
//!
//! A Plan is produced by the Planner Loop (C4) for a Task, validated by the
//! Validation Pipeline (C5), and driven through approval by the Approval
//! State Machine (C6). Once `Approved` the Executor (C7) consumes its phases
//! independently; the plan object itself never changes again (spec §4.6:
//! execution drives its own state).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use iso8601_duration::Duration as IsoDuration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quality::QualityScore;

/// Which assets a phase applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
// Adjacently (not internally) tagged: the `AssetIds` variant wraps a bare
// sequence, which serde cannot merge into an internally-tagged object.
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// An explicit, closed list of asset identifiers.
    AssetIds(Vec<String>),
    /// A criteria-based selector resolved at execution time against the
    /// fleet inventory (spec §4.1's `query_assets` read-only tool).
    Criteria {
        #[serde(default)]
        platforms: Vec<String>,
        #[serde(default)]
        regions: Vec<String>,
        #[serde(default)]
        environments: Vec<String>,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        exclude_asset_ids: Vec<String>,
    },
}

/// A post-apply health check run before the gate decides whether to proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Name of the registered health check tool to invoke (spec §4.1).
    pub check_type: String,
    /// How long to wait for the check to settle before treating it as failed.
    pub timeout_secs: u64,
    /// Interval between polls while waiting for the check to settle.
    pub poll_interval_secs: u64,
}

/// How to roll back a phase or the whole plan when a gate trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    /// No automated rollback; a human must intervene.
    Manual,
    /// Restore assets from a snapshot taken before `apply`.
    Snapshot,
    /// Re-run the phase's tools with inverse arguments.
    ReverseApply,
}

/// The blast radius a rollback is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    Asset,
    Phase,
    Campaign,
}

/// One ordered step of a plan: preflight -> apply -> health_check -> gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub selector: Selector,
    /// Tool name + JSON arguments applied to each selected asset.
    pub tool_name: String,
    pub tool_arguments: serde_json::Value,
    /// ISO 8601 duration string, e.g. `"PT10M"`. Parsed lazily; an
    /// integer-seconds value is rejected at validation time (spec §9 Open
    /// Question, resolved in SPEC_FULL.md §7).
    pub wait_time: String,
    pub health_check: Option<HealthCheckSpec>,
    /// A guard expression of the shape `metric_name>threshold` or
    /// `metric_name>=threshold`, evaluated against the phase's observed
    /// metrics after the health check runs. A match triggers rollback.
    pub rollback_if: Option<String>,
    pub rollback_strategy: RollbackStrategy,
    pub rollback_scope: RollbackScope,
    /// Maximum fraction of assets in this phase allowed to fail before the
    /// phase itself is considered failed (0.0-1.0).
    pub max_failure_fraction: f64,
}

impl Phase {
    /// Parse [`Phase::wait_time`] as an ISO 8601 duration.
    ///
    /// Returns `None` if the string isn't valid ISO 8601 (including bare
    /// integer-seconds strings, which this crate deliberately rejects).
    pub fn parse_wait_time(&self) -> Option<IsoDuration> {
        if !self.wait_time.starts_with('P') {
            return None;
        }
        self.wait_time.parse::<IsoDuration>().ok()
    }

    /// Evaluate [`Phase::rollback_if`] against observed metrics. Returns
    /// `false` when there is no guard, or when the named metric is absent
    /// (fail safe: absence of data never triggers a rollback).
    pub fn rollback_triggered(&self, metrics: &HashMap<String, f64>) -> bool {
        let Some(expr) = &self.rollback_if else {
            return false;
        };
        let (metric, op, threshold) = if let Some((m, t)) = expr.split_once(">=") {
            (m, ">=", t)
        } else if let Some((m, t)) = expr.split_once('>') {
            (m, ">", t)
        } else {
            return false;
        };
        let Some(value) = metrics.get(metric.trim()) else {
            return false;
        };
        let Ok(threshold) = threshold.trim().trim_end_matches('%').parse::<f64>() else {
            return false;
        };
        match op {
            ">=" => *value >= threshold,
            _ => *value > threshold,
        }
    }
}

/// Lifecycle state of a Plan (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Draft,
    AwaitingApproval,
    AwaitingSecond,
    Approved,
    Rejected,
    Cancelled,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingSecond => "awaiting_second",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

/// Outcome of a successful call to [`Plan::approve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub new_state: PlanState,
    /// True when the call was a no-op repeat of an already-applied
    /// single-signer approval (spec §8 property 4).
    pub idempotent_noop: bool,
}

/// Errors raised by the plan's own approval state machine. Kept distinct
/// from [`crate::domain::errors::DomainError`] because these are pure,
/// in-memory FSM failures with no persistence angle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanApprovalError {
    #[error("cannot {action} plan in state {state}")]
    InvalidState { action: &'static str, state: &'static str },

    #[error("self-approval forbidden: user {0} already holds the first approval slot")]
    SelfApprovalForbidden(String),
}

/// One record of a modification applied to a plan while it was awaiting
/// approval (spec §3's `ModificationRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    pub reason: String,
    /// The phases as they existed immediately before this modification.
    pub previous_phases: Vec<Phase>,
}

/// A phased remediation plan produced for a [`crate::domain::models::task::Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub task_id: Uuid,
    pub org_id: String,
    pub phases: Vec<Phase>,
    pub state: PlanState,
    /// User IDs that have approved this plan so far, in order. Len 0, 1
    /// (single-signer approved, or dual-signer first slot filled), or 2
    /// (dual-signer fully approved).
    pub approved_by: Vec<String>,
    pub requires_dual_signer: bool,
    pub rejection_reason: Option<String>,
    pub modifications: Vec<ModificationRecord>,
    pub quality_score: Option<QualityScore>,
    /// Set when this plan supersedes a rejected plan for the same task
    /// (spec §3: "a rejected plan may be superseded by a modified plan").
    pub supersedes: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Plan {
    pub fn new(task_id: Uuid, org_id: impl Into<String>, phases: Vec<Phase>, requires_dual_signer: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            org_id: org_id.into(),
            phases,
            state: PlanState::Draft,
            approved_by: Vec::new(),
            requires_dual_signer,
            rejection_reason: None,
            modifications: Vec::new(),
            quality_score: None,
            supersedes: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    /// Move a draft plan that passed validation into the approval pipeline,
    /// or straight to `Approved` when HITL is not required for this task.
    pub fn submit(&mut self, hitl_required: bool) -> Result<PlanState, PlanApprovalError> {
        if self.state != PlanState::Draft {
            return Err(PlanApprovalError::InvalidState {
                action: "submit",
                state: self.state.as_str(),
            });
        }
        self.state = if hitl_required {
            PlanState::AwaitingApproval
        } else {
            PlanState::Approved
        };
        self.touch();
        Ok(self.state)
    }

    /// Apply an approval action from `user_id`. Implements the dual-signer
    /// graph and idempotency rules of spec §4.6 and §8 property 4.
    pub fn approve(&mut self, user_id: &str) -> Result<ApprovalOutcome, PlanApprovalError> {
        match self.state {
            PlanState::AwaitingApproval => {
                self.approved_by = vec![user_id.to_string()];
                self.state = if self.requires_dual_signer {
                    PlanState::AwaitingSecond
                } else {
                    PlanState::Approved
                };
                self.touch();
                Ok(ApprovalOutcome {
                    new_state: self.state,
                    idempotent_noop: false,
                })
            }
            PlanState::AwaitingSecond => {
                let first = self.approved_by.first().cloned().unwrap_or_default();
                if first == user_id {
                    return Err(PlanApprovalError::SelfApprovalForbidden(user_id.to_string()));
                }
                self.approved_by.push(user_id.to_string());
                self.state = PlanState::Approved;
                self.touch();
                Ok(ApprovalOutcome {
                    new_state: self.state,
                    idempotent_noop: false,
                })
            }
            PlanState::Approved if !self.requires_dual_signer => {
                if self.approved_by.first().map(String::as_str) == Some(user_id) {
                    Ok(ApprovalOutcome {
                        new_state: PlanState::Approved,
                        idempotent_noop: true,
                    })
                } else {
                    Err(PlanApprovalError::InvalidState {
                        action: "approve",
                        state: self.state.as_str(),
                    })
                }
            }
            other => Err(PlanApprovalError::InvalidState {
                action: "approve",
                state: other.as_str(),
            }),
        }
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), PlanApprovalError> {
        match self.state {
            PlanState::AwaitingApproval | PlanState::AwaitingSecond => {
                self.state = PlanState::Rejected;
                self.rejection_reason = Some(reason.into());
                self.touch();
                Ok(())
            }
            other => Err(PlanApprovalError::InvalidState {
                action: "reject",
                state: other.as_str(),
            }),
        }
    }

    /// Replace this plan's phases in place, clearing any collected approvals
    /// and returning it to `awaiting_approval` (spec §4.6: modify always
    /// resets the dual-signer slots).
    pub fn modify(
        &mut self,
        modified_by: impl Into<String>,
        reason: impl Into<String>,
        new_phases: Vec<Phase>,
    ) -> Result<(), PlanApprovalError> {
        match self.state {
            PlanState::AwaitingApproval | PlanState::AwaitingSecond => {
                let previous_phases = std::mem::replace(&mut self.phases, new_phases);
                self.modifications.push(ModificationRecord {
                    modified_by: modified_by.into(),
                    modified_at: Utc::now(),
                    reason: reason.into(),
                    previous_phases,
                });
                self.approved_by.clear();
                self.state = PlanState::AwaitingApproval;
                self.touch();
                Ok(())
            }
            other => Err(PlanApprovalError::InvalidState {
                action: "modify",
                state: other.as_str(),
            }),
        }
    }

    /// Cancel the plan outright. Valid from any pre-approval state; once
    /// `Approved`, cancellation is routed through the owning Execution
    /// instead (the plan record itself is terminal at that point).
    pub fn cancel(&mut self) -> Result<(), PlanApprovalError> {
        match self.state {
            PlanState::Draft | PlanState::AwaitingApproval | PlanState::AwaitingSecond => {
                self.state = PlanState::Cancelled;
                self.touch();
                Ok(())
            }
            other => Err(PlanApprovalError::InvalidState {
                action: "cancel",
                state: other.as_str(),
            }),
        }
    }

    pub fn total_assets_estimate(&self) -> usize {
        self.phases
            .iter()
            .map(|p| match &p.selector {
                Selector::AssetIds(ids) => ids.len(),
                Selector::Criteria { .. } => 0,
            })
            .sum()
    }
}

/// Convenience map used by scenario tests to assert a plan's metrics snapshot
/// against its phases' rollback guards without needing a live executor.
pub type MetricsSnapshot = BTreeMap<String, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(name: &str) -> Phase {
        Phase {
            name: name.to_string(),
            selector: Selector::AssetIds(vec!["asset-1".into()]),
            tool_name: "ssm_patch".into(),
            tool_arguments: serde_json::json!({}),
            wait_time: "PT5M".into(),
            health_check: None,
            rollback_if: Some("error_rate>5".into()),
            rollback_strategy: RollbackStrategy::Snapshot,
            rollback_scope: RollbackScope::Phase,
            max_failure_fraction: 0.1,
        }
    }

    fn plan(dual_signer: bool) -> Plan {
        let mut p = Plan::new(Uuid::new_v4(), "org-1", vec![phase("roll-out")], dual_signer);
        p.submit(true).unwrap();
        p
    }

    #[test]
    fn single_signer_approve_is_terminal() {
        let mut p = plan(false);
        let outcome = p.approve("alice").unwrap();
        assert_eq!(outcome.new_state, PlanState::Approved);
        assert!(!outcome.idempotent_noop);
    }

    #[test]
    fn single_signer_repeat_approve_is_idempotent_noop() {
        let mut p = plan(false);
        p.approve("alice").unwrap();
        let outcome = p.approve("alice").unwrap();
        assert!(outcome.idempotent_noop);
        assert_eq!(outcome.new_state, PlanState::Approved);
    }

    #[test]
    fn single_signer_repeat_approve_by_different_user_errors() {
        let mut p = plan(false);
        p.approve("alice").unwrap();
        assert!(p.approve("bob").is_err());
    }

    #[test]
    fn dual_signer_requires_two_distinct_approvers() {
        let mut p = plan(true);
        let first = p.approve("alice").unwrap();
        assert_eq!(first.new_state, PlanState::AwaitingSecond);
        let second = p.approve("bob").unwrap();
        assert_eq!(second.new_state, PlanState::Approved);
        assert!(!second.idempotent_noop);
    }

    #[test]
    fn dual_signer_self_approval_is_forbidden() {
        let mut p = plan(true);
        p.approve("alice").unwrap();
        let err = p.approve("alice").unwrap_err();
        assert!(matches!(err, PlanApprovalError::SelfApprovalForbidden(_)));
        assert_eq!(p.state, PlanState::AwaitingSecond);
    }

    #[test]
    fn reject_from_awaiting_approval_is_terminal() {
        let mut p = plan(false);
        p.reject("policy violation").unwrap();
        assert_eq!(p.state, PlanState::Rejected);
        assert_eq!(p.rejection_reason.as_deref(), Some("policy violation"));
    }

    #[test]
    fn modify_clears_approvals_and_returns_to_awaiting_approval() {
        let mut p = plan(true);
        p.approve("alice").unwrap();
        assert_eq!(p.state, PlanState::AwaitingSecond);
        p.modify("alice", "narrow blast radius", vec![phase("roll-out-v2")])
            .unwrap();
        assert_eq!(p.state, PlanState::AwaitingApproval);
        assert!(p.approved_by.is_empty());
        assert_eq!(p.modifications.len(), 1);
        assert_eq!(p.phases[0].name, "roll-out-v2");
    }

    #[test]
    fn cancel_is_rejected_once_approved() {
        let mut p = plan(false);
        p.approve("alice").unwrap();
        assert!(p.cancel().is_err());
    }

    #[test]
    fn wait_time_rejects_bare_integer_seconds() {
        let mut ph = phase("x");
        ph.wait_time = "300".into();
        assert!(ph.parse_wait_time().is_none());
    }

    #[test]
    fn wait_time_parses_iso8601() {
        let ph = phase("x");
        assert!(ph.parse_wait_time().is_some());
    }

    #[test]
    fn rollback_guard_triggers_above_threshold() {
        let ph = phase("x");
        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 7.5);
        assert!(ph.rollback_triggered(&metrics));
        metrics.insert("error_rate".to_string(), 1.0);
        assert!(!ph.rollback_triggered(&metrics));
    }

    #[test]
    fn rollback_guard_missing_metric_never_triggers() {
        let ph = phase("x");
        assert!(!ph.rollback_triggered(&HashMap::new()));
    }
}
