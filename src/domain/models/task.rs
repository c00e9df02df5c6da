//! Task domain model.
//!
//! A Task is the user-visible unit of work created from a submitted intent.
//! It owns zero or one [`crate::domain::models::plan::Plan`] at a time and
//! carries the derived [`TaskSpec`] that the Meta-Engine (C3) produced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The class of remediation work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Drift,
    Patch,
    Image,
    Compliance,
    Cost,
    Dr,
    Incident,
    Security,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drift => "drift",
            Self::Patch => "patch",
            Self::Image => "image",
            Self::Compliance => "compliance",
            Self::Cost => "cost",
            Self::Dr => "dr",
            Self::Incident => "incident",
            Self::Security => "security",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "drift" => Some(Self::Drift),
            "patch" => Some(Self::Patch),
            "image" => Some(Self::Image),
            "compliance" => Some(Self::Compliance),
            "cost" => Some(Self::Cost),
            "dr" => Some(Self::Dr),
            "incident" => Some(Self::Incident),
            "security" => Some(Self::Security),
            _ => None,
        }
    }

    /// Task types considered destructive enough to gate dual-signer policy
    /// (spec §4.3 step 4) by default. Configuration may extend this set.
    pub fn is_destructive_class(&self) -> bool {
        matches!(self, Self::Patch | Self::Image | Self::Dr | Self::Security)
    }
}

/// Risk level assigned to a task, ordered low..critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Target environment named on the task's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEnvironment {
    Dev,
    Staging,
    Prod,
    All,
}

impl TargetEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
            Self::All => "all",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Some(Self::Dev),
            "staging" => Some(Self::Staging),
            "prod" => Some(Self::Prod),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Where the intent behind a task originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Submitted directly by a human operator.
    Operator,
    /// Raised by an automated signal (a CVE feed, a drift detector, a cost alert).
    AutomatedSignal { origin: String },
}

impl Default for TaskSource {
    fn default() -> Self {
        Self::Operator
    }
}

/// The structured classification of an intent, produced by the Meta-Engine (C3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: TaskType,
    pub risk_level: RiskLevel,
    pub environment: TargetEnvironment,
    pub hitl_required: bool,
    pub dual_signer_required: bool,
    pub user_id: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Confidence of the classifier that produced this spec, in [0, 1].
    pub confidence: f64,
    /// Set when the heuristic classifier fell back without reaching the LLM
    /// (spec §4.3 `ClassifierUnavailable` failure mode).
    #[serde(default)]
    pub low_confidence: bool,
    /// Free-text rationale, present when an LLM classification call produced
    /// this spec.
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Lifecycle state of a Task. Mirrors the owned Plan's state machine
/// (spec §4.6) while the plan is non-terminal, then tracks the Execution's
/// outcome once the plan is approved and execution begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Draft,
    AwaitingApproval,
    AwaitingSecondApproval,
    Approved,
    Running,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingSecondApproval => "awaiting_second_approval",
            Self::Approved => "approved",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// Terminal states per spec §3: completed, failed, cancelled, rejected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }
}

/// The user-visible unit of work created from a submitted intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub org_id: String,
    pub raw_intent: String,
    pub task_spec: TaskSpec,
    pub state: TaskState,
    pub source: TaskSource,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Deduplicates retried submissions of the same intent (e.g. a retried
    /// webhook from an upstream CVE feed).
    pub idempotency_key: Option<String>,
    /// Optimistic-locking counter, bumped on every mutation.
    pub version: u64,
}

impl Task {
    pub fn new(org_id: impl Into<String>, raw_intent: impl Into<String>, task_spec: TaskSpec) -> Self {
        let now = Utc::now();
        let created_by = task_spec.user_id.clone();
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            raw_intent: raw_intent.into(),
            task_spec,
            state: TaskState::Draft,
            source: TaskSource::default(),
            created_by,
            created_at: now,
            updated_at: now,
            idempotency_key: None,
            version: 1,
        }
    }

    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TaskSpec {
        TaskSpec {
            task_type: TaskType::Drift,
            risk_level: RiskLevel::Medium,
            environment: TargetEnvironment::Staging,
            hitl_required: true,
            dual_signer_required: false,
            user_id: "u1".into(),
            context: HashMap::new(),
            confidence: 0.92,
            low_confidence: false,
            rationale: None,
        }
    }

    #[test]
    fn new_task_starts_in_draft() {
        let t = Task::new("org-1", "fix drift", spec());
        assert_eq!(t.state, TaskState::Draft);
        assert!(!t.is_terminal());
        assert_eq!(t.version, 1);
    }

    #[test]
    fn set_state_bumps_version_and_timestamp() {
        let mut t = Task::new("org-1", "fix drift", spec());
        let before = t.updated_at;
        let v_before = t.version;
        std::thread::sleep(std::time::Duration::from_millis(2));
        t.set_state(TaskState::AwaitingApproval);
        assert_eq!(t.version, v_before + 1);
        assert!(t.updated_at >= before);
    }

    #[test]
    fn terminal_states_are_exactly_the_spec_set() {
        for s in [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Cancelled,
            TaskState::Rejected,
        ] {
            assert!(s.is_terminal());
        }
        for s in [
            TaskState::Draft,
            TaskState::AwaitingApproval,
            TaskState::AwaitingSecondApproval,
            TaskState::Approved,
            TaskState::Running,
        ] {
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn risk_level_orders_low_to_critical() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn task_type_round_trips_through_str() {
        for t in [
            TaskType::Drift,
            TaskType::Patch,
            TaskType::Image,
            TaskType::Compliance,
            TaskType::Cost,
            TaskType::Dr,
            TaskType::Incident,
            TaskType::Security,
        ] {
            assert_eq!(TaskType::from_str(t.as_str()), Some(t));
        }
    }
}
