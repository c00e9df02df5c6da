//! Orchestrator configuration shape, loaded by `infrastructure::config::loader`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::{RiskLevel, TargetEnvironment, TaskType};

/// Top-level configuration for a running orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub durability: DurabilityConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            executor: ExecutorConfig::default(),
            durability: DurabilityConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_database_path() -> String {
    ".orchestrator/orchestrator.db".to_string()
}
const fn default_min_connections() -> u32 {
    5
}
const fn default_max_connections() -> u32 {
    10
}
const fn default_idle_timeout_secs() -> u64 {
    30
}
const fn default_max_lifetime_secs() -> u64 {
    1800
}
const fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// Settings for the LLM provider port (Meta-Engine classification + Planner
/// Loop synthesis), spec §5 timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_llm_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_llm_requests_per_minute")]
    pub requests_per_minute: f64,
    /// Upper bound on planner-loop steps before `PlannerDidNotConverge`.
    #[serde(default = "default_max_planning_steps")]
    pub max_planning_steps: u32,
    /// Total input+output tokens a single planning run may spend across all
    /// its turns before `TokenBudgetExceeded` (spec §4.4).
    #[serde(default = "default_max_planning_tokens")]
    pub max_planning_tokens: u64,
    /// Classifier confidence below which a task is flagged `low_confidence`.
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
const fn default_llm_timeout_secs() -> u64 {
    60
}
const fn default_llm_max_retries() -> u32 {
    3
}
const fn default_llm_initial_backoff_ms() -> u64 {
    500
}
const fn default_llm_max_backoff_ms() -> u64 {
    30_000
}
const fn default_llm_requests_per_minute() -> f64 {
    60.0
}
const fn default_max_planning_steps() -> u32 {
    12
}
const fn default_max_planning_tokens() -> u64 {
    100_000
}
const fn default_low_confidence_threshold() -> f64 {
    0.55
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            initial_backoff_ms: default_llm_initial_backoff_ms(),
            max_backoff_ms: default_llm_max_backoff_ms(),
            requests_per_minute: default_llm_requests_per_minute(),
            max_planning_steps: default_max_planning_steps(),
            max_planning_tokens: default_max_planning_tokens(),
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

/// Executor (C7) concurrency and failure-tolerance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    #[serde(default = "default_max_concurrent_assets")]
    pub max_concurrent_assets: usize,
    #[serde(default = "default_tool_retry_attempts")]
    pub tool_retry_attempts: u32,
    #[serde(default = "default_tool_retry_initial_backoff_ms")]
    pub tool_retry_initial_backoff_ms: u64,
    #[serde(default = "default_tool_retry_max_backoff_ms")]
    pub tool_retry_max_backoff_ms: u64,
    /// Default fraction of a phase's assets allowed to fail before the
    /// phase is considered failed, when a plan doesn't specify its own.
    #[serde(default = "default_max_failure_fraction")]
    pub default_max_failure_fraction: f64,
}

const fn default_max_concurrent_assets() -> usize {
    10
}
const fn default_tool_retry_attempts() -> u32 {
    3
}
const fn default_tool_retry_initial_backoff_ms() -> u64 {
    250
}
const fn default_tool_retry_max_backoff_ms() -> u64 {
    10_000
}
const fn default_max_failure_fraction() -> f64 {
    0.1
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_assets: default_max_concurrent_assets(),
            tool_retry_attempts: default_tool_retry_attempts(),
            tool_retry_initial_backoff_ms: default_tool_retry_initial_backoff_ms(),
            tool_retry_max_backoff_ms: default_tool_retry_max_backoff_ms(),
            default_max_failure_fraction: default_max_failure_fraction(),
        }
    }
}

/// Selects which Durability Adapter (C8) implementation backs execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// In-process fallback: scans the store at boot for non-terminal
    /// executions and resumes them (at-least-once).
    InProcess,
    /// Delegates durable orchestration to an external workflow engine.
    Durable,
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::InProcess
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DurabilityConfig {
    #[serde(default)]
    pub mode: DurabilityMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<String>,
    #[serde(default = "default_recovery_scan_interval_secs")]
    pub recovery_scan_interval_secs: u64,
}

const fn default_recovery_scan_interval_secs() -> u64 {
    30
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            mode: DurabilityMode::default(),
            remote_endpoint: None,
            recovery_scan_interval_secs: default_recovery_scan_interval_secs(),
        }
    }
}

/// One row of the HITL policy table (spec §4.3 step 3): whether a given
/// `(task_type, risk_level, environment)` combination requires human
/// approval, and whether it requires two distinct approvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub task_type: TaskType,
    pub min_risk_level: RiskLevel,
    pub environment: TargetEnvironment,
    pub hitl_required: bool,
    pub dual_signer_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Applied when no rule matches: fail closed (require HITL).
    #[serde(default = "default_true")]
    pub default_hitl_required: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules: default_policy_rules(),
            default_hitl_required: true,
        }
    }
}

fn default_policy_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            task_type: TaskType::Drift,
            min_risk_level: RiskLevel::Low,
            environment: TargetEnvironment::Dev,
            hitl_required: false,
            dual_signer_required: false,
        },
        PolicyRule {
            task_type: TaskType::Patch,
            min_risk_level: RiskLevel::High,
            environment: TargetEnvironment::Prod,
            hitl_required: true,
            dual_signer_required: true,
        },
        PolicyRule {
            task_type: TaskType::Security,
            min_risk_level: RiskLevel::Critical,
            environment: TargetEnvironment::Prod,
            hitl_required: true,
            dual_signer_required: true,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Additional field names treated as secrets and scrubbed before
    /// tool parameters/results are logged or persisted as audit rows.
    #[serde(default)]
    pub extra_secret_fields: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
            retention_days: default_retention_days(),
            extra_secret_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_http_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Find the most specific matching rule for a `(task_type, risk_level,
    /// environment)` combination. A rule matches when its task type and
    /// environment are exact and the task's risk level is at or above the
    /// rule's `min_risk_level`.
    pub fn resolve(
        &self,
        task_type: TaskType,
        risk_level: RiskLevel,
        environment: TargetEnvironment,
    ) -> (bool, bool) {
        self.rules
            .iter()
            .filter(|r| r.task_type == task_type && r.environment == environment)
            .filter(|r| risk_level >= r.min_risk_level)
            .max_by_key(|r| r.min_risk_level)
            .map_or((self.default_hitl_required, false), |r| {
                (r.hitl_required, r.dual_signer_required)
            })
    }
}

/// Placeholder for future per-agent model routing, kept here rather than
/// invented fresh: mirrors `abathur`'s `agent_mappings` concept but scoped
/// to task types instead of free-form agent-name patterns.
pub type AgentModelOverrides = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_resolve_falls_back_to_default_when_no_rule_matches() {
        let cfg = PolicyConfig {
            rules: vec![],
            default_hitl_required: true,
        };
        assert_eq!(
            cfg.resolve(TaskType::Cost, RiskLevel::Low, TargetEnvironment::Dev),
            (true, false)
        );
    }

    #[test]
    fn policy_resolve_picks_highest_matching_risk_rule() {
        let cfg = PolicyConfig::default();
        let (hitl, dual) = cfg.resolve(TaskType::Patch, RiskLevel::Critical, TargetEnvironment::Prod);
        assert!(hitl);
        assert!(dual);
    }

    #[test]
    fn policy_resolve_does_not_match_lower_risk_than_rule_requires() {
        let cfg = PolicyConfig::default();
        let (hitl, _) = cfg.resolve(TaskType::Patch, RiskLevel::Low, TargetEnvironment::Prod);
        assert!(hitl); // falls back to default_hitl_required, still true
    }
}
