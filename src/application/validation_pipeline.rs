//! Validation Pipeline (C5): structural, policy, and quality-score gating
//! for a drafted plan.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::tools::AssetInventory;
use crate::application::tool_registry::ToolRegistry;
use crate::domain::models::{
    AgentDefinition, Dimension, EnvironmentTier, Phase, Plan, QualityScore, RiskLevel, SafetyClass, Selector, TargetEnvironment, TaskSpec,
};
use crate::domain::ports::{TaskFilter, TaskRepository};

/// How much human attention this plan (or a close antecedent) has already
/// received, feeding the "human review" quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanReviewState {
    NotReviewed,
    Viewed,
    ReviewedAndModified,
}

const OPERATIONAL_HISTORY_WINDOW: usize = 20;
/// Fraction of the fleet a destructive phase may target before dual-signer
/// approval becomes mandatory regardless of policy configuration (spec
/// §4.5 stage 2 example rule).
const DESTRUCTIVE_FLEET_FRACTION_THRESHOLD: f64 = 0.10;

pub struct ValidationOutcome {
    pub valid: bool,
    pub reasons: Vec<String>,
    pub quality_score: QualityScore,
    pub allowed_environments: Vec<EnvironmentTier>,
    pub requires_approval: bool,
}

pub struct ValidationPipeline {
    asset_inventory: Arc<dyn AssetInventory>,
    tool_registry: Arc<ToolRegistry>,
    tasks: Arc<dyn TaskRepository>,
}

impl ValidationPipeline {
    pub fn new(asset_inventory: Arc<dyn AssetInventory>, tool_registry: Arc<ToolRegistry>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self { asset_inventory, tool_registry, tasks }
    }

    pub async fn validate(&self, plan: &Plan, agent: &AgentDefinition, task_spec: &TaskSpec, human_review: HumanReviewState) -> ValidationOutcome {
        let mut reasons = Vec::new();

        let structural = self.run_structural_stage(plan, agent, &mut reasons);
        let policy = self.run_policy_stage(plan, task_spec, &mut reasons);

        let structural_dimension = Dimension::new((structural.fraction() * f64::from(Dimension::MAX)).round() as u8);
        let policy_dimension = Dimension::new((policy.fraction() * f64::from(Dimension::MAX)).round() as u8);
        let test_coverage_dimension = Dimension::new((test_coverage_fraction(plan) * f64::from(Dimension::MAX)).round() as u8);
        let operational_history_dimension = self.operational_history_dimension(&plan.org_id, task_spec).await;
        let human_review_dimension = Dimension::new(match human_review {
            HumanReviewState::ReviewedAndModified => 20,
            HumanReviewState::Viewed => 10,
            HumanReviewState::NotReviewed => 0,
        });

        let quality_score = QualityScore {
            structural: structural_dimension,
            policy: policy_dimension,
            test_coverage: test_coverage_dimension,
            operational_history: operational_history_dimension,
            human_review: human_review_dimension,
        };

        let allowed_environments = tiers_up_to(quality_score.highest_clearable_tier());
        let clears_task_environment = quality_score.clears(required_tier(task_spec.environment));
        let requires_approval = !clears_task_environment || task_spec.dual_signer_required || task_spec.risk_level >= RiskLevel::High;

        ValidationOutcome {
            valid: structural.all_passed() && policy.all_passed(),
            reasons,
            quality_score,
            allowed_environments,
            requires_approval,
        }
    }

    fn run_structural_stage(&self, plan: &Plan, agent: &AgentDefinition, reasons: &mut Vec<String>) -> StageResult {
        let mut result = StageResult::default();

        let plan_payload = serde_json::json!({"phases": plan.phases});
        result.check("plan matches agent schema", || {
            jsonschema::validator_for(&agent.plan_schema).is_ok_and(|v| v.is_valid(&plan_payload))
        });

        if plan.phases.is_empty() {
            result.fail("plan has no phases");
        }

        for phase in &plan.phases {
            result.check(format!("phase '{}' wait_time parses", phase.name), || phase.parse_wait_time().is_some());
            result.check(format!("phase '{}' has at least one target", phase.name), || phase_has_target(phase));
            if let Selector::AssetIds(ids) = &phase.selector {
                let all = self.asset_inventory.query(&[], &[], &[], &HashMap::new(), &[]);
                result.check(format!("phase '{}' asset IDs exist", phase.name), || {
                    ids.iter().all(|id| all.iter().any(|a| &a.id == id))
                });
            }
        }

        reasons.extend(result.failures.clone());
        result
    }

    fn run_policy_stage(&self, plan: &Plan, task_spec: &TaskSpec, reasons: &mut Vec<String>) -> StageResult {
        let mut result = StageResult::default();
        let total_fleet = self.asset_inventory.query(&[], &[], &[], &HashMap::new(), &[]).len().max(1);

        for phase in &plan.phases {
            if task_spec.environment == TargetEnvironment::Prod {
                result.check(format!("phase '{}' has a health check in prod", phase.name), || phase.health_check.is_some());
            }

            let safety_class = self.tool_registry.list(Default::default()).into_iter().find(|d| d.name == phase.tool_name).map(|d| d.safety_class);
            if safety_class == Some(SafetyClass::Destructive) {
                let targeted = phase_target_count(phase);
                let fraction = targeted as f64 / total_fleet as f64;
                if fraction > DESTRUCTIVE_FLEET_FRACTION_THRESHOLD {
                    result.check(format!("phase '{}' destructive fleet-fraction requires dual approval", phase.name), || {
                        task_spec.dual_signer_required
                    });
                }
            }
        }

        reasons.extend(result.failures.clone());
        result
    }

    async fn operational_history_dimension(&self, org_id: &str, task_spec: &TaskSpec) -> Dimension {
        let Ok(mut tasks) = self
            .tasks
            .list(org_id, TaskFilter { state: None, created_by: None, limit: Some(200), offset: None })
            .await
        else {
            return Dimension::new(10);
        };

        tasks.retain(|t| t.task_spec.task_type == task_spec.task_type && t.is_terminal());
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(OPERATIONAL_HISTORY_WINDOW);

        if tasks.is_empty() {
            return Dimension::new(10);
        }

        let successes = tasks.iter().filter(|t| t.state == crate::domain::models::task::TaskState::Completed).count();
        let rate = successes as f64 / tasks.len() as f64;
        Dimension::new((rate * f64::from(Dimension::MAX)).round() as u8)
    }
}

#[derive(Default)]
struct StageResult {
    total: u32,
    passed: u32,
    failures: Vec<String>,
}

impl StageResult {
    fn check(&mut self, label: impl Into<String>, predicate: impl FnOnce() -> bool) {
        self.total += 1;
        if predicate() {
            self.passed += 1;
        } else {
            self.failures.push(label.into());
        }
    }

    fn fail(&mut self, label: impl Into<String>) {
        self.total += 1;
        self.failures.push(label.into());
    }

    fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            f64::from(self.passed) / f64::from(self.total)
        }
    }

    fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

fn phase_has_target(phase: &Phase) -> bool {
    match &phase.selector {
        Selector::AssetIds(ids) => !ids.is_empty(),
        Selector::Criteria { platforms, regions, environments, tags, .. } => {
            !platforms.is_empty() || !regions.is_empty() || !environments.is_empty() || !tags.is_empty()
        }
    }
}

fn phase_target_count(phase: &Phase) -> usize {
    match &phase.selector {
        Selector::AssetIds(ids) => ids.len(),
        Selector::Criteria { .. } => 0,
    }
}

fn test_coverage_fraction(plan: &Plan) -> f64 {
    if plan.phases.is_empty() {
        return 0.0;
    }
    let covered = plan.phases.iter().filter(|p| p.rollback_if.is_some() && p.health_check.is_some()).count();
    covered as f64 / plan.phases.len() as f64
}

fn tiers_up_to(tier: Option<EnvironmentTier>) -> Vec<EnvironmentTier> {
    let Some(tier) = tier else { return Vec::new() };
    let mut tiers = vec![EnvironmentTier::Dev];
    if tier >= EnvironmentTier::Staging {
        tiers.push(EnvironmentTier::Staging);
    }
    if tier >= EnvironmentTier::Prod {
        tiers.push(EnvironmentTier::Prod);
    }
    if tier >= EnvironmentTier::ProdBulk {
        tiers.push(EnvironmentTier::ProdBulk);
    }
    tiers
}

/// Maps a task's target environment to the tier a plan must clear. Plans
/// with no environment-specific tier distinction (`all`) are held to the
/// `prod` bar, the strictest concrete tier this model distinguishes.
fn required_tier(environment: TargetEnvironment) -> EnvironmentTier {
    match environment {
        TargetEnvironment::Dev => EnvironmentTier::Dev,
        TargetEnvironment::Staging => EnvironmentTier::Staging,
        TargetEnvironment::Prod | TargetEnvironment::All => EnvironmentTier::Prod,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository, SqliteToolInvocationRepository};
    use crate::adapters::tools::{builtin_tool_descriptors, AssetRecord, InMemoryAssetInventory, QueryAssetsHandler};
    use crate::domain::models::{HealthCheckSpec, RollbackScope, RollbackStrategy, TaskType};
    use uuid::Uuid;

    fn phase(name: &str, tool: &str, ids: Vec<&str>) -> Phase {
        Phase {
            name: name.to_string(),
            selector: Selector::AssetIds(ids.into_iter().map(str::to_string).collect()),
            tool_name: tool.to_string(),
            tool_arguments: serde_json::json!({}),
            wait_time: "PT5M".to_string(),
            health_check: Some(HealthCheckSpec { check_type: "http".into(), timeout_secs: 60, poll_interval_secs: 5 }),
            rollback_if: Some("error_rate>5".into()),
            rollback_strategy: RollbackStrategy::Snapshot,
            rollback_scope: RollbackScope::Phase,
            max_failure_fraction: 0.1,
        }
    }

    fn task_spec(environment: TargetEnvironment, dual_signer: bool, risk: RiskLevel) -> TaskSpec {
        TaskSpec {
            task_type: TaskType::Patch,
            risk_level: risk,
            environment,
            hitl_required: true,
            dual_signer_required: dual_signer,
            user_id: "u1".to_string(),
            context: HashMap::new(),
            confidence: 0.95,
            low_confidence: false,
            rationale: None,
        }
    }

    async fn pipeline() -> (ValidationPipeline, Arc<InMemoryAssetInventory>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let inventory = Arc::new(InMemoryAssetInventory::new());
        inventory.seed(vec![AssetRecord {
            id: "asset-1".into(),
            platform: "aws".into(),
            region: "us-east-1".into(),
            environment: "prod".into(),
            tags: HashMap::new(),
        }]);
        let registry = Arc::new(ToolRegistry::new(Arc::new(SqliteToolInvocationRepository::new(pool.clone()))));
        for descriptor in builtin_tool_descriptors() {
            let name = descriptor.name.clone();
            let handler: Arc<dyn crate::domain::ports::ToolHandler> = match name.as_str() {
                "query_assets" => Arc::new(QueryAssetsHandler::new(inventory.clone())),
                _ => Arc::new(NoopHandler),
            };
            registry.register(descriptor, handler).unwrap();
        }
        let tasks = Arc::new(SqliteTaskRepository::new(pool));
        (ValidationPipeline::new(inventory.clone(), registry, tasks), inventory)
    }

    struct NoopHandler;

    #[async_trait::async_trait]
    impl crate::domain::ports::ToolHandler for NoopHandler {
        async fn invoke(
            &self,
            arguments: serde_json::Value,
            _ctx: &crate::domain::ports::ToolContext,
        ) -> Result<serde_json::Value, crate::domain::ports::ToolHandlerError> {
            Ok(arguments)
        }
    }

    fn agent() -> AgentDefinition {
        AgentDefinition::new("patcher", TaskType::Patch, "patch prompt")
    }

    #[tokio::test]
    async fn valid_plan_scores_and_clears_staging() {
        let (pipeline, _inv) = pipeline().await;
        let plan = Plan::new(Uuid::new_v4(), "org-1", vec![phase("roll", "ssm_patch", vec!["asset-1"])], false);
        let spec = task_spec(TargetEnvironment::Staging, false, RiskLevel::Low);
        let outcome = pipeline.validate(&plan, &agent(), &spec, HumanReviewState::ReviewedAndModified).await;
        assert!(outcome.valid, "{:?}", outcome.reasons);
        assert!(outcome.allowed_environments.contains(&EnvironmentTier::Staging));
    }

    #[tokio::test]
    async fn missing_asset_id_fails_structural_stage() {
        let (pipeline, _inv) = pipeline().await;
        let plan = Plan::new(Uuid::new_v4(), "org-1", vec![phase("roll", "ssm_patch", vec!["ghost-asset"])], false);
        let spec = task_spec(TargetEnvironment::Staging, false, RiskLevel::Low);
        let outcome = pipeline.validate(&plan, &agent(), &spec, HumanReviewState::NotReviewed).await;
        assert!(!outcome.valid);
    }

    #[tokio::test]
    async fn prod_phase_without_health_check_fails_policy_stage() {
        let (pipeline, _inv) = pipeline().await;
        let mut bare = phase("roll", "ssm_patch", vec!["asset-1"]);
        bare.health_check = None;
        let plan = Plan::new(Uuid::new_v4(), "org-1", vec![bare], false);
        let spec = task_spec(TargetEnvironment::Prod, false, RiskLevel::Medium);
        let outcome = pipeline.validate(&plan, &agent(), &spec, HumanReviewState::NotReviewed).await;
        assert!(!outcome.valid);
    }

    #[tokio::test]
    async fn high_risk_always_requires_approval() {
        let (pipeline, _inv) = pipeline().await;
        let plan = Plan::new(Uuid::new_v4(), "org-1", vec![phase("roll", "ssm_patch", vec!["asset-1"])], false);
        let spec = task_spec(TargetEnvironment::Dev, false, RiskLevel::High);
        let outcome = pipeline.validate(&plan, &agent(), &spec, HumanReviewState::ReviewedAndModified).await;
        assert!(outcome.requires_approval);
    }
}
