//! Planner Loop (C4): the bounded tool-calling loop that turns a
//! classified [`TaskSpec`] into a Plan's phases (spec §4.4).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{AgentDefinition, Phase, TaskSpec};
use crate::domain::ports::{
    ChatMessage, ChatRole, CompletionParameters, CompletionRequest, LlmProvider, RequestedToolCall, ToolContext,
};

use super::tool_registry::{ToolListFilter, ToolRegistry};

const MAX_STEPS: u32 = 12;
/// Total message-byte threshold above which older tool-result messages get
/// compacted to a deterministic summary (spec §4.4).
const COMPACTION_BYTE_THRESHOLD: usize = 32_000;
/// The most recent tool-result messages kept uncompacted, regardless of size.
const UNCOMPACTED_TOOL_RESULTS: usize = 3;

/// One turn of the planner's replay log: enough to reconstruct what the
/// loop saw and did without re-running the LLM.
#[derive(Debug, Clone)]
pub struct PlannerTurn {
    pub turn_index: u32,
    pub prompt_hash: String,
    pub tool_calls: Vec<RequestedToolCall>,
    pub tool_results: Vec<serde_json::Value>,
}

pub struct PlannerOutcome {
    pub phases: Vec<Phase>,
    pub replay_log: Vec<PlannerTurn>,
}

#[derive(Deserialize)]
struct PlanPayload {
    phases: Vec<Phase>,
}

fn hash_prompt(request: &CompletionRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.system_prompt.hash(&mut hasher);
    for message in &request.messages {
        message.content.hash(&mut hasher);
    }
    for tool in &request.tools {
        tool.name.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

fn is_tool_result_message(message: &ChatMessage) -> bool {
    matches!(message.role, ChatRole::User) && message.content.starts_with("tool result for ")
}

/// Compact all but the most recent [`UNCOMPACTED_TOOL_RESULTS`] tool-result
/// messages into a deterministic first/last-256-byte summary, once total
/// message bytes cross [`COMPACTION_BYTE_THRESHOLD`]. Assistant messages
/// (which may carry a plan draft) are never touched.
fn compact_messages(messages: &mut [ChatMessage]) {
    let total_bytes: usize = messages.iter().map(|m| m.content.len()).sum();
    if total_bytes <= COMPACTION_BYTE_THRESHOLD {
        return;
    }

    let tool_result_indices: Vec<usize> =
        messages.iter().enumerate().filter(|(_, m)| is_tool_result_message(m)).map(|(i, _)| i).collect();
    let keep_from = tool_result_indices.len().saturating_sub(UNCOMPACTED_TOOL_RESULTS);

    for idx in &tool_result_indices[..keep_from] {
        let content = &messages[*idx].content;
        if content.len() <= 600 {
            continue;
        }
        let head: String = content.chars().take(256).collect();
        let tail: String = content.chars().rev().take(256).collect::<Vec<_>>().into_iter().rev().collect();
        let omitted = content.len().saturating_sub(head.len() + tail.len());
        messages[*idx].content = format!("{head}...[{omitted} bytes omitted]...{tail}");
    }
}

pub struct PlannerLoop {
    llm: Arc<dyn LlmProvider>,
    tool_registry: Arc<ToolRegistry>,
    max_tokens: u64,
}

impl PlannerLoop {
    pub fn new(llm: Arc<dyn LlmProvider>, tool_registry: Arc<ToolRegistry>, max_tokens: u64) -> Self {
        Self { llm, tool_registry, max_tokens }
    }

    fn try_parse_plan(&self, content: &str, agent: &AgentDefinition) -> Option<Vec<Phase>> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;
        let validator = jsonschema::validator_for(&agent.plan_schema).ok()?;
        if !validator.is_valid(&value) {
            return None;
        }
        let payload: PlanPayload = serde_json::from_value(value).ok()?;
        Some(payload.phases)
    }

    pub async fn run(
        &self,
        agent: &AgentDefinition,
        task_spec: &TaskSpec,
        raw_intent: &str,
        org_id: &str,
        task_id: Uuid,
    ) -> Result<PlannerOutcome, OrchestratorError> {
        let tools = self.tool_registry.list(ToolListFilter { names: Some(agent.allowed_tools.clone()), ..Default::default() });

        let mut messages = vec![ChatMessage {
            role: ChatRole::User,
            content: format!(
                "Task intent: {raw_intent}\nClassification: {task_spec:?}\n\nCall tools to gather information, or respond with a final plan JSON matching: {}",
                agent.plan_schema
            ),
            tool_calls: Vec::new(),
        }];

        let mut replay_log = Vec::new();
        let mut tokens_used: u64 = 0;

        for turn_index in 0..MAX_STEPS {
            compact_messages(&mut messages);

            let request = CompletionRequest {
                system_prompt: agent.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                parameters: CompletionParameters::default(),
            };
            let prompt_hash = hash_prompt(&request);

            let response = self.llm.complete(request).await.map_err(|e| OrchestratorError::LlmUnavailable(e.to_string()))?;

            if response.tool_calls.is_empty() {
                if let Some(phases) = self.try_parse_plan(&response.content, agent) {
                    replay_log.push(PlannerTurn { turn_index, prompt_hash, tool_calls: Vec::new(), tool_results: Vec::new() });
                    return Ok(PlannerOutcome { phases, replay_log });
                }
                if let Some(usage) = &response.usage {
                    tokens_used += u64::from(usage.input_tokens) + u64::from(usage.output_tokens);
                }
                messages.push(ChatMessage { role: ChatRole::Assistant, content: response.content.clone(), tool_calls: Vec::new() });
                messages.push(ChatMessage {
                    role: ChatRole::User,
                    content: "emit a plan or call a tool".to_string(),
                    tool_calls: Vec::new(),
                });
                replay_log.push(PlannerTurn { turn_index, prompt_hash, tool_calls: Vec::new(), tool_results: Vec::new() });
                if tokens_used > self.max_tokens {
                    return Err(OrchestratorError::TokenBudgetExceeded { used: tokens_used, budget: self.max_tokens });
                }
                continue;
            }

            if let Some(usage) = &response.usage {
                tokens_used += u64::from(usage.input_tokens) + u64::from(usage.output_tokens);
            }

            let mut tool_results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                if !agent.allows_tool(&call.tool_name) {
                    return Err(OrchestratorError::ToolFailed {
                        tool: call.tool_name.clone(),
                        message: "tool not permitted for this agent".to_string(),
                    });
                }
                let ctx = ToolContext {
                    org_id: org_id.to_string(),
                    task_id,
                    dry_run: false,
                    step_id: format!("{task_id}:{turn_index}:{}", call.id),
                };
                // A failed tool call is itself input to the LLM (spec: the planner
                // loop absorbs tool failures, not its own exhaustion) — only a
                // permissions violation above short-circuits the loop.
                let result = match self.tool_registry.invoke(&call.tool_name, call.arguments.clone(), ctx, None, &agent.name).await {
                    Ok(value) => value,
                    Err(err) => serde_json::json!({"error": err.to_string()}),
                };
                tool_results.push(result);
            }

            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            });
            for (call, result) in response.tool_calls.iter().zip(tool_results.iter()) {
                messages.push(ChatMessage {
                    role: ChatRole::User,
                    content: format!("tool result for {}: {result}", call.tool_name),
                    tool_calls: Vec::new(),
                });
            }

            replay_log.push(PlannerTurn { turn_index, prompt_hash, tool_calls: response.tool_calls.clone(), tool_results });

            if tokens_used > self.max_tokens {
                return Err(OrchestratorError::TokenBudgetExceeded { used: tokens_used, budget: self.max_tokens });
            }
        }

        Err(OrchestratorError::PlannerDidNotConverge { steps: MAX_STEPS })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::{MockLlmProvider, MockResponse};
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteToolInvocationRepository};
    use crate::domain::models::{RiskLevel, TargetEnvironment, TaskType};
    use crate::domain::ports::{ToolHandler, ToolHandlerError};
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
            Ok(arguments)
        }
    }

    async fn registry() -> Arc<ToolRegistry> {
        let pool = create_migrated_test_pool().await.unwrap();
        let registry = ToolRegistry::new(Arc::new(SqliteToolInvocationRepository::new(pool)));
        registry
            .register(
                crate::domain::models::ToolDescriptor::new(
                    "query_assets",
                    "d",
                    serde_json::json!({"type": "object"}),
                    crate::domain::models::SafetyClass::ReadOnly,
                ),
                Arc::new(EchoHandler),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn agent() -> AgentDefinition {
        AgentDefinition::new("patcher", TaskType::Patch, "You patch fleets.")
            .with_allowed_tools(vec!["query_assets".to_string()])
            .with_plan_schema(serde_json::json!({"type": "object", "required": ["phases"]}))
    }

    fn task_spec() -> TaskSpec {
        TaskSpec {
            task_type: TaskType::Patch,
            risk_level: RiskLevel::Medium,
            environment: TargetEnvironment::Staging,
            hitl_required: false,
            dual_signer_required: false,
            user_id: "u1".to_string(),
            context: std::collections::HashMap::new(),
            confidence: 0.9,
            low_confidence: false,
            rationale: None,
        }
    }

    fn sample_phase() -> Phase {
        Phase {
            name: "p1".to_string(),
            selector: crate::domain::models::Selector::AssetIds(vec!["asset-1".to_string()]),
            tool_name: "ssm_patch".to_string(),
            tool_arguments: serde_json::json!({"asset_ids": ["asset-1"], "baseline_id": "b1"}),
            wait_time: "PT0S".to_string(),
            health_check: None,
            rollback_if: None,
            rollback_strategy: crate::domain::models::RollbackStrategy::Manual,
            rollback_scope: crate::domain::models::RollbackScope::Phase,
            max_failure_fraction: 0.1,
        }
    }

    #[tokio::test]
    async fn returns_phases_when_first_turn_emits_a_valid_plan() {
        let plan_json = serde_json::to_string(&serde_json::json!({"phases": [sample_phase()]})).unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec![MockResponse::text(plan_json)]));
        let tool_registry = registry().await;
        let planner = PlannerLoop::new(llm, tool_registry, 100_000);
        let outcome = planner.run(&agent(), &task_spec(), "patch things", "org-1", Uuid::new_v4()).await;
        assert!(outcome.is_ok(), "expected a converged plan, got {:?}", outcome.err());
    }

    #[tokio::test]
    async fn never_converging_fails_after_max_steps() {
        let responses: Vec<MockResponse> = (0..MAX_STEPS).map(|_| MockResponse::text("not a plan")).collect();
        let llm = Arc::new(MockLlmProvider::new(responses));
        let tool_registry = registry().await;
        let planner = PlannerLoop::new(llm, tool_registry, 100_000);
        let outcome = planner.run(&agent(), &task_spec(), "patch things", "org-1", Uuid::new_v4()).await;
        assert!(matches!(outcome, Err(OrchestratorError::PlannerDidNotConverge { steps: MAX_STEPS })));
    }

    struct FlakyHandler {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ToolHandler for FlakyHandler {
        async fn invoke(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<serde_json::Value, ToolHandlerError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                Err(ToolHandlerError::Upstream("transient upstream error".to_string()))
            } else {
                Ok(arguments)
            }
        }
    }

    #[tokio::test]
    async fn transient_tool_failure_is_fed_back_and_the_llm_retries() {
        let pool = create_migrated_test_pool().await.unwrap();
        let tool_registry = Arc::new(ToolRegistry::new(Arc::new(SqliteToolInvocationRepository::new(pool))));
        tool_registry
            .register(
                crate::domain::models::ToolDescriptor::new(
                    "query_assets",
                    "d",
                    serde_json::json!({"type": "object"}),
                    crate::domain::models::SafetyClass::ReadOnly,
                ),
                Arc::new(FlakyHandler { calls: std::sync::atomic::AtomicUsize::new(0) }),
            )
            .unwrap();

        let plan_json = serde_json::to_string(&serde_json::json!({"phases": [sample_phase()]})).unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec![
            MockResponse::tool_call("query_assets", serde_json::json!({"environment": "prod"})),
            MockResponse::tool_call("query_assets", serde_json::json!({"environment": "prod", "region": "us-east-1"})),
            MockResponse::text(plan_json),
        ]));
        let planner = PlannerLoop::new(llm, tool_registry.clone(), 100_000);
        let outcome = planner.run(&agent(), &task_spec(), "patch things", "org-1", Uuid::new_v4()).await;
        assert!(outcome.is_ok(), "expected the planner to absorb the failure and converge, got {:?}", outcome.err());

        let turns = outcome.unwrap().replay_log;
        let query_results: Vec<&serde_json::Value> =
            turns.iter().flat_map(|t| t.tool_results.iter()).collect();
        assert_eq!(query_results.len(), 2, "expected one failed and one successful query_assets invocation");
        assert!(query_results[0].get("error").is_some(), "first invocation should surface as a tool-visible error");
        assert!(query_results[1].get("error").is_none(), "second invocation should succeed");
    }

    #[tokio::test]
    async fn disallowed_tool_call_is_rejected() {
        let llm = Arc::new(MockLlmProvider::new(vec![MockResponse::tool_call("k8s_rollout", serde_json::json!({}))]));
        let tool_registry = registry().await;
        let planner = PlannerLoop::new(llm, tool_registry, 100_000);
        let outcome = planner.run(&agent(), &task_spec(), "patch things", "org-1", Uuid::new_v4()).await;
        assert!(matches!(outcome, Err(OrchestratorError::ToolFailed { .. })));
    }
}
