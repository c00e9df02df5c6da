//! Meta-Engine (C3): classifies a raw intent into a [`TaskSpec`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::models::{PolicyConfig, RiskLevel, TargetEnvironment, TaskSpec, TaskType};
use crate::domain::ports::{ChatMessage, ChatRole, CompletionParameters, CompletionRequest, LlmProvider};

const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Heuristic keyword lexicon, one entry per task type. Checked in order;
/// the first match with the highest hit count wins.
fn heuristic_lexicon() -> Vec<(TaskType, &'static [&'static str])> {
    vec![
        (TaskType::Patch, &["patch", "cve", "vulnerability", "update package"]),
        (TaskType::Drift, &["drift", "out of compliance", "configuration drift"]),
        (TaskType::Image, &["image", "ami", "golden image", "rebake"]),
        (TaskType::Compliance, &["compliance", "audit", "policy violation"]),
        (TaskType::Cost, &["cost", "spend", "rightsiz", "idle resource"]),
        (TaskType::Dr, &["disaster recovery", "failover", "dr drill"]),
        (TaskType::Incident, &["incident", "outage", "down", "unresponsive"]),
        (TaskType::Security, &["security", "breach", "exploit", "malware"]),
    ]
}

fn heuristic_risk(intent: &str) -> RiskLevel {
    let lower = intent.to_lowercase();
    if lower.contains("critical") || lower.contains("emergency") {
        RiskLevel::Critical
    } else if lower.contains("urgent") || lower.contains("high risk") {
        RiskLevel::High
    } else if lower.contains("low risk") || lower.contains("routine") {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

fn heuristic_environment(intent: &str, hint: Option<TargetEnvironment>) -> TargetEnvironment {
    if let Some(hint) = hint {
        return hint;
    }
    let lower = intent.to_lowercase();
    if lower.contains("prod") {
        TargetEnvironment::Prod
    } else if lower.contains("staging") || lower.contains("stage") {
        TargetEnvironment::Staging
    } else if lower.contains("dev") {
        TargetEnvironment::Dev
    } else {
        TargetEnvironment::All
    }
}

struct HeuristicClassification {
    task_type: TaskType,
    risk_level: RiskLevel,
    environment: TargetEnvironment,
    confidence: f64,
}

fn classify_heuristically(intent: &str, environment_hint: Option<TargetEnvironment>) -> HeuristicClassification {
    let lower = intent.to_lowercase();
    let mut best: Option<(TaskType, usize)> = None;
    for (task_type, keywords) in heuristic_lexicon() {
        let hits = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if hits > 0 && best.is_none_or(|(_, best_hits)| hits > best_hits) {
            best = Some((task_type, hits));
        }
    }

    let (task_type, hits) = best.unwrap_or((TaskType::Incident, 0));
    // One keyword hit is a weak signal; scale confidence with the number of
    // distinct keyword hits, capped well under certainty.
    let confidence = if hits == 0 { 0.3 } else { (0.5 + 0.15 * hits as f64).min(0.95) };

    HeuristicClassification {
        task_type,
        risk_level: heuristic_risk(intent),
        environment: heuristic_environment(intent, environment_hint),
        confidence,
    }
}

#[derive(Debug, Deserialize)]
struct LlmClassification {
    task_type: String,
    risk_level: String,
    environment: String,
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
}

fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["task_type", "risk_level", "environment", "confidence"],
        "properties": {
            "task_type": {"type": "string"},
            "risk_level": {"type": "string"},
            "environment": {"type": "string"},
            "hitl_required": {"type": "boolean"},
            "confidence": {"type": "number"},
            "rationale": {"type": "string"}
        }
    })
}

pub struct MetaEngine {
    llm: Arc<dyn LlmProvider>,
    policy: PolicyConfig,
}

impl MetaEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, policy: PolicyConfig) -> Self {
        Self { llm, policy }
    }

    pub async fn classify(
        &self,
        raw_intent: &str,
        user_id: &str,
        environment_hint: Option<TargetEnvironment>,
        context: HashMap<String, serde_json::Value>,
    ) -> TaskSpec {
        let heuristic = classify_heuristically(raw_intent, environment_hint);

        let (task_type, risk_level, environment, confidence, low_confidence, rationale) =
            if heuristic.confidence >= CONFIDENCE_THRESHOLD {
                (heuristic.task_type, heuristic.risk_level, heuristic.environment, heuristic.confidence, false, None)
            } else {
                match self.classify_with_llm(raw_intent, &classification_schema()).await {
                    Some(llm) => (
                        llm.task_type.unwrap_or(heuristic.task_type),
                        llm.risk_level.unwrap_or(heuristic.risk_level),
                        llm.environment.unwrap_or(heuristic.environment),
                        llm.confidence,
                        false,
                        llm.rationale,
                    ),
                    // ClassifierUnavailable (spec §4.3): fall back to the
                    // heuristic even below threshold, flagging low confidence.
                    None => (heuristic.task_type, heuristic.risk_level, heuristic.environment, heuristic.confidence, true, None),
                }
            };

        let (hitl_required, policy_dual_signer) = self.policy.resolve(task_type, risk_level, environment);
        let dual_signer_required = policy_dual_signer
            || (environment == TargetEnvironment::Prod
                && matches!(risk_level, RiskLevel::High | RiskLevel::Critical)
                && task_type.is_destructive_class());

        TaskSpec {
            task_type,
            risk_level,
            environment,
            hitl_required,
            dual_signer_required,
            user_id: user_id.to_string(),
            context,
            confidence,
            low_confidence,
            rationale,
        }
    }

    async fn classify_with_llm(&self, raw_intent: &str, schema: &serde_json::Value) -> Option<ParsedLlmClassification> {
        let request = CompletionRequest {
            system_prompt: "Classify the operator intent into a structured task spec.".to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: format!("Intent: {raw_intent}\n\nRespond with JSON matching: {schema}"),
                tool_calls: Vec::new(),
            }],
            tools: Vec::new(),
            parameters: CompletionParameters { max_tokens: Some(512), ..CompletionParameters::default() },
        };

        let response = self.llm.complete(request).await.ok()?;
        let parsed: LlmClassification = serde_json::from_str(&response.content).ok()?;

        Some(ParsedLlmClassification {
            task_type: TaskType::from_str(&parsed.task_type),
            risk_level: RiskLevel::from_str(&parsed.risk_level),
            environment: TargetEnvironment::from_str(&parsed.environment),
            confidence: parsed.confidence,
            rationale: parsed.rationale,
        })
    }
}

struct ParsedLlmClassification {
    task_type: Option<TaskType>,
    risk_level: Option<RiskLevel>,
    environment: Option<TargetEnvironment>,
    confidence: f64,
    rationale: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::{MockLlmProvider, MockResponse};

    fn engine(llm: Arc<dyn LlmProvider>) -> MetaEngine {
        MetaEngine::new(llm, PolicyConfig::default())
    }

    #[tokio::test]
    async fn strong_heuristic_match_skips_llm() {
        let llm = Arc::new(MockLlmProvider::new(vec![MockResponse::text("unused")]));
        let spec = engine(llm.clone())
            .classify("apply the CVE patch to production web servers", "u1", None, HashMap::new())
            .await;
        assert_eq!(spec.task_type, TaskType::Patch);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn weak_heuristic_falls_back_to_llm() {
        let llm = Arc::new(MockLlmProvider::new(vec![MockResponse::text(
            r#"{"task_type": "drift", "risk_level": "medium", "environment": "staging", "confidence": 0.9}"#,
        )]));
        let spec = engine(llm.clone()).classify("do the thing", "u1", None, HashMap::new()).await;
        assert_eq!(spec.task_type, TaskType::Drift);
        assert!(!spec.low_confidence);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn llm_unavailable_falls_back_to_low_confidence_heuristic() {
        let llm = Arc::new(MockLlmProvider::unavailable());
        let spec = engine(llm).classify("do the thing", "u1", None, HashMap::new()).await;
        assert!(spec.low_confidence);
    }

    #[tokio::test]
    async fn prod_critical_destructive_requires_dual_signer() {
        let llm = Arc::new(MockLlmProvider::new(vec![MockResponse::text("unused")]));
        let spec = engine(llm)
            .classify("patch CVE-2024-3094 critical emergency on prod fleet", "u1", None, HashMap::new())
            .await;
        assert_eq!(spec.environment, TargetEnvironment::Prod);
        assert_eq!(spec.risk_level, RiskLevel::Critical);
        assert!(spec.dual_signer_required);
        assert!(spec.hitl_required);
    }
}
