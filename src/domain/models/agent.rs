//! Agent domain model: the Agent Registry's (C2) catalog of agent
//! definitions, each bound to one [`crate::domain::models::task::TaskType`].

use serde::{Deserialize, Serialize};

use super::task::TaskType;

/// A registered agent's static configuration. The Agent Registry (C2) picks
/// the highest-priority definition whose `task_type` matches a task's spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub task_type: TaskType,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    /// JSON Schema the planner loop validates each produced plan's phases
    /// against before it ever reaches the Validation Pipeline (C5).
    pub plan_schema: serde_json::Value,
    pub min_quality_threshold: u8,
    /// When multiple definitions match the same task type, the highest
    /// priority wins; ties broken by registration order.
    pub priority: i32,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, task_type: TaskType, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type,
            system_prompt: system_prompt.into(),
            allowed_tools: Vec::new(),
            plan_schema: serde_json::json!({"type": "object"}),
            min_quality_threshold: 40,
            priority: 0,
        }
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_plan_schema(mut self, schema: serde_json::Value) -> Self {
        self.plan_schema = schema;
        self
    }

    pub fn with_min_quality_threshold(mut self, threshold: u8) -> Self {
        self.min_quality_threshold = threshold;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_definition_allows_registered_tools_only() {
        let def = AgentDefinition::new("patcher", TaskType::Patch, "You patch fleets.")
            .with_allowed_tools(vec!["ssm_patch".into(), "query_assets".into()]);
        assert!(def.allows_tool("ssm_patch"));
        assert!(!def.allows_tool("k8s_rollout"));
    }

    #[test]
    fn builder_sets_quality_threshold_and_priority() {
        let def = AgentDefinition::new("patcher", TaskType::Patch, "prompt")
            .with_min_quality_threshold(80)
            .with_priority(5);
        assert_eq!(def.min_quality_threshold, 80);
        assert_eq!(def.priority, 5);
    }
}
