//! Agent Registry (C2): the catalog of agent definitions the Meta-Engine
//! dispatches a classified task to.

use std::collections::HashMap;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{AgentDefinition, TaskType};

/// In-memory catalog, loaded once at boot from configuration. Agents are
/// static per deployment; there is no write path at runtime.
pub struct AgentRegistry {
    by_task_type: HashMap<TaskType, Vec<AgentDefinition>>,
}

impl AgentRegistry {
    pub fn new(definitions: Vec<AgentDefinition>) -> Self {
        let mut by_task_type: HashMap<TaskType, Vec<AgentDefinition>> = HashMap::new();
        for def in definitions {
            by_task_type.entry(def.task_type).or_default().push(def);
        }
        for defs in by_task_type.values_mut() {
            defs.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        Self { by_task_type }
    }

    /// Picks the highest-priority agent registered for `task_type`, ties
    /// broken by registration order (stable sort preserves it).
    pub fn pick(&self, task_type: TaskType) -> Result<&AgentDefinition, OrchestratorError> {
        self.by_task_type
            .get(&task_type)
            .and_then(|defs| defs.first())
            .ok_or_else(|| OrchestratorError::InputInvalid(format!("no agent registered for task type {}", task_type.as_str())))
    }

    pub fn list(&self) -> Vec<&AgentDefinition> {
        self.by_task_type.values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_priority_definition_for_task_type() {
        let registry = AgentRegistry::new(vec![
            AgentDefinition::new("low", TaskType::Patch, "low prompt").with_priority(1),
            AgentDefinition::new("high", TaskType::Patch, "high prompt").with_priority(10),
        ]);
        assert_eq!(registry.pick(TaskType::Patch).unwrap().name, "high");
    }

    #[test]
    fn ties_break_on_registration_order() {
        let registry = AgentRegistry::new(vec![
            AgentDefinition::new("first", TaskType::Drift, "p").with_priority(5),
            AgentDefinition::new("second", TaskType::Drift, "p").with_priority(5),
        ]);
        assert_eq!(registry.pick(TaskType::Drift).unwrap().name, "first");
    }

    #[test]
    fn unknown_task_type_is_input_invalid() {
        let registry = AgentRegistry::new(vec![AgentDefinition::new("a", TaskType::Patch, "p")]);
        assert!(matches!(registry.pick(TaskType::Image), Err(OrchestratorError::InputInvalid(_))));
    }
}
