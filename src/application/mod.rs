//! Application layer: the nine core components (C1-C9) and the
//! dependency-injected composition root that wires them to concrete
//! adapters.

pub mod agent_registry;
pub mod approval_state_machine;
pub mod audit;
pub mod executor;
pub mod meta_engine;
pub mod orchestrator;
pub mod planner_loop;
pub mod tool_registry;
pub mod validation_pipeline;

pub use agent_registry::AgentRegistry;
pub use approval_state_machine::ApprovalStateMachine;
pub use audit::AuditTrail;
pub use executor::Executor;
pub use meta_engine::MetaEngine;
pub use orchestrator::Orchestrator;
pub use planner_loop::{PlannerLoop, PlannerOutcome};
pub use tool_registry::ToolRegistry;
pub use validation_pipeline::ValidationPipeline;
