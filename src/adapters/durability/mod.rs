//! `DurabilityAdapter` implementations (C8): an in-process fallback backed
//! by the execution store's own boot-time recovery scan, and a facade over
//! an external durable-workflow engine.

mod in_process;
mod remote_workflow;

pub use in_process::InProcessDurabilityAdapter;
pub use remote_workflow::{RemoteWorkflowAdapter, RemoteWorkflowConfig};
