//! Durability Adapter port (C8).
//!
//! A uniform interface over "whatever makes executions survive a process
//! restart": either an external durable-workflow engine, or this crate's
//! in-process fallback that re-scans the execution store at boot. The
//! Executor (C7) talks only to this trait; it never knows which backend it
//! is running against.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DurabilityError {
    #[error("workflow engine unavailable: {0}")]
    Unavailable(String),
    #[error("workflow {0} not found")]
    NotFound(Uuid),
    #[error("durability backend lost track of workflow {0}: {1}")]
    Lost(Uuid, String),
}

/// A durable handle the Durability Adapter hands back when execution of a
/// plan begins. Opaque to callers; used only to check in on progress or
/// request cancellation through the same backend that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowHandle(pub Uuid);

/// Coarse status `describe` reports back for a workflow, independent of
/// which backend is tracking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Unknown,
}

/// Uniform facade over a durable-workflow engine, with an in-process
/// fallback (spec §4.8): `start`, `signal`, `cancel`, `describe`. Feature
/// parity is required across both back-ends so the application layer never
/// has to know which one it's talking to.
#[async_trait]
pub trait DurabilityAdapter: Send + Sync {
    /// Register that execution of `execution_id` has begun. Implementations
    /// that back onto an external engine start a durable workflow run here;
    /// the in-process fallback just records the execution as trackable.
    async fn start(&self, execution_id: Uuid) -> Result<WorkflowHandle, DurabilityError>;

    /// Signal that progress has been made (used as a heartbeat/checkpoint
    /// by backends that need one).
    async fn checkpoint(&self, handle: WorkflowHandle) -> Result<(), DurabilityError>;

    /// Deliver a named signal (e.g. `pause`, `resume`) with an arbitrary
    /// payload to the running workflow. This is the only durable-mode path
    /// for pause/resume to reach a workflow recovered after a restart, since
    /// the in-process `ExecutionControl` it started with does not survive
    /// one.
    async fn signal(&self, handle: WorkflowHandle, name: &str, payload: Value) -> Result<(), DurabilityError>;

    async fn cancel(&self, handle: WorkflowHandle) -> Result<(), DurabilityError>;

    /// Report the workflow's current status as the backend understands it.
    async fn describe(&self, handle: WorkflowHandle) -> Result<WorkflowStatus, DurabilityError>;

    /// At-least-once recovery: return every execution this adapter believes
    /// is still in flight, called once at boot before serving new requests.
    async fn recover_in_flight(&self) -> Result<Vec<Uuid>, DurabilityError>;
}
