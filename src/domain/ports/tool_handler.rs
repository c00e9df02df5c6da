//! Tool handler port (C1).
//!
//! The Tool Registry stores a `ToolDescriptor` alongside a handler
//! implementing this trait; `invoke()` dispatches to it once schema
//! validation, timeout and rate-limit enforcement have already passed.
//! Handlers live in the adapters layer (one per cloud backend) so the
//! domain and application layers never know concrete provider SDKs.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolContext {
    pub org_id: String,
    pub task_id: uuid::Uuid,
    /// When set, destructive handlers MUST refuse to perform the mutating
    /// effect and instead return a simulated result (spec §4.1).
    pub dry_run: bool,
    /// Idempotency key `(task_id, step_id)` — handlers must treat repeated
    /// calls with the same key as a no-op against observable effects.
    pub step_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolHandlerError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("refused: destructive tool called with dry_run set")]
    DryRunRefused,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("timeout after {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolHandlerError>;
}
