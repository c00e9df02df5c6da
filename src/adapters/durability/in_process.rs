//! In-process `DurabilityAdapter`: no external workflow engine, just the
//! execution store itself. Durability comes from the store being the
//! source of truth for in-flight work — `recover_in_flight` is the boot-time
//! scan the Executor (C7) calls before serving new requests, picking back
//! up any execution that was `running`/`pending`/`paused` when the process
//! last stopped.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::domain::models::ExecutionStatus;
use crate::domain::ports::{DurabilityAdapter, DurabilityError, ExecutionRepository, WorkflowHandle, WorkflowStatus};

pub struct InProcessDurabilityAdapter {
    executions: Arc<dyn ExecutionRepository>,
    tracked: Mutex<HashSet<Uuid>>,
}

impl InProcessDurabilityAdapter {
    pub fn new(executions: Arc<dyn ExecutionRepository>) -> Self {
        Self { executions, tracked: Mutex::new(HashSet::new()) }
    }
}

#[async_trait]
impl DurabilityAdapter for InProcessDurabilityAdapter {
    async fn start(&self, execution_id: Uuid) -> Result<WorkflowHandle, DurabilityError> {
        self.tracked.lock().unwrap().insert(execution_id);
        Ok(WorkflowHandle(execution_id))
    }

    async fn checkpoint(&self, _handle: WorkflowHandle) -> Result<(), DurabilityError> {
        // No external engine to heartbeat; the execution row itself is the
        // checkpoint, updated by the Executor on every phase transition.
        Ok(())
    }

    /// There is no separate signal channel in-process: the execution row is
    /// the single source of truth, and `ExecutionControl` (held by whichever
    /// task is actively running the phase loop) is how pause/resume/cancel
    /// actually reach it. This just validates the workflow is known.
    async fn signal(&self, handle: WorkflowHandle, name: &str, _payload: Value) -> Result<(), DurabilityError> {
        if !self.tracked.lock().unwrap().contains(&handle.0) {
            return Err(DurabilityError::NotFound(handle.0));
        }
        info!(execution_id = %handle.0, signal = name, "signal recorded for in-process workflow");
        Ok(())
    }

    async fn cancel(&self, handle: WorkflowHandle) -> Result<(), DurabilityError> {
        self.tracked.lock().unwrap().remove(&handle.0);
        Ok(())
    }

    async fn describe(&self, handle: WorkflowHandle) -> Result<WorkflowStatus, DurabilityError> {
        let non_terminal = self
            .executions
            .list_non_terminal()
            .await
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))?;

        if let Some(execution) = non_terminal.iter().find(|e| e.id == handle.0) {
            return Ok(match execution.status {
                ExecutionStatus::Running | ExecutionStatus::Pending => WorkflowStatus::Running,
                ExecutionStatus::Paused => WorkflowStatus::Paused,
                _ => WorkflowStatus::Unknown,
            });
        }
        if self.tracked.lock().unwrap().contains(&handle.0) {
            return Ok(WorkflowStatus::Completed);
        }
        Ok(WorkflowStatus::Unknown)
    }

    async fn recover_in_flight(&self) -> Result<Vec<Uuid>, DurabilityError> {
        let executions = self
            .executions
            .list_non_terminal()
            .await
            .map_err(|e| DurabilityError::Unavailable(e.to_string()))?;

        let ids: Vec<Uuid> = executions.iter().map(|e| e.id).collect();
        info!(count = ids.len(), "recovered in-flight executions at boot");

        let mut tracked = self.tracked.lock().unwrap();
        tracked.extend(ids.iter().copied());

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteExecutionRepository};
    use crate::domain::models::{Execution, ExecutionStatus, PhaseExecutionState};

    #[tokio::test]
    async fn recover_in_flight_returns_non_terminal_executions() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteExecutionRepository::new(pool));

        let mut running = Execution::new(Uuid::new_v4(), Uuid::new_v4(), "org-1", vec![PhaseExecutionState::new("p1", &["a1".to_string()])]);
        running.transition_to(ExecutionStatus::Running).unwrap();
        repo.create(&running).await.unwrap();

        let mut done = Execution::new(Uuid::new_v4(), Uuid::new_v4(), "org-1", vec![PhaseExecutionState::new("p1", &["a1".to_string()])]);
        done.transition_to(ExecutionStatus::Running).unwrap();
        done.transition_to(ExecutionStatus::Completed).unwrap();
        repo.create(&done).await.unwrap();

        let adapter = InProcessDurabilityAdapter::new(repo);
        let recovered = adapter.recover_in_flight().await.unwrap();

        assert_eq!(recovered, vec![running.id]);
    }

    #[tokio::test]
    async fn cancel_removes_from_tracked_set() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteExecutionRepository::new(pool));
        let adapter = InProcessDurabilityAdapter::new(repo);

        let handle = adapter.start(Uuid::new_v4()).await.unwrap();
        adapter.cancel(handle).await.unwrap();
        assert!(adapter.tracked.lock().unwrap().is_empty());
    }
}
