//! SQLite implementation of the ExecutionRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Execution, ExecutionStatus, PhaseExecutionState, RollbackInfo};
use crate::domain::ports::ExecutionRepository;

#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &Execution) -> DomainResult<()> {
        let phases_json = super::to_json(&execution.phases)?;
        let rollback_json = execution.rollback.as_ref().map(super::to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO executions (id, plan_id, task_id, org_id, status, current_phase_index,
               phases, rollback, terminal_error, started_at, completed_at, created_at, updated_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.plan_id.to_string())
        .bind(execution.task_id.to_string())
        .bind(&execution.org_id)
        .bind(execution.status.as_str())
        .bind(execution.current_phase_index as i64)
        .bind(&phases_json)
        .bind(&rollback_json)
        .bind(&execution.terminal_error)
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.updated_at.to_rfc3339())
        .bind(execution.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, org_id: &str, id: Uuid) -> DomainResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE org_id = ? AND id = ?")
            .bind(org_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_for_plan(&self, org_id: &str, plan_id: Uuid) -> DomainResult<Option<Execution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM executions WHERE org_id = ? AND plan_id = ?")
                .bind(org_id)
                .bind(plan_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, execution: &Execution) -> DomainResult<()> {
        let phases_json = super::to_json(&execution.phases)?;
        let rollback_json = execution.rollback.as_ref().map(super::to_json).transpose()?;

        let result = sqlx::query(
            r#"UPDATE executions SET status = ?, current_phase_index = ?, phases = ?, rollback = ?,
               terminal_error = ?, started_at = ?, completed_at = ?, updated_at = ?, version = ?
               WHERE org_id = ? AND id = ? AND version = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(execution.current_phase_index as i64)
        .bind(&phases_json)
        .bind(&rollback_json)
        .bind(&execution.terminal_error)
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.updated_at.to_rfc3339())
        .bind(execution.version as i64)
        .bind(&execution.org_id)
        .bind(execution.id.to_string())
        .bind((execution.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(&execution.org_id, execution.id).await? {
                Some(_) => Err(DomainError::ConcurrencyConflict {
                    entity: "execution".to_string(),
                    id: execution.id.to_string(),
                }),
                None => Err(DomainError::ExecutionNotFound(execution.id)),
            };
        }

        Ok(())
    }

    async fn list_non_terminal(&self) -> DomainResult<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM executions WHERE status NOT IN ('completed', 'failed', 'rolled_back', 'cancelled')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_status(&self, org_id: &str, status: ExecutionStatus) -> DomainResult<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE org_id = ? AND status = ?")
            .bind(org_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn status_from_str(s: &str) -> Option<ExecutionStatus> {
    match s {
        "pending" => Some(ExecutionStatus::Pending),
        "running" => Some(ExecutionStatus::Running),
        "paused" => Some(ExecutionStatus::Paused),
        "completed" => Some(ExecutionStatus::Completed),
        "failed" => Some(ExecutionStatus::Failed),
        "rolled_back" => Some(ExecutionStatus::RolledBack),
        "cancelled" => Some(ExecutionStatus::Cancelled),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    plan_id: String,
    task_id: String,
    org_id: String,
    status: String,
    current_phase_index: i64,
    phases: String,
    rollback: Option<String>,
    terminal_error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = DomainError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = status_from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid execution status: {}", row.status)))?;
        let phases: Vec<PhaseExecutionState> = super::parse_json(&row.phases)?;
        let rollback: Option<RollbackInfo> = row.rollback.as_deref().map(super::parse_json).transpose()?;

        Ok(Execution {
            id: super::parse_uuid(&row.id)?,
            plan_id: super::parse_uuid(&row.plan_id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            org_id: row.org_id,
            status,
            current_phase_index: row.current_phase_index as usize,
            phases,
            rollback,
            terminal_error: row.terminal_error,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            version: row.version as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn repo() -> SqliteExecutionRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteExecutionRepository::new(pool)
    }

    fn execution() -> Execution {
        Execution::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "org-1",
            vec![PhaseExecutionState::new("roll-out", &["asset-1".to_string()])],
        )
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let repo = repo().await;
        let exec = execution();
        repo.create(&exec).await.unwrap();

        let fetched = repo.get("org-1", exec.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Pending);
        assert_eq!(fetched.phases.len(), 1);
    }

    #[tokio::test]
    async fn list_non_terminal_excludes_completed() {
        let repo = repo().await;
        let mut running = execution();
        running.transition_to(ExecutionStatus::Running).unwrap();
        repo.create(&running).await.unwrap();

        let mut done = execution();
        done.transition_to(ExecutionStatus::Running).unwrap();
        done.transition_to(ExecutionStatus::Completed).unwrap();
        repo.create(&done).await.unwrap();

        let non_terminal = repo.list_non_terminal().await.unwrap();
        assert_eq!(non_terminal.len(), 1);
        assert_eq!(non_terminal[0].id, running.id);
    }

    #[tokio::test]
    async fn update_detects_stale_version() {
        let repo = repo().await;
        let mut exec = execution();
        repo.create(&exec).await.unwrap();

        exec.transition_to(ExecutionStatus::Running).unwrap();
        repo.update(&exec).await.unwrap();

        let err = repo.update(&exec).await.unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
    }
}
