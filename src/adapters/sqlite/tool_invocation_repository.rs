//! SQLite implementation of the ToolInvocationRepository (C9 audit trail).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ToolInvocation;
use crate::domain::ports::ToolInvocationRepository;

#[derive(Clone)]
pub struct SqliteToolInvocationRepository {
    pool: SqlitePool,
}

impl SqliteToolInvocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolInvocationRepository for SqliteToolInvocationRepository {
    async fn record(&self, invocation: &ToolInvocation) -> DomainResult<()> {
        let result_json = invocation.result.as_ref().map(super::to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO tool_invocations (id, org_id, task_id, execution_id, agent_name, tool_name,
               parameters, result, error, success, invoked_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(invocation.id.to_string())
        .bind(&invocation.org_id)
        .bind(invocation.task_id.to_string())
        .bind(invocation.execution_id.map(|id| id.to_string()))
        .bind(&invocation.agent_name)
        .bind(&invocation.tool_name)
        .bind(super::to_json(&invocation.parameters)?)
        .bind(&result_json)
        .bind(&invocation.error)
        .bind(invocation.success)
        .bind(invocation.invoked_at.to_rfc3339())
        .bind(invocation.duration_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<ToolInvocation>> {
        let rows: Vec<ToolInvocationRow> = sqlx::query_as(
            "SELECT * FROM tool_invocations WHERE org_id = ? AND task_id = ? ORDER BY invoked_at ASC",
        )
        .bind(org_id)
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_execution(&self, org_id: &str, execution_id: Uuid) -> DomainResult<Vec<ToolInvocation>> {
        let rows: Vec<ToolInvocationRow> = sqlx::query_as(
            "SELECT * FROM tool_invocations WHERE org_id = ? AND execution_id = ? ORDER BY invoked_at ASC",
        )
        .bind(org_id)
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ToolInvocationRow {
    id: String,
    org_id: String,
    task_id: String,
    execution_id: Option<String>,
    agent_name: String,
    tool_name: String,
    parameters: String,
    result: Option<String>,
    error: Option<String>,
    success: bool,
    invoked_at: String,
    duration_ms: i64,
}

impl TryFrom<ToolInvocationRow> for ToolInvocation {
    type Error = DomainError;

    fn try_from(row: ToolInvocationRow) -> Result<Self, Self::Error> {
        Ok(ToolInvocation {
            id: super::parse_uuid(&row.id)?,
            org_id: row.org_id,
            task_id: super::parse_uuid(&row.task_id)?,
            execution_id: super::parse_optional_uuid(row.execution_id)?,
            agent_name: row.agent_name,
            tool_name: row.tool_name,
            parameters: super::parse_json(&row.parameters)?,
            result: row.result.as_deref().map(super::parse_json).transpose()?,
            error: row.error,
            success: row.success,
            invoked_at: super::parse_datetime(&row.invoked_at)?,
            duration_ms: row.duration_ms as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn repo() -> SqliteToolInvocationRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteToolInvocationRepository::new(pool)
    }

    #[tokio::test]
    async fn record_and_list_for_task() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        let inv = ToolInvocation::new("org-1", task_id, "patcher", "ssm_patch", serde_json::json!({"asset": "a1"}))
            .complete_ok(serde_json::json!({"ok": true}), 120);
        repo.record(&inv).await.unwrap();

        let listed = repo.list_for_task("org-1", task_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].success);
    }

    #[tokio::test]
    async fn list_for_execution_filters_by_execution_id() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        let execution_id = Uuid::new_v4();
        let inv = ToolInvocation::new("org-1", task_id, "patcher", "ssm_patch", serde_json::json!({}))
            .with_execution_id(execution_id)
            .complete_err("timeout", 5000);
        repo.record(&inv).await.unwrap();

        let other_inv = ToolInvocation::new("org-1", task_id, "patcher", "ssm_patch", serde_json::json!({}))
            .complete_ok(serde_json::json!({}), 10);
        repo.record(&other_inv).await.unwrap();

        let listed = repo.list_for_execution("org-1", execution_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].error.as_deref(), Some("timeout"));
    }
}
