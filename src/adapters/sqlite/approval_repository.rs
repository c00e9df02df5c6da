//! SQLite implementation of the ApprovalRepository (C9 audit trail).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalAction, ApprovalRecord};
use crate::domain::ports::ApprovalRepository;

#[derive(Clone)]
pub struct SqliteApprovalRepository {
    pool: SqlitePool,
}

impl SqliteApprovalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalRepository for SqliteApprovalRepository {
    async fn record(&self, record: &ApprovalRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO approval_records (id, org_id, plan_id, task_id, user_id, action,
               reason, prior_state, resulting_state, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.org_id)
        .bind(record.plan_id.to_string())
        .bind(record.task_id.to_string())
        .bind(&record.user_id)
        .bind(record.action.as_str())
        .bind(&record.reason)
        .bind(&record.prior_state)
        .bind(&record.resulting_state)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_plan(&self, org_id: &str, plan_id: Uuid) -> DomainResult<Vec<ApprovalRecord>> {
        let rows: Vec<ApprovalRecordRow> = sqlx::query_as(
            "SELECT * FROM approval_records WHERE org_id = ? AND plan_id = ? ORDER BY timestamp ASC",
        )
        .bind(org_id)
        .bind(plan_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<ApprovalRecord>> {
        let rows: Vec<ApprovalRecordRow> = sqlx::query_as(
            "SELECT * FROM approval_records WHERE org_id = ? AND task_id = ? ORDER BY timestamp ASC",
        )
        .bind(org_id)
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn action_from_str(s: &str) -> Option<ApprovalAction> {
    match s {
        "approve" => Some(ApprovalAction::Approve),
        "reject" => Some(ApprovalAction::Reject),
        "modify" => Some(ApprovalAction::Modify),
        "cancel" => Some(ApprovalAction::Cancel),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRecordRow {
    id: String,
    org_id: String,
    plan_id: String,
    task_id: String,
    user_id: String,
    action: String,
    reason: Option<String>,
    prior_state: String,
    resulting_state: String,
    timestamp: String,
}

impl TryFrom<ApprovalRecordRow> for ApprovalRecord {
    type Error = DomainError;

    fn try_from(row: ApprovalRecordRow) -> Result<Self, Self::Error> {
        let action = action_from_str(&row.action)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid approval action: {}", row.action)))?;

        Ok(ApprovalRecord {
            id: super::parse_uuid(&row.id)?,
            org_id: row.org_id,
            plan_id: super::parse_uuid(&row.plan_id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            user_id: row.user_id,
            action,
            reason: row.reason,
            prior_state: row.prior_state,
            resulting_state: row.resulting_state,
            timestamp: super::parse_datetime(&row.timestamp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn repo() -> SqliteApprovalRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteApprovalRepository::new(pool)
    }

    #[tokio::test]
    async fn record_and_list_for_plan() {
        let repo = repo().await;
        let plan_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let rec = ApprovalRecord::new(
            "org-1",
            plan_id,
            task_id,
            "alice",
            ApprovalAction::Approve,
            "awaiting_approval",
            "approved",
        );
        repo.record(&rec).await.unwrap();

        let listed = repo.list_for_plan("org-1", plan_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "alice");
    }

    #[tokio::test]
    async fn list_for_task_aggregates_across_plans() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        let first_plan = Uuid::new_v4();
        let second_plan = Uuid::new_v4();

        repo.record(&ApprovalRecord::new(
            "org-1",
            first_plan,
            task_id,
            "alice",
            ApprovalAction::Reject,
            "awaiting_approval",
            "rejected",
        ))
        .await
        .unwrap();
        repo.record(&ApprovalRecord::new(
            "org-1",
            second_plan,
            task_id,
            "bob",
            ApprovalAction::Approve,
            "awaiting_approval",
            "approved",
        ))
        .await
        .unwrap();

        let listed = repo.list_for_task("org-1", task_id).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
