//! SQLite implementation of the PlanRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ModificationRecord, Phase, Plan, PlanState, QualityScore};
use crate::domain::ports::PlanRepository;

#[derive(Clone)]
pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for SqlitePlanRepository {
    async fn create(&self, plan: &Plan) -> DomainResult<()> {
        let phases_json = super::to_json(&plan.phases)?;
        let approved_by_json = super::to_json(&plan.approved_by)?;
        let modifications_json = super::to_json(&plan.modifications)?;
        let quality_score_json = plan.quality_score.as_ref().map(super::to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO plans (id, task_id, org_id, phases, state, approved_by,
               requires_dual_signer, rejection_reason, modifications, quality_score,
               supersedes, created_at, updated_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(plan.id.to_string())
        .bind(plan.task_id.to_string())
        .bind(&plan.org_id)
        .bind(&phases_json)
        .bind(plan.state.as_str())
        .bind(&approved_by_json)
        .bind(plan.requires_dual_signer)
        .bind(&plan.rejection_reason)
        .bind(&modifications_json)
        .bind(&quality_score_json)
        .bind(plan.supersedes.map(|id| id.to_string()))
        .bind(plan.created_at.to_rfc3339())
        .bind(plan.updated_at.to_rfc3339())
        .bind(plan.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, org_id: &str, id: Uuid) -> DomainResult<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as("SELECT * FROM plans WHERE org_id = ? AND id = ?")
            .bind(org_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Vec<Plan>> {
        let rows: Vec<PlanRow> =
            sqlx::query_as("SELECT * FROM plans WHERE org_id = ? AND task_id = ? ORDER BY created_at ASC")
                .bind(org_id)
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_latest_for_task(&self, org_id: &str, task_id: Uuid) -> DomainResult<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT * FROM plans WHERE org_id = ? AND task_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(org_id)
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, plan: &Plan) -> DomainResult<()> {
        let phases_json = super::to_json(&plan.phases)?;
        let approved_by_json = super::to_json(&plan.approved_by)?;
        let modifications_json = super::to_json(&plan.modifications)?;
        let quality_score_json = plan.quality_score.as_ref().map(super::to_json).transpose()?;

        let result = sqlx::query(
            r#"UPDATE plans SET phases = ?, state = ?, approved_by = ?, rejection_reason = ?,
               modifications = ?, quality_score = ?, supersedes = ?, updated_at = ?, version = ?
               WHERE org_id = ? AND id = ? AND version = ?"#,
        )
        .bind(&phases_json)
        .bind(plan.state.as_str())
        .bind(&approved_by_json)
        .bind(&plan.rejection_reason)
        .bind(&modifications_json)
        .bind(&quality_score_json)
        .bind(plan.supersedes.map(|id| id.to_string()))
        .bind(plan.updated_at.to_rfc3339())
        .bind(plan.version as i64)
        .bind(&plan.org_id)
        .bind(plan.id.to_string())
        .bind((plan.version - 1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(&plan.org_id, plan.id).await? {
                Some(_) => Err(DomainError::ConcurrencyConflict {
                    entity: "plan".to_string(),
                    id: plan.id.to_string(),
                }),
                None => Err(DomainError::PlanNotFound(plan.id)),
            };
        }

        Ok(())
    }
}

fn state_from_str(s: &str) -> Option<PlanState> {
    match s {
        "draft" => Some(PlanState::Draft),
        "awaiting_approval" => Some(PlanState::AwaitingApproval),
        "awaiting_second" => Some(PlanState::AwaitingSecond),
        "approved" => Some(PlanState::Approved),
        "rejected" => Some(PlanState::Rejected),
        "cancelled" => Some(PlanState::Cancelled),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    task_id: String,
    org_id: String,
    phases: String,
    state: String,
    approved_by: String,
    requires_dual_signer: bool,
    rejection_reason: Option<String>,
    modifications: String,
    quality_score: Option<String>,
    supersedes: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let state = state_from_str(&row.state)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid plan state: {}", row.state)))?;
        let phases: Vec<Phase> = super::parse_json(&row.phases)?;
        let approved_by: Vec<String> = super::parse_json(&row.approved_by)?;
        let modifications: Vec<ModificationRecord> = super::parse_json(&row.modifications)?;
        let quality_score: Option<QualityScore> = row.quality_score.as_deref().map(super::parse_json).transpose()?;

        Ok(Plan {
            id: super::parse_uuid(&row.id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            org_id: row.org_id,
            phases,
            state,
            approved_by,
            requires_dual_signer: row.requires_dual_signer,
            rejection_reason: row.rejection_reason,
            modifications,
            quality_score,
            supersedes: super::parse_optional_uuid(row.supersedes)?,
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
    use crate::domain::models::{HealthCheckSpec, RollbackScope, RollbackStrategy, Selector};

    fn phase() -> Phase {
        Phase {
            name: "roll-out".into(),
            selector: Selector::AssetIds(vec!["asset-1".into()]),
            tool_name: "ssm_patch".into(),
            tool_arguments: serde_json::json!({}),
            wait_time: "PT5M".into(),
            health_check: Some(HealthCheckSpec {
                check_type: "http_probe".into(),
                timeout_secs: 30,
                poll_interval_secs: 5,
            }),
            rollback_if: Some("error_rate>5".into()),
            rollback_strategy: RollbackStrategy::Snapshot,
            rollback_scope: RollbackScope::Phase,
            max_failure_fraction: 0.1,
        }
    }

    async fn repo() -> SqlitePlanRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqlitePlanRepository::new(pool)
    }

    #[tokio::test]
    async fn create_and_get_round_trips_phases() {
        let repo = repo().await;
        let plan = Plan::new(Uuid::new_v4(), "org-1", vec![phase()], true);
        repo.create(&plan).await.unwrap();

        let fetched = repo.get("org-1", plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.phases.len(), 1);
        assert_eq!(fetched.phases[0].name, "roll-out");
        assert!(fetched.requires_dual_signer);
    }

    #[tokio::test]
    async fn update_persists_approval_state() {
        let repo = repo().await;
        let mut plan = Plan::new(Uuid::new_v4(), "org-1", vec![phase()], false);
        repo.create(&plan).await.unwrap();

        plan.submit(true).unwrap();
        plan.approve("alice").unwrap();
        repo.update(&plan).await.unwrap();

        let fetched = repo.get("org-1", plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, PlanState::Approved);
        assert_eq!(fetched.approved_by, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn get_latest_for_task_returns_most_recent() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        let first = Plan::new(task_id, "org-1", vec![phase()], false);
        repo.create(&first).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut second = Plan::new(task_id, "org-1", vec![phase()], false);
        second.supersedes = Some(first.id);
        repo.create(&second).await.unwrap();

        let latest = repo.get_latest_for_task("org-1", task_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}
