use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{AppliedPlanChange, CreateProfessorRequest, PlanAssignment, Professor, SuspensionReason},
    error::{AppError, Result},
    repository::{enrollment_repository, parse_uuid, to_utc, ProfessorRepository},
};

#[derive(FromRow)]
struct ProfessorRow {
    id: String,
    name: String,
    email: String,
    plan_name: String,
    student_limit: i64,
    manual_plan_override: i32,
    grace_period_until: Option<NaiveDateTime>,
    plan_changed_by: Option<String>,
    plan_changed_at: Option<NaiveDateTime>,
    version: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PROFESSOR_COLUMNS: &str = r#"
    id, name, email, plan_name, student_limit, manual_plan_override,
    grace_period_until, plan_changed_by, plan_changed_at, version,
    created_at, updated_at
"#;

pub struct SqliteProfessorRepository {
    pool: SqlitePool,
}

impl SqliteProfessorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_professor(row: ProfessorRow) -> Result<Professor> {
        Ok(Professor {
            id: parse_uuid(&row.id)?,
            name: row.name,
            email: row.email,
            plan_name: row.plan_name,
            student_limit: row.student_limit,
            manual_plan_override: row.manual_plan_override != 0,
            grace_period_until: row.grace_period_until.map(to_utc),
            plan_changed_by: row.plan_changed_by.as_deref().map(parse_uuid).transpose()?,
            plan_changed_at: row.plan_changed_at.map(to_utc),
            version: row.version,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn require(&self, id: Uuid) -> Result<Professor> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::NotFound("Professor not found".to_string())
        })
    }
}

async fn find_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Professor>> {
    let row = sqlx::query_as::<_, ProfessorRow>(&format!(
        "SELECT {} FROM professors WHERE id = ?",
        PROFESSOR_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    row.map(SqliteProfessorRepository::row_to_professor).transpose()
}

/// Compare-and-swap on `version`. False when another writer bumped it first.
async fn write_plan(
    conn: &mut SqliteConnection,
    id: Uuid,
    expected_version: i64,
    assignment: &PlanAssignment,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE professors
        SET plan_name = ?,
            student_limit = ?,
            manual_plan_override = ?,
            plan_changed_by = ?,
            plan_changed_at = ?,
            version = version + 1,
            updated_at = ?
        WHERE id = ? AND version = ?
        "#
    )
    .bind(&assignment.plan_name)
    .bind(assignment.student_limit)
    .bind(if assignment.manual_plan_override { 1i32 } else { 0i32 })
    .bind(assignment.changed_by.map(|id| id.to_string()))
    .bind(assignment.changed_at.naive_utc())
    .bind(Utc::now().naive_utc())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl ProfessorRepository for SqliteProfessorRepository {
    async fn create(&self, request: CreateProfessorRequest) -> Result<Professor> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO professors (
                id, name, email, plan_name, student_limit,
                manual_plan_override, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.plan_name)
        .bind(request.student_limit)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created professor".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Professor>> {
        let mut conn = self.pool.acquire().await
            .map_err(|e| AppError::Database(e.to_string()))?;
        find_in(&mut conn, id).await
    }

    async fn update_plan(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<Professor>> {
        let mut conn = self.pool.acquire().await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !write_plan(&mut conn, id, expected_version, &assignment).await? {
            return Ok(None);
        }

        find_in(&mut conn, id).await
    }

    async fn apply_plan_change(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<AppliedPlanChange>> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // The version-checked write goes first so the transaction holds the
        // write lock before the roster is read.
        if !write_plan(&mut tx, id, expected_version, &assignment).await? {
            tx.rollback().await.map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(None);
        }

        let at = assignment.changed_at;
        let student_count = enrollment_repository::count_active(&mut tx, id).await?;
        let suspended = enrollment_repository::suspend_excess(
            &mut tx,
            id,
            assignment.student_limit,
            SuspensionReason::PlanDowngrade,
            at,
        )
        .await?;
        let reactivated = enrollment_repository::reactivate_downgraded(&mut tx, id, at).await?;

        let professor = find_in(&mut tx, id).await?.ok_or_else(|| {
            AppError::Database("Professor vanished during plan change".to_string())
        })?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Some(AppliedPlanChange {
            professor,
            student_count,
            suspended,
            reactivated,
        }))
    }

    async fn clear_manual_override(&self, id: Uuid) -> Result<Professor> {
        sqlx::query(
            r#"
            UPDATE professors
            SET manual_plan_override = 0,
                version = version + 1,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.require(id).await
    }

    async fn set_grace_period(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<Professor> {
        sqlx::query(
            r#"
            UPDATE professors
            SET grace_period_until = ?,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(until.map(|dt| dt.naive_utc()))
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.require(id).await
    }

    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> Result<Vec<Professor>> {
        let rows = sqlx::query_as::<_, ProfessorRow>(&format!(
            r#"
            SELECT {} FROM professors
            WHERE grace_period_until IS NOT NULL AND grace_period_until < ?
            ORDER BY grace_period_until ASC
            "#,
            PROFESSOR_COLUMNS
        ))
        .bind(now.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_professor)
            .collect()
    }

    async fn clear_expired_grace_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE professors
            SET grace_period_until = NULL,
                updated_at = ?
            WHERE id = ?
              AND grace_period_until IS NOT NULL
              AND grace_period_until < ?
            "#
        )
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
