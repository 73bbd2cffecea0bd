use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Enrollment, NewEnrollment, SuspensionReason},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, EnrollmentRepository},
};

#[derive(FromRow)]
struct EnrollmentRow {
    id: String,
    professor_id: String,
    student_name: String,
    active: i32,
    suspended_reason: Option<String>,
    suspended_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteEnrollmentRepository {
    pool: SqlitePool,
}

impl SqliteEnrollmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_enrollment(row: EnrollmentRow) -> Result<Enrollment> {
        let suspended_reason = match row.suspended_reason {
            Some(reason) => Some(SuspensionReason::from_str(&reason).ok_or_else(|| {
                AppError::Database(format!("Invalid suspension reason: {}", reason))
            })?),
            None => None,
        };

        Ok(Enrollment {
            id: parse_uuid(&row.id)?,
            professor_id: parse_uuid(&row.professor_id)?,
            student_name: row.student_name,
            active: row.active != 0,
            suspended_reason,
            suspended_at: row.suspended_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool.acquire().await.map_err(|e| AppError::Database(e.to_string()))
    }
}

fn parse_ids(ids: Vec<String>) -> Result<Vec<Uuid>> {
    ids.iter().map(|id| parse_uuid(id)).collect()
}

// Roster statements shared with the plan-change transaction in the professor store.

pub(crate) async fn count_active(conn: &mut SqliteConnection, professor_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE professor_id = ? AND active = 1"
    )
    .bind(professor_id.to_string())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(count)
}

pub(crate) async fn suspend_excess(
    conn: &mut SqliteConnection,
    professor_id: Uuid,
    keep: i64,
    reason: SuspensionReason,
    at: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let at = at.naive_utc();

    // Positions [keep, count) of the creation-ordered active set, i.e. the newest.
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        UPDATE enrollments
        SET active = 0,
            suspended_reason = ?,
            suspended_at = ?,
            updated_at = ?
        WHERE id IN (
            SELECT id FROM enrollments
            WHERE professor_id = ? AND active = 1
            ORDER BY created_at ASC, id ASC
            LIMIT -1 OFFSET ?
        )
        RETURNING id
        "#
    )
    .bind(reason.as_str())
    .bind(at)
    .bind(at)
    .bind(professor_id.to_string())
    .bind(keep.max(0))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    parse_ids(ids)
}

pub(crate) async fn reactivate_downgraded(
    conn: &mut SqliteConnection,
    professor_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let professor_id = professor_id.to_string();

    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        UPDATE enrollments
        SET active = 1,
            suspended_reason = NULL,
            suspended_at = NULL,
            updated_at = ?
        WHERE id IN (
            SELECT id FROM enrollments
            WHERE professor_id = ? AND active = 0 AND suspended_reason = 'plan_downgrade'
            ORDER BY suspended_at ASC, created_at ASC, id ASC
            LIMIT MAX(0,
                COALESCE((SELECT student_limit FROM professors WHERE id = ?), 0)
                - (SELECT COUNT(*) FROM enrollments WHERE professor_id = ? AND active = 1))
        )
        RETURNING id
        "#
    )
    .bind(at.naive_utc())
    .bind(&professor_id)
    .bind(&professor_id)
    .bind(&professor_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    parse_ids(ids)
}

#[async_trait]
impl EnrollmentRepository for SqliteEnrollmentRepository {
    async fn create(&self, enrollment: NewEnrollment) -> Result<Enrollment> {
        let id = Uuid::new_v4();
        let created_at = enrollment.created_at.unwrap_or_else(Utc::now).naive_utc();

        sqlx::query(
            r#"
            INSERT INTO enrollments (id, professor_id, student_name, active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(enrollment.professor_id.to_string())
        .bind(&enrollment.student_name)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created enrollment".to_string())
        })
    }

    async fn create_within_limit(&self, enrollment: NewEnrollment) -> Result<Option<Enrollment>> {
        let id = Uuid::new_v4();
        let professor_id = enrollment.professor_id.to_string();
        let created_at = enrollment.created_at.unwrap_or_else(Utc::now).naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO enrollments (id, professor_id, student_name, active, created_at, updated_at)
            SELECT ?, ?, ?, 1, ?, ?
            WHERE (SELECT COUNT(*) FROM enrollments WHERE professor_id = ? AND active = 1)
                < (SELECT student_limit FROM professors WHERE id = ?)
            "#
        )
        .bind(id.to_string())
        .bind(&professor_id)
        .bind(&enrollment.student_name)
        .bind(created_at)
        .bind(created_at)
        .bind(&professor_id)
        .bind(&professor_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT id, professor_id, student_name, active, suspended_reason,
                   suspended_at, created_at, updated_at
            FROM enrollments
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_enrollment).transpose()
    }

    async fn list_by_professor(&self, professor_id: Uuid) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT id, professor_id, student_name, active, suspended_reason,
                   suspended_at, created_at, updated_at
            FROM enrollments
            WHERE professor_id = ?
            ORDER BY created_at ASC, id ASC
            "#
        )
        .bind(professor_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_enrollment)
            .collect()
    }

    async fn count_active(&self, professor_id: Uuid) -> Result<i64> {
        let mut conn = self.acquire().await?;
        count_active(&mut conn, professor_id).await
    }

    async fn suspend_excess(
        &self,
        professor_id: Uuid,
        keep: i64,
        reason: SuspensionReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let mut conn = self.acquire().await?;
        suspend_excess(&mut conn, professor_id, keep, reason, at).await
    }

    async fn reactivate_downgraded(&self, professor_id: Uuid, at: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut conn = self.acquire().await?;
        reactivate_downgraded(&mut conn, professor_id, at).await
    }

    async fn reactivate_one(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET active = 1,
                suspended_reason = NULL,
                suspended_at = NULL,
                updated_at = ?
            WHERE id = ?
              AND active = 0
              AND (SELECT COUNT(*) FROM enrollments e
                   WHERE e.professor_id = enrollments.professor_id AND e.active = 1)
                < (SELECT p.student_limit FROM professors p
                   WHERE p.id = enrollments.professor_id)
            "#
        )
        .bind(at.naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn suspend_one(&self, id: Uuid, reason: SuspensionReason, at: DateTime<Utc>) -> Result<bool> {
        let at = at.naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET active = 0,
                suspended_reason = ?,
                suspended_at = ?,
                updated_at = ?
            WHERE id = ? AND active = 1
            "#
        )
        .bind(reason.as_str())
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
