use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus, Precedence, StatusTransition},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    professor_id: String,
    student_id: Option<String>,
    amount_cents: i64,
    description: String,
    due_date: NaiveDateTime,
    paid_at: Option<NaiveDateTime>,
    status: String,
    precedence: String,
    eligible_to_schedule: i32,
    gateway_payment_id: Option<String>,
    checkout_url: Option<String>,
    plan_name: Option<String>,
    manual_reason: Option<String>,
    manual_actor: Option<String>,
    manual_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"
    id, professor_id, student_id, amount_cents, description, due_date,
    paid_at, status, precedence, eligible_to_schedule, gateway_payment_id,
    checkout_url, plan_name, manual_reason, manual_actor, manual_at,
    created_at, updated_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            professor_id: parse_uuid(&row.professor_id)?,
            student_id: row.student_id.as_deref().map(parse_uuid).transpose()?,
            amount_cents: row.amount_cents,
            description: row.description,
            due_date: to_utc(row.due_date),
            paid_at: row.paid_at.map(to_utc),
            status: PaymentStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid payment status: {}", row.status)))?,
            precedence: Precedence::from_str(&row.precedence)
                .ok_or_else(|| AppError::Database(format!("Invalid precedence: {}", row.precedence)))?,
            eligible_to_schedule: row.eligible_to_schedule != 0,
            gateway_payment_id: row.gateway_payment_id,
            checkout_url: row.checkout_url,
            plan_name: row.plan_name,
            manual_reason: row.manual_reason,
            manual_actor: row.manual_actor.as_deref().map(parse_uuid).transpose()?,
            manual_at: row.manual_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, professor_id, student_id, amount_cents, description, due_date,
                paid_at, status, precedence, eligible_to_schedule, gateway_payment_id,
                checkout_url, plan_name, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(payment.id.to_string())
        .bind(payment.professor_id.to_string())
        .bind(payment.student_id.map(|id| id.to_string()))
        .bind(payment.amount_cents)
        .bind(&payment.description)
        .bind(payment.due_date.naive_utc())
        .bind(payment.paid_at.map(|dt| dt.naive_utc()))
        .bind(payment.status.as_str())
        .bind(payment.precedence.as_str())
        .bind(if payment.eligible_to_schedule { 1i32 } else { 0i32 })
        .bind(&payment.gateway_payment_id)
        .bind(&payment.checkout_url)
        .bind(&payment.plan_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(payment.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE gateway_payment_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_by_professor(&self, professor_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE professor_id = ? ORDER BY due_date DESC",
            PAYMENT_COLUMNS
        ))
        .bind(professor_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        guard_manual: bool,
        gateway_payment_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = at.naive_utc();

        // The manual-precedence guard lives in the WHERE clause so a concurrent
        // manual settlement cannot be overwritten between read and write.
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                eligible_to_schedule = ?,
                precedence = COALESCE(?, precedence),
                paid_at = CASE WHEN ? = 1 THEN COALESCE(paid_at, ?) ELSE paid_at END,
                gateway_payment_id = COALESCE(gateway_payment_id, ?),
                updated_at = ?
            WHERE id = ?
              AND (? = 0 OR precedence <> 'manual')
            "#
        )
        .bind(transition.status.as_str())
        .bind(if transition.eligible_to_schedule { 1i32 } else { 0i32 })
        .bind(transition.precedence.map(|p| p.as_str()))
        .bind(if transition.sets_paid_at { 1i32 } else { 0i32 })
        .bind(at)
        .bind(gateway_payment_id)
        .bind(at)
        .bind(id.to_string())
        .bind(if guard_manual { 1i32 } else { 0i32 })
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_paid_manually(
        &self,
        id: Uuid,
        reason: &str,
        actor_id: Uuid,
        paid_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = at.naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'pago',
                precedence = 'manual',
                eligible_to_schedule = 1,
                paid_at = ?,
                manual_reason = ?,
                manual_actor = ?,
                manual_at = ?,
                updated_at = ?
            WHERE id = ? AND status <> 'pago'
            "#
        )
        .bind(paid_at.naive_utc())
        .bind(reason)
        .bind(actor_id.to_string())
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: Uuid, reason: &str, actor_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let at = at.naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'cancelado',
                precedence = 'cancelled',
                eligible_to_schedule = 0,
                manual_reason = ?,
                manual_actor = ?,
                manual_at = ?,
                updated_at = ?
            WHERE id = ? AND status <> 'pago'
            "#
        )
        .bind(reason)
        .bind(actor_id.to_string())
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
