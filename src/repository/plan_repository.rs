use async_trait::async_trait;
use sqlx::{SqlitePool, FromRow};

use crate::{
    domain::Plan,
    error::{AppError, Result},
    repository::PlanRepository,
};

#[derive(FromRow)]
struct PlanRow {
    name: String,
    display_name: String,
    monthly_price_cents: i64,
    student_limit: i64,
    features: String,
    is_active: i32,
}

/// Read-only access to the plan catalogue seeded by migrations.
pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_plan(row: PlanRow) -> Result<Plan> {
        let features: Vec<String> = serde_json::from_str(&row.features)
            .map_err(|e| AppError::Database(format!("Invalid features for plan {}: {}", row.name, e)))?;

        Ok(Plan {
            name: row.name,
            display_name: row.display_name,
            monthly_price_cents: row.monthly_price_cents,
            student_limit: row.student_limit,
            features,
            is_active: row.is_active != 0,
        })
    }
}

#[async_trait]
impl PlanRepository for SqlitePlanRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT name, display_name, monthly_price_cents, student_limit, features, is_active
            FROM plans
            WHERE name = ?
            "#
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_plan).transpose()
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT name, display_name, monthly_price_cents, student_limit, features, is_active
            FROM plans
            WHERE ? = 1 OR is_active = 1
            ORDER BY monthly_price_cents ASC, name ASC
            "#
        )
        .bind(if include_inactive { 1i32 } else { 0i32 })
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_plan)
            .collect()
    }
}
