use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub plan_name: String,
    pub student_limit: i64,
    /// Set when an operator chose the plan; automatic changes must not override it.
    pub manual_plan_override: bool,
    pub grace_period_until: Option<DateTime<Utc>>,
    pub plan_changed_by: Option<Uuid>,
    pub plan_changed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateProfessorRequest {
    pub name: String,
    pub email: String,
    pub plan_name: String,
    pub student_limit: i64,
}

/// New plan assignment written with a version check.
#[derive(Debug, Clone)]
pub struct PlanAssignment {
    pub plan_name: String,
    pub student_limit: i64,
    pub manual_plan_override: bool,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
}

/// Result of a plan assignment committed together with its roster changes.
#[derive(Debug, Clone)]
pub struct AppliedPlanChange {
    pub professor: Professor,
    /// Active enrollments before the excess was suspended.
    pub student_count: i64,
    pub suspended: Vec<Uuid>,
    pub reactivated: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanChangeOptions {
    pub automatic: bool,
    pub payment_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PlanChangeOutcome {
    Changed {
        professor: Professor,
        plan: Plan,
        suspended: Vec<Uuid>,
        reactivated: Vec<Uuid>,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ManualOverride,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePlanRequest {
    #[validate(length(min = 1, max = 64))]
    pub plan: String,
    #[serde(default)]
    pub automatic: bool,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GracePeriodRequest {
    #[validate(range(min = 1, max = 90))]
    pub days: i64,
}
