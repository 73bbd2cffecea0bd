use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub professor_id: Uuid,
    pub student_name: String,
    pub active: bool,
    pub suspended_reason: Option<SuspensionReason>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionReason {
    /// Set by the capacity enforcer; the only reason bulk reactivation touches.
    PlanDowngrade,
    Manual,
}

impl SuspensionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionReason::PlanDowngrade => "plan_downgrade",
            SuspensionReason::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "plan_downgrade" => Some(SuspensionReason::PlanDowngrade),
            "manual" => Some(SuspensionReason::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub professor_id: Uuid,
    pub student_name: String,
    /// Defaults to now; explicit values are used by imports and tests.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnrollStudentRequest {
    #[validate(length(min = 1, max = 200))]
    pub student_name: String,
}
