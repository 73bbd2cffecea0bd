use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// None when the system acted on its own (webhooks, sweeps).
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: Option<Uuid>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

pub mod actions {
    pub const PAYMENT_CREATED: &str = "payment.created";
    pub const PAYMENT_RESOLVED: &str = "payment.resolved";
    pub const PAYMENT_MARKED_PAID: &str = "payment.marked_paid";
    pub const PAYMENT_CANCELLED: &str = "payment.cancelled";
    pub const PLAN_CHANGED: &str = "plan.changed";
    pub const PLAN_OVERRIDE_CLEARED: &str = "plan.override_cleared";
    pub const ENROLLMENTS_SUSPENDED: &str = "enrollments.suspended";
    pub const ENROLLMENTS_REACTIVATED: &str = "enrollments.reactivated";
    pub const ENROLLMENT_CREATED: &str = "enrollment.created";
    pub const GRACE_PERIOD_APPLIED: &str = "grace_period.applied";
    pub const GRACE_PERIOD_EXPIRED: &str = "grace_period.expired";
}
