use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod audit_repository;
pub mod enrollment_repository;
pub mod lease_repository;
pub mod lesson_repository;
pub mod payment_repository;
pub mod plan_repository;
pub mod professor_repository;
pub mod webhook_event_repository;

pub use audit_repository::SqliteAuditRepository;
pub use enrollment_repository::SqliteEnrollmentRepository;
pub use lease_repository::{LeaseRepository, SqliteLeaseRepository};
pub use lesson_repository::{LessonScheduleRepository, SqliteLessonScheduleRepository};
pub use payment_repository::SqlitePaymentRepository;
pub use plan_repository::SqlitePlanRepository;
pub use professor_repository::SqliteProfessorRepository;
pub use webhook_event_repository::SqliteWebhookEventRepository;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>>;
    async fn list_by_professor(&self, professor_id: Uuid) -> Result<Vec<Payment>>;
    /// Writes the transition unless `guard_manual` is set and the payment is manually settled.
    /// Returns false when the guard blocked the write (or the payment does not exist).
    async fn apply_transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        guard_manual: bool,
        gateway_payment_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Settles the payment as manual unless it is already `pago`.
    async fn mark_paid_manually(
        &self,
        id: Uuid,
        reason: &str,
        actor_id: Uuid,
        paid_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Soft cancel; refuses settled payments.
    async fn cancel(&self, id: Uuid, reason: &str, actor_id: Uuid, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait ProfessorRepository: Send + Sync {
    async fn create(&self, request: CreateProfessorRequest) -> Result<Professor>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Professor>>;
    /// Compare-and-swap on `version`; None means another writer got there first.
    async fn update_plan(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<Professor>>;
    /// Version-checked plan assignment committed in one transaction with the
    /// suspension of enrollments over the new limit and the reactivation of
    /// downgraded ones under it. None means the version check lost and nothing
    /// was written.
    async fn apply_plan_change(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<AppliedPlanChange>>;
    async fn clear_manual_override(&self, id: Uuid) -> Result<Professor>;
    async fn set_grace_period(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<Professor>;
    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> Result<Vec<Professor>>;
    /// Clears the grace period only if it is still set and expired.
    async fn clear_expired_grace_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Plan>>;
    async fn list(&self, include_inactive: bool) -> Result<Vec<Plan>>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    async fn create(&self, enrollment: NewEnrollment) -> Result<Enrollment>;
    /// Inserts an active enrollment only if the professor has a free slot.
    async fn create_within_limit(&self, enrollment: NewEnrollment) -> Result<Option<Enrollment>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Enrollment>>;
    async fn list_by_professor(&self, professor_id: Uuid) -> Result<Vec<Enrollment>>;
    async fn count_active(&self, professor_id: Uuid) -> Result<i64>;
    /// Suspends every active enrollment after the `keep` oldest, in one statement.
    async fn suspend_excess(
        &self,
        professor_id: Uuid,
        keep: i64,
        reason: SuspensionReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;
    /// Reactivates the longest-suspended `plan_downgrade` enrollments into the free slots
    /// left under the professor's stored limit, in one statement.
    async fn reactivate_downgraded(&self, professor_id: Uuid, at: DateTime<Utc>) -> Result<Vec<Uuid>>;
    /// Reactivates a single enrollment if a slot is free at execution time.
    async fn reactivate_one(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;
    async fn suspend_one(&self, id: Uuid, reason: SuspensionReason, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Returns false if the natural key is already in the ledger.
    async fn insert_if_absent(&self, event: WebhookEvent) -> Result<bool>;
    async fn release(&self, key: &WebhookEventKey) -> Result<()>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>>;
    async fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}
