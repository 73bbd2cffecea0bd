use std::sync::Arc;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{actions, AppliedPlanChange, Enrollment, NewEnrollment, SuspensionReason},
    error::{AppError, Result},
    repository::{EnrollmentRepository, ProfessorRepository},
    service::AuditService,
};

/// Keeps each professor's active enrollments within the plan limit.
///
/// Every roster change here is a single conditional statement in the store, so
/// counts are evaluated at write time rather than read-then-written.
pub struct CapacityService {
    enrollment_repo: Arc<dyn EnrollmentRepository>,
    professor_repo: Arc<dyn ProfessorRepository>,
    audit: Arc<AuditService>,
}

impl CapacityService {
    pub fn new(
        enrollment_repo: Arc<dyn EnrollmentRepository>,
        professor_repo: Arc<dyn ProfessorRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self { enrollment_repo, professor_repo, audit }
    }

    /// Suspends the most recently created active enrollments beyond `new_limit`.
    pub async fn suspend_excess(&self, professor_id: Uuid, new_limit: i64) -> Result<Vec<Uuid>> {
        let suspended = self
            .enrollment_repo
            .suspend_excess(professor_id, new_limit, SuspensionReason::PlanDowngrade, Utc::now())
            .await?;

        self.record_suspended(professor_id, new_limit, &suspended).await;
        Ok(suspended)
    }

    /// Fills free slots with the longest-suspended `plan_downgrade` enrollments.
    pub async fn reactivate(&self, professor_id: Uuid) -> Result<Vec<Uuid>> {
        let reactivated = self
            .enrollment_repo
            .reactivate_downgraded(professor_id, Utc::now())
            .await?;

        self.record_reactivated(professor_id, &reactivated).await;
        Ok(reactivated)
    }

    /// Logs and audits roster changes committed as part of a plan change.
    pub async fn record_plan_cascade(&self, change: &AppliedPlanChange) {
        let professor = &change.professor;
        self.record_suspended(professor.id, professor.student_limit, &change.suspended).await;
        self.record_reactivated(professor.id, &change.reactivated).await;
    }

    async fn record_suspended(&self, professor_id: Uuid, limit: i64, suspended: &[Uuid]) {
        if suspended.is_empty() {
            return;
        }

        tracing::info!(
            professor_id = %professor_id,
            limit,
            count = suspended.len(),
            "Suspended enrollments over plan limit"
        );
        self.audit
            .record(
                None,
                actions::ENROLLMENTS_SUSPENDED,
                "professor",
                professor_id,
                json!({
                    "reason": SuspensionReason::PlanDowngrade.as_str(),
                    "limit": limit,
                    "enrollment_ids": suspended,
                }),
            )
            .await;
    }

    async fn record_reactivated(&self, professor_id: Uuid, reactivated: &[Uuid]) {
        if reactivated.is_empty() {
            return;
        }

        tracing::info!(
            professor_id = %professor_id,
            count = reactivated.len(),
            "Reactivated suspended enrollments"
        );
        self.audit
            .record(
                None,
                actions::ENROLLMENTS_REACTIVATED,
                "professor",
                professor_id,
                json!({ "enrollment_ids": reactivated }),
            )
            .await;
    }

    pub async fn reactivate_one(&self, enrollment_id: Uuid, actor_id: Option<Uuid>) -> Result<Enrollment> {
        let enrollment = self.require_enrollment(enrollment_id).await?;

        if enrollment.active {
            return Ok(enrollment);
        }

        // The slot check runs inside the UPDATE, so two concurrent requests
        // cannot both take the last slot.
        if !self.enrollment_repo.reactivate_one(enrollment_id, Utc::now()).await? {
            return Err(AppError::Conflict(
                "No free slot under the professor's plan limit".to_string(),
            ));
        }

        self.audit
            .record(
                actor_id,
                actions::ENROLLMENTS_REACTIVATED,
                "enrollment",
                enrollment_id,
                json!({
                    "professor_id": enrollment.professor_id,
                    "previous_reason": enrollment.suspended_reason.map(|r| r.as_str()),
                }),
            )
            .await;

        self.require_enrollment(enrollment_id).await
    }

    pub async fn suspend_one(&self, enrollment_id: Uuid, actor_id: Option<Uuid>) -> Result<Enrollment> {
        let enrollment = self.require_enrollment(enrollment_id).await?;

        if !enrollment.active {
            return Ok(enrollment);
        }

        if self
            .enrollment_repo
            .suspend_one(enrollment_id, SuspensionReason::Manual, Utc::now())
            .await?
        {
            self.audit
                .record(
                    actor_id,
                    actions::ENROLLMENTS_SUSPENDED,
                    "enrollment",
                    enrollment_id,
                    json!({
                        "professor_id": enrollment.professor_id,
                        "reason": SuspensionReason::Manual.as_str(),
                    }),
                )
                .await;
        }

        self.require_enrollment(enrollment_id).await
    }

    pub async fn enroll(
        &self,
        professor_id: Uuid,
        student_name: String,
        actor_id: Option<Uuid>,
    ) -> Result<Enrollment> {
        let professor = self.professor_repo.find_by_id(professor_id).await?
            .ok_or_else(|| AppError::NotFound("Professor not found".to_string()))?;

        let enrollment = self
            .enrollment_repo
            .create_within_limit(NewEnrollment {
                professor_id,
                student_name,
                created_at: None,
            })
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Student limit of {} reached for plan {}",
                    professor.student_limit, professor.plan_name
                ))
            })?;

        self.audit
            .record(
                actor_id,
                actions::ENROLLMENT_CREATED,
                "enrollment",
                enrollment.id,
                json!({ "professor_id": professor_id }),
            )
            .await;

        Ok(enrollment)
    }

    pub async fn list_enrollments(&self, professor_id: Uuid) -> Result<Vec<Enrollment>> {
        self.enrollment_repo.list_by_professor(professor_id).await
    }

    async fn require_enrollment(&self, id: Uuid) -> Result<Enrollment> {
        self.enrollment_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))
    }
}
