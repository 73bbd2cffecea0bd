use std::sync::Arc;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{
        actions, AppliedPlanChange, Plan, PlanAssignment, PlanChangeOptions, PlanChangeOutcome,
        Professor, SkipReason,
    },
    error::{AppError, Result},
    repository::{PlanRepository, ProfessorRepository},
    service::{AuditService, CapacityService},
};

/// Attempts at the version-checked professor update before giving up.
const MAX_PLAN_CHANGE_ATTEMPTS: usize = 3;

pub struct PlanService {
    plan_repo: Arc<dyn PlanRepository>,
    professor_repo: Arc<dyn ProfessorRepository>,
    capacity: Arc<CapacityService>,
    audit: Arc<AuditService>,
}

impl PlanService {
    pub fn new(
        plan_repo: Arc<dyn PlanRepository>,
        professor_repo: Arc<dyn ProfessorRepository>,
        capacity: Arc<CapacityService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            plan_repo,
            professor_repo,
            capacity,
            audit,
        }
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        self.plan_repo.list(false).await
    }

    pub async fn get_plan(&self, name: &str) -> Result<Plan> {
        self.plan_repo.find_by_name(name).await?
            .ok_or_else(|| AppError::NotFound(format!("Plan '{}' not found", name)))
    }

    pub async fn get_professor(&self, id: Uuid) -> Result<Professor> {
        self.professor_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Professor not found".to_string()))
    }

    /// Moves a professor to `target_plan`, suspending the newest enrollments first
    /// when the roster exceeds the new limit and reactivating downgraded ones when
    /// slots open up.
    ///
    /// Automatic changes never override a plan an operator chose.
    pub async fn change_plan(
        &self,
        professor_id: Uuid,
        target_plan: &str,
        options: PlanChangeOptions,
    ) -> Result<PlanChangeOutcome> {
        let plan = self.get_plan(target_plan).await?;
        if !plan.is_active {
            return Err(AppError::NotFound(format!("Plan '{}' is not available", plan.name)));
        }

        for attempt in 1..=MAX_PLAN_CHANGE_ATTEMPTS {
            let professor = self.get_professor(professor_id).await?;

            if options.automatic && professor.manual_plan_override {
                tracing::info!(
                    professor_id = %professor_id,
                    target_plan = %plan.name,
                    "Automatic plan change skipped: plan was set manually"
                );
                return Ok(PlanChangeOutcome::Skipped {
                    reason: SkipReason::ManualOverride,
                });
            }

            let assignment = PlanAssignment {
                plan_name: plan.name.clone(),
                student_limit: plan.student_limit,
                manual_plan_override: !options.automatic,
                changed_by: options.actor_id,
                changed_at: Utc::now(),
            };

            // Suspension of the excess commits with the new limit or not at all.
            let Some(applied) = self
                .professor_repo
                .apply_plan_change(professor_id, professor.version, assignment)
                .await?
            else {
                tracing::warn!(
                    professor_id = %professor_id,
                    attempt,
                    "Professor changed concurrently during plan change, retrying"
                );
                continue;
            };

            self.capacity.record_plan_cascade(&applied).await;
            let AppliedPlanChange { professor: updated, student_count, suspended, reactivated } = applied;

            tracing::info!(
                professor_id = %professor_id,
                old_plan = %professor.plan_name,
                new_plan = %plan.name,
                automatic = options.automatic,
                suspended = suspended.len(),
                reactivated = reactivated.len(),
                "Plan changed"
            );

            self.audit
                .record(
                    options.actor_id,
                    actions::PLAN_CHANGED,
                    "professor",
                    professor_id,
                    json!({
                        "old_plan": professor.plan_name,
                        "new_plan": plan.name,
                        "student_count": student_count,
                        "limit": plan.student_limit,
                        "automatic": options.automatic,
                        "payment_id": options.payment_id,
                        "suspended": suspended.len(),
                        "reactivated": reactivated.len(),
                    }),
                )
                .await;

            return Ok(PlanChangeOutcome::Changed {
                professor: updated,
                plan,
                suspended,
                reactivated,
            });
        }

        Err(AppError::Conflict(
            "Professor was modified concurrently; retry the plan change".to_string(),
        ))
    }

    /// Hands plan management back to automatic processes.
    pub async fn clear_manual_override(&self, professor_id: Uuid, actor_id: Option<Uuid>) -> Result<Professor> {
        let professor = self.get_professor(professor_id).await?;
        if !professor.manual_plan_override {
            return Ok(professor);
        }

        let updated = self.professor_repo.clear_manual_override(professor_id).await?;

        self.audit
            .record(
                actor_id,
                actions::PLAN_OVERRIDE_CLEARED,
                "professor",
                professor_id,
                json!({ "plan": updated.plan_name }),
            )
            .await;

        Ok(updated)
    }
}
