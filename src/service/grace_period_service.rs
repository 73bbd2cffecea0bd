use std::sync::Arc;
use std::time::Duration as StdDuration;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    domain::{actions, PlanChangeOptions, PlanChangeOutcome, Professor},
    error::{AppError, Result},
    repository::{LeaseRepository, ProfessorRepository},
    service::{AuditService, PlanService},
};

const SWEEP_LEASE: &str = "grace_period_sweep";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SweepReport {
    pub downgraded: Vec<Uuid>,
    /// Professors whose plan was set manually; their grace period is cleared anyway.
    pub skipped: Vec<Uuid>,
    /// Left untouched so the next sweep retries them.
    pub failed: Vec<Uuid>,
}

pub struct GracePeriodService {
    professor_repo: Arc<dyn ProfessorRepository>,
    lease_repo: Arc<dyn LeaseRepository>,
    plan_service: Arc<PlanService>,
    audit: Arc<AuditService>,
    baseline_plan: String,
    lease_ttl: Duration,
    instance_id: String,
}

impl GracePeriodService {
    pub fn new(
        professor_repo: Arc<dyn ProfessorRepository>,
        lease_repo: Arc<dyn LeaseRepository>,
        plan_service: Arc<PlanService>,
        audit: Arc<AuditService>,
        baseline_plan: String,
        lease_ttl: Duration,
        instance_id: String,
    ) -> Self {
        Self {
            professor_repo,
            lease_repo,
            plan_service,
            audit,
            baseline_plan,
            lease_ttl,
            instance_id,
        }
    }

    pub async fn apply_grace_period(
        &self,
        professor_id: Uuid,
        days: i64,
        actor_id: Option<Uuid>,
    ) -> Result<Professor> {
        if days <= 0 {
            return Err(AppError::Validation("Grace period must be at least one day".to_string()));
        }

        self.plan_service.get_professor(professor_id).await?;

        let until = Utc::now() + Duration::days(days);
        let professor = self.professor_repo.set_grace_period(professor_id, Some(until)).await?;

        tracing::info!(professor_id = %professor_id, until = %until, "Grace period applied");

        self.audit
            .record(
                actor_id,
                actions::GRACE_PERIOD_APPLIED,
                "professor",
                professor_id,
                json!({ "days": days, "until": until }),
            )
            .await;

        Ok(professor)
    }

    pub async fn clear_grace_period(&self, professor_id: Uuid) -> Result<Professor> {
        self.professor_repo.set_grace_period(professor_id, None).await
    }

    /// Downgrades every professor whose grace period has lapsed to the baseline plan.
    ///
    /// Rerunning is safe: a processed professor has no grace period left and is
    /// not selected again.
    pub async fn sweep_expired_grace_periods(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let expired = self.professor_repo.list_expired_grace_periods(now).await?;
        let mut report = SweepReport::default();

        for professor in expired {
            let options = PlanChangeOptions {
                automatic: true,
                ..Default::default()
            };

            match self
                .plan_service
                .change_plan(professor.id, &self.baseline_plan, options)
                .await
            {
                Ok(PlanChangeOutcome::Changed { .. }) => report.downgraded.push(professor.id),
                Ok(PlanChangeOutcome::Skipped { .. }) => report.skipped.push(professor.id),
                Err(e) => {
                    tracing::error!(
                        professor_id = %professor.id,
                        error = %e,
                        "Grace period downgrade failed"
                    );
                    report.failed.push(professor.id);
                    continue;
                }
            }

            if self.professor_repo.clear_expired_grace_period(professor.id, now).await? {
                self.audit
                    .record(
                        None,
                        actions::GRACE_PERIOD_EXPIRED,
                        "professor",
                        professor.id,
                        json!({
                            "expired_at": professor.grace_period_until,
                            "baseline_plan": self.baseline_plan,
                        }),
                    )
                    .await;
            }
        }

        if !report.downgraded.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                downgraded = report.downgraded.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "Grace period sweep finished"
            );
        }

        Ok(report)
    }

    /// Runs one sweep if this instance holds the sweep lease; None when another
    /// instance holds it.
    pub async fn run_exclusive_sweep(&self) -> Result<Option<SweepReport>> {
        let acquired = self
            .lease_repo
            .try_acquire(SWEEP_LEASE, &self.instance_id, self.lease_ttl, Utc::now())
            .await?;

        if !acquired {
            tracing::debug!(instance_id = %self.instance_id, "Grace sweep lease held elsewhere");
            return Ok(None);
        }

        let result = self.sweep_expired_grace_periods().await;

        if let Err(e) = self.lease_repo.release(SWEEP_LEASE, &self.instance_id).await {
            tracing::warn!(error = %e, "Failed to release grace sweep lease; it will expire");
        }

        result.map(Some)
    }

    pub fn spawn_sweeper(self: Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(instance_id = %self.instance_id, "Grace period sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_exclusive_sweep().await {
                    tracing::error!(error = %e, "Grace period sweep failed");
                }
            }
        })
    }
}
