mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{sorted, TestApp};
use uuid::Uuid;
use studioledger::{
    domain::{
        AppliedPlanChange, CreateProfessorRequest, PlanAssignment, PlanChangeOptions,
        PlanChangeOutcome, Professor, SkipReason, SuspensionReason,
    },
    error::{AppError, Result},
    repository::{
        ProfessorRepository, SqliteAuditRepository, SqliteEnrollmentRepository,
        SqlitePlanRepository, SqliteProfessorRepository,
    },
    service::{AuditService, CapacityService, PlanService},
};

/// Reads professors one version behind the store, as if another writer
/// always committed between the read and the plan update.
struct LaggingProfessors {
    inner: SqliteProfessorRepository,
}

#[async_trait]
impl ProfessorRepository for LaggingProfessors {
    async fn create(&self, request: CreateProfessorRequest) -> Result<Professor> {
        self.inner.create(request).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Professor>> {
        Ok(self.inner.find_by_id(id).await?.map(|mut p| {
            p.version -= 1;
            p
        }))
    }

    async fn update_plan(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<Professor>> {
        self.inner.update_plan(id, expected_version, assignment).await
    }

    async fn apply_plan_change(
        &self,
        id: Uuid,
        expected_version: i64,
        assignment: PlanAssignment,
    ) -> Result<Option<AppliedPlanChange>> {
        self.inner.apply_plan_change(id, expected_version, assignment).await
    }

    async fn clear_manual_override(&self, id: Uuid) -> Result<Professor> {
        self.inner.clear_manual_override(id).await
    }

    async fn set_grace_period(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<Professor> {
        self.inner.set_grace_period(id, until).await
    }

    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> Result<Vec<Professor>> {
        self.inner.list_expired_grace_periods(now).await
    }

    async fn clear_expired_grace_period(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.inner.clear_expired_grace_period(id, now).await
    }
}

fn manual(actor: Uuid) -> PlanChangeOptions {
    PlanChangeOptions {
        automatic: false,
        payment_id: None,
        actor_id: Some(actor),
    }
}

#[tokio::test]
async fn scenario_downgrade_then_partial_upgrade() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    app.add_plan("limit10", 10).await?;
    app.add_plan("limit8", 8).await?;
    app.add_plan("limit11", 11).await?;
    let professor = app.create_professor("limit10", 10).await?;
    let t = app.enroll_students(professor.id, 12).await?;
    let admin = Uuid::new_v4();

    let outcome = app.ctx.plan_service.change_plan(professor.id, "limit8", manual(admin)).await?;
    let PlanChangeOutcome::Changed { suspended, reactivated, .. } = outcome else {
        panic!("expected the downgrade to apply");
    };
    assert_eq!(sorted(&suspended), sorted(&t[8..12]));
    assert!(reactivated.is_empty());
    assert_eq!(app.active_ids(professor.id).await?, t[0..8].to_vec());

    let enrollments = app.ctx.capacity_service.list_enrollments(professor.id).await?;
    for e in enrollments.iter().filter(|e| !e.active) {
        assert_eq!(e.suspended_reason, Some(SuspensionReason::PlanDowngrade));
        assert!(e.suspended_at.is_some());
    }

    let outcome = app.ctx.plan_service.change_plan(professor.id, "limit11", manual(admin)).await?;
    let PlanChangeOutcome::Changed { suspended, reactivated, .. } = outcome else {
        panic!("expected the upgrade to apply");
    };
    assert!(suspended.is_empty());
    assert_eq!(sorted(&reactivated), sorted(&t[8..11]));
    assert_eq!(app.active_ids(professor.id).await?, t[0..11].to_vec());

    let last = app.ctx.enrollment_repo.find_by_id(t[11]).await?.expect("T12 exists");
    assert!(!last.active);
    assert_eq!(last.suspended_reason, Some(SuspensionReason::PlanDowngrade));

    Ok(())
}

#[tokio::test]
async fn downgrade_suspends_exactly_the_newest_excess() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    let t = app.enroll_students(professor.id, 9).await?;

    let outcome = app
        .ctx
        .plan_service
        .change_plan(professor.id, "free", PlanChangeOptions { automatic: true, ..Default::default() })
        .await?;

    let PlanChangeOutcome::Changed { professor: updated, suspended, .. } = outcome else {
        panic!("expected the downgrade to apply");
    };
    assert_eq!(updated.plan_name, "free");
    assert_eq!(updated.student_limit, 5);
    assert_eq!(updated.version, professor.version + 1);
    assert_eq!(sorted(&suspended), sorted(&t[5..9]));
    assert_eq!(app.active_ids(professor.id).await?, t[0..5].to_vec());

    let actions = app.audit_actions("professor", professor.id).await?;
    assert!(actions.contains(&"plan.changed".to_string()));
    assert!(actions.contains(&"enrollments.suspended".to_string()));

    Ok(())
}

#[tokio::test]
async fn downgrade_within_limit_suspends_nobody() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("pro", 40).await?;
    app.enroll_students(professor.id, 4).await?;

    let outcome = app
        .ctx
        .plan_service
        .change_plan(professor.id, "free", PlanChangeOptions { automatic: true, ..Default::default() })
        .await?;

    assert!(matches!(outcome, PlanChangeOutcome::Changed { ref suspended, .. } if suspended.is_empty()));
    assert_eq!(app.active_ids(professor.id).await?.len(), 4);

    Ok(())
}

#[tokio::test]
async fn reactivation_prefers_the_earliest_suspended() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 10).await?;
    let t = app.enroll_students(professor.id, 10).await?;
    let repo = &app.ctx.enrollment_repo;
    let earlier = Utc::now() - Duration::hours(2);
    let later = Utc::now() - Duration::hours(1);

    // T9 and T10 go first, then T6..T8 in a second, deeper downgrade.
    let first = repo.suspend_excess(professor.id, 8, SuspensionReason::PlanDowngrade, earlier).await?;
    assert_eq!(sorted(&first), sorted(&t[8..10]));
    let second = repo.suspend_excess(professor.id, 5, SuspensionReason::PlanDowngrade, later).await?;
    assert_eq!(sorted(&second), sorted(&t[5..8]));

    // Two free slots: limit 7, five active.
    app.ctx
        .professor_repo
        .update_plan(
            professor.id,
            professor.version,
            PlanAssignment {
                plan_name: "basic".to_string(),
                student_limit: 7,
                manual_plan_override: false,
                changed_by: None,
                changed_at: Utc::now(),
            },
        )
        .await?
        .expect("version matches");

    let reactivated = app.ctx.capacity_service.reactivate(professor.id).await?;
    assert_eq!(sorted(&reactivated), sorted(&t[8..10]));
    assert_eq!(app.active_ids(professor.id).await?.len(), 7);

    Ok(())
}

#[tokio::test]
async fn bulk_reactivation_leaves_manual_suspensions_alone() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("free", 5).await?;
    let t = app.enroll_students(professor.id, 5).await?;

    app.ctx.capacity_service.suspend_one(t[4], Some(Uuid::new_v4())).await?;
    let reactivated = app.ctx.capacity_service.reactivate(professor.id).await?;

    assert!(reactivated.is_empty());
    let manual = app.ctx.enrollment_repo.find_by_id(t[4]).await?.expect("exists");
    assert!(!manual.active);
    assert_eq!(manual.suspended_reason, Some(SuspensionReason::Manual));

    Ok(())
}

#[tokio::test]
async fn single_reactivation_requires_a_free_slot() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("free", 5).await?;
    let t = app.enroll_students(professor.id, 6).await?;
    let operator = Some(Uuid::new_v4());

    app.ctx.capacity_service.suspend_one(t[5], operator).await?;
    let refused = app.ctx.capacity_service.reactivate_one(t[5], operator).await;
    assert!(matches!(refused, Err(AppError::Conflict(_))));
    assert_eq!(app.active_ids(professor.id).await?.len(), 5);

    app.ctx.capacity_service.suspend_one(t[0], operator).await?;
    let back = app.ctx.capacity_service.reactivate_one(t[5], operator).await?;
    assert!(back.active);
    assert!(back.suspended_reason.is_none());
    assert!(back.suspended_at.is_none());
    assert_eq!(app.active_ids(professor.id).await?.len(), 5);

    Ok(())
}

#[tokio::test]
async fn enroll_is_refused_at_the_limit() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("free", 5).await?;
    let t = app.enroll_students(professor.id, 5).await?;

    let refused = app.ctx.capacity_service.enroll(professor.id, "Bruno".to_string(), None).await;
    assert!(matches!(refused, Err(AppError::Conflict(_))));

    app.ctx.capacity_service.suspend_one(t[2], None).await?;
    let enrolled = app.ctx.capacity_service.enroll(professor.id, "Bruno".to_string(), None).await?;
    assert!(enrolled.active);
    assert_eq!(app.active_ids(professor.id).await?.len(), 5);

    let missing = app.ctx.capacity_service.enroll(Uuid::new_v4(), "Bruno".to_string(), None).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn automatic_change_never_overrides_an_operator_plan() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    app.enroll_students(professor.id, 10).await?;
    let admin = Uuid::new_v4();

    app.ctx.plan_service.change_plan(professor.id, "pro", manual(admin)).await?;
    let chosen = app.ctx.plan_service.get_professor(professor.id).await?;
    assert!(chosen.manual_plan_override);

    let outcome = app
        .ctx
        .plan_service
        .change_plan(professor.id, "free", PlanChangeOptions { automatic: true, ..Default::default() })
        .await?;
    assert!(matches!(outcome, PlanChangeOutcome::Skipped { reason: SkipReason::ManualOverride }));

    let unchanged = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(unchanged.plan_name, "pro");
    assert_eq!(unchanged.version, chosen.version);
    assert_eq!(app.active_ids(professor.id).await?.len(), 10);

    app.ctx.plan_service.clear_manual_override(professor.id, Some(admin)).await?;
    let outcome = app
        .ctx
        .plan_service
        .change_plan(professor.id, "free", PlanChangeOptions { automatic: true, ..Default::default() })
        .await?;
    assert!(matches!(outcome, PlanChangeOutcome::Changed { .. }));
    assert_eq!(app.active_ids(professor.id).await?.len(), 5);

    Ok(())
}

#[tokio::test]
async fn unknown_plan_is_not_found() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;

    let result = app
        .ctx
        .plan_service
        .change_plan(professor.id, "gold", manual(Uuid::new_v4()))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn stale_version_loses_the_plan_update() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    let assignment = PlanAssignment {
        plan_name: "pro".to_string(),
        student_limit: 40,
        manual_plan_override: false,
        changed_by: None,
        changed_at: Utc::now(),
    };

    let won = app.ctx.professor_repo.update_plan(professor.id, professor.version, assignment.clone()).await?;
    assert!(won.is_some());
    let lost = app.ctx.professor_repo.update_plan(professor.id, professor.version, assignment).await?;
    assert!(lost.is_none());

    Ok(())
}

#[tokio::test]
async fn plan_registry_lists_active_plans() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let plans = app.ctx.plan_service.list_plans().await?;
    let names: Vec<_> = plans.iter().map(|p| p.name.as_str()).collect();
    for expected in ["free", "basic", "pro", "premium"] {
        assert!(names.contains(&expected), "missing {expected}");
    }

    let premium = app.ctx.plan_service.get_plan("premium").await?;
    assert_eq!(premium.student_limit, 100);
    assert!(premium.has_feature("whatsapp"));

    Ok(())
}

#[tokio::test]
async fn lost_plan_update_leaves_the_roster_untouched() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    let t = app.enroll_students(professor.id, 12).await?;

    let professors: Arc<dyn ProfessorRepository> = Arc::new(LaggingProfessors {
        inner: SqliteProfessorRepository::new(app.pool.clone()),
    });
    let audit = Arc::new(AuditService::new(Arc::new(SqliteAuditRepository::new(app.pool.clone()))));
    let capacity = Arc::new(CapacityService::new(
        Arc::new(SqliteEnrollmentRepository::new(app.pool.clone())),
        professors.clone(),
        audit.clone(),
    ));
    let plans = PlanService::new(
        Arc::new(SqlitePlanRepository::new(app.pool.clone())),
        professors,
        capacity,
        audit,
    );

    let result = plans
        .change_plan(professor.id, "free", PlanChangeOptions { automatic: true, ..Default::default() })
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stored = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(stored.plan_name, "basic");
    assert_eq!(stored.student_limit, 15);
    assert_eq!(stored.version, professor.version);
    assert_eq!(app.active_ids(professor.id).await?, t);
    assert!(!app
        .audit_actions("professor", professor.id)
        .await?
        .contains(&"enrollments.suspended".to_string()));

    Ok(())
}

#[tokio::test]
async fn plan_change_with_stale_version_writes_nothing() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    let t = app.enroll_students(professor.id, 8).await?;
    let assignment = PlanAssignment {
        plan_name: "free".to_string(),
        student_limit: 5,
        manual_plan_override: false,
        changed_by: None,
        changed_at: Utc::now(),
    };

    let lost = app
        .ctx
        .professor_repo
        .apply_plan_change(professor.id, professor.version + 1, assignment.clone())
        .await?;
    assert!(lost.is_none());
    assert_eq!(app.active_ids(professor.id).await?, t);

    let applied = app
        .ctx
        .professor_repo
        .apply_plan_change(professor.id, professor.version, assignment)
        .await?
        .expect("current version wins");
    assert_eq!(applied.student_count, 8);
    assert_eq!(sorted(&applied.suspended), sorted(&t[5..8]));
    assert!(applied.reactivated.is_empty());
    assert_eq!(applied.professor.student_limit, 5);
    assert_eq!(applied.professor.version, professor.version + 1);

    Ok(())
}

#[tokio::test]
async fn capacity_suspend_excess_is_audited() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    let t = app.enroll_students(professor.id, 6).await?;

    let suspended = app.ctx.capacity_service.suspend_excess(professor.id, 4).await?;

    assert_eq!(sorted(&suspended), sorted(&t[4..6]));
    assert_eq!(app.active_ids(professor.id).await?, t[0..4].to_vec());
    assert!(app
        .audit_actions("professor", professor.id)
        .await?
        .contains(&"enrollments.suspended".to_string()));

    Ok(())
}
