mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::TestApp;
use uuid::Uuid;
use studioledger::{
    domain::PlanChangeOptions,
    error::AppError,
    repository::{LeaseRepository, SqliteLeaseRepository},
    service::SweepReport,
};

#[tokio::test]
async fn expired_grace_period_downgrades_to_baseline_once() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("pro", 40).await?;
    app.enroll_students(professor.id, 7).await?;
    app.ctx
        .professor_repo
        .set_grace_period(professor.id, Some(Utc::now() - Duration::hours(1)))
        .await?;

    let report = app.ctx.grace_period_service.sweep_expired_grace_periods().await?;
    assert_eq!(report.downgraded, vec![professor.id]);
    assert!(report.failed.is_empty());

    let downgraded = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(downgraded.plan_name, "free");
    assert!(downgraded.grace_period_until.is_none());
    assert_eq!(app.active_ids(professor.id).await?.len(), 5);

    let again = app.ctx.grace_period_service.sweep_expired_grace_periods().await?;
    assert_eq!(again, SweepReport::default());
    let unchanged = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(unchanged.version, downgraded.version);

    let actions = app.audit_actions("professor", professor.id).await?;
    assert_eq!(actions.iter().filter(|a| *a == "grace_period.expired").count(), 1);

    Ok(())
}

#[tokio::test]
async fn running_grace_periods_are_left_alone() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;
    app.ctx.grace_period_service.apply_grace_period(professor.id, 5, Some(Uuid::new_v4())).await?;

    let report = app.ctx.grace_period_service.sweep_expired_grace_periods().await?;
    assert_eq!(report, SweepReport::default());

    let stored = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(stored.plan_name, "basic");
    assert!(stored.grace_period_until.is_some());

    Ok(())
}

#[tokio::test]
async fn manual_plan_survives_an_expired_grace_period() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("free", 5).await?;
    let operator = Uuid::new_v4();
    app.ctx
        .plan_service
        .change_plan(
            professor.id,
            "premium",
            PlanChangeOptions { automatic: false, payment_id: None, actor_id: Some(operator) },
        )
        .await?;
    app.ctx
        .professor_repo
        .set_grace_period(professor.id, Some(Utc::now() - Duration::minutes(5)))
        .await?;

    let report = app.ctx.grace_period_service.sweep_expired_grace_periods().await?;
    assert_eq!(report.skipped, vec![professor.id]);
    assert!(report.downgraded.is_empty());

    let stored = app.ctx.plan_service.get_professor(professor.id).await?;
    assert_eq!(stored.plan_name, "premium");
    assert!(stored.grace_period_until.is_none());

    let again = app.ctx.grace_period_service.sweep_expired_grace_periods().await?;
    assert_eq!(again, SweepReport::default());

    Ok(())
}

#[tokio::test]
async fn grace_period_requires_positive_days_and_a_professor() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("basic", 15).await?;

    let zero = app.ctx.grace_period_service.apply_grace_period(professor.id, 0, None).await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let missing = app.ctx.grace_period_service.apply_grace_period(Uuid::new_v4(), 3, None).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn sweep_lease_admits_one_holder_at_a_time() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let leases = SqliteLeaseRepository::new(app.pool.clone());
    let ttl = Duration::minutes(10);
    let now = Utc::now();

    assert!(leases.try_acquire("sweep", "a", ttl, now).await?);
    assert!(!leases.try_acquire("sweep", "b", ttl, now).await?);
    // The holder may renew.
    assert!(leases.try_acquire("sweep", "a", ttl, now).await?);

    // An expired lease can be taken over.
    assert!(leases.try_acquire("sweep", "b", ttl, now + Duration::minutes(11)).await?);
    assert!(!leases.try_acquire("sweep", "a", ttl, now + Duration::minutes(12)).await?);

    leases.release("sweep", "b").await?;
    assert!(leases.try_acquire("sweep", "a", ttl, now).await?);

    Ok(())
}

#[tokio::test]
async fn exclusive_sweep_yields_to_another_instance() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let professor = app.create_professor("pro", 40).await?;
    app.ctx
        .professor_repo
        .set_grace_period(professor.id, Some(Utc::now() - Duration::hours(1)))
        .await?;

    let leases: Arc<dyn LeaseRepository> = Arc::new(SqliteLeaseRepository::new(app.pool.clone()));
    assert!(
        leases
            .try_acquire("grace_period_sweep", "other-instance", Duration::minutes(10), Utc::now())
            .await?
    );

    assert!(app.ctx.grace_period_service.run_exclusive_sweep().await?.is_none());
    assert_eq!(app.ctx.plan_service.get_professor(professor.id).await?.plan_name, "pro");

    leases.release("grace_period_sweep", "other-instance").await?;
    let report = app.ctx.grace_period_service.run_exclusive_sweep().await?.expect("lease acquired");
    assert_eq!(report.downgraded, vec![professor.id]);

    // The lease is released after the sweep.
    assert!(
        leases
            .try_acquire("grace_period_sweep", "other-instance", Duration::minutes(10), Utc::now())
            .await?
    );

    Ok(())
}
