pub mod audit_service;
pub mod capacity_service;
pub mod grace_period_service;
pub mod payment_service;
pub mod plan_service;
pub mod webhook_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use uuid::Uuid;
use crate::config::Settings;
use crate::payments::PaymentGateway;
use crate::repository::*;

pub use audit_service::{AuditService, AuditWrite};
pub use capacity_service::CapacityService;
pub use grace_period_service::{GracePeriodService, SweepReport};
pub use payment_service::{PaymentService, ReprocessResult, ResolverSettings};
pub use plan_service::PlanService;
pub use webhook_service::WebhookService;

pub struct ServiceContext {
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub professor_repo: Arc<dyn ProfessorRepository>,
    pub enrollment_repo: Arc<dyn EnrollmentRepository>,
    pub audit_service: Arc<AuditService>,
    pub capacity_service: Arc<CapacityService>,
    pub plan_service: Arc<PlanService>,
    pub grace_period_service: Arc<GracePeriodService>,
    pub payment_service: Arc<PaymentService>,
    pub webhook_service: Arc<WebhookService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        gateway: Option<Arc<dyn PaymentGateway>>,
        settings: &Settings,
    ) -> Self {
        let payment_repo: Arc<dyn PaymentRepository> =
            Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let professor_repo: Arc<dyn ProfessorRepository> =
            Arc::new(SqliteProfessorRepository::new(db_pool.clone()));
        let plan_repo: Arc<dyn PlanRepository> =
            Arc::new(SqlitePlanRepository::new(db_pool.clone()));
        let enrollment_repo: Arc<dyn EnrollmentRepository> =
            Arc::new(SqliteEnrollmentRepository::new(db_pool.clone()));
        let webhook_repo: Arc<dyn WebhookEventRepository> =
            Arc::new(SqliteWebhookEventRepository::new(db_pool.clone()));
        let audit_repo: Arc<dyn AuditRepository> =
            Arc::new(SqliteAuditRepository::new(db_pool.clone()));
        let lease_repo: Arc<dyn LeaseRepository> =
            Arc::new(SqliteLeaseRepository::new(db_pool.clone()));
        let lesson_repo: Arc<dyn LessonScheduleRepository> =
            Arc::new(SqliteLessonScheduleRepository::new(db_pool.clone()));

        let audit_service = Arc::new(AuditService::new(audit_repo));
        let capacity_service = Arc::new(CapacityService::new(
            enrollment_repo.clone(),
            professor_repo.clone(),
            audit_service.clone(),
        ));
        let plan_service = Arc::new(PlanService::new(
            plan_repo,
            professor_repo.clone(),
            capacity_service.clone(),
            audit_service.clone(),
        ));

        let instance_id = settings
            .scheduler
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let grace_period_service = Arc::new(GracePeriodService::new(
            professor_repo.clone(),
            lease_repo,
            plan_service.clone(),
            audit_service.clone(),
            settings.plans.baseline_plan.clone(),
            chrono::Duration::seconds(settings.scheduler.lease_ttl_secs),
            instance_id,
        ));

        let payment_service = Arc::new(PaymentService::new(
            payment_repo.clone(),
            lesson_repo,
            plan_service.clone(),
            grace_period_service.clone(),
            audit_service.clone(),
            gateway.clone(),
            ResolverSettings {
                baseline_plan: settings.plans.baseline_plan.clone(),
                default_grace_days: settings.plans.default_grace_days,
                checkout_success_url: settings.gateway.checkout_success_url.clone(),
            },
        ));
        let webhook_service = Arc::new(WebhookService::new(
            webhook_repo,
            payment_repo.clone(),
            payment_service.clone(),
            gateway,
            settings.gateway.webhook_secret.clone(),
        ));

        Self {
            payment_repo,
            professor_repo,
            enrollment_repo,
            audit_service,
            capacity_service,
            plan_service,
            grace_period_service,
            payment_service,
            webhook_service,
            db_pool,
        }
    }
}
