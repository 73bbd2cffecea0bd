#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use studioledger::{
    config::Settings,
    domain::{CreateProfessorRequest, NewEnrollment, Payment, PaymentStatus, Precedence, Professor},
    error::{AppError, Result},
    payments::{Checkout, CheckoutRequest, GatewayPayment, PaymentGateway},
    service::ServiceContext,
};

pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// In-memory SQLite with migrations applied. A single connection keeps every
/// query on the same database.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.operator_token = OPERATOR_TOKEN.to_string();
    settings.scheduler.instance_id = Some("test-instance".to_string());
    settings
}

/// Scriptable stand-in for the payment gateway.
#[derive(Default)]
pub struct FakeGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    unavailable: AtomicBool,
    pub checkouts: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_payment(&self, id: &str, status: &str, external_reference: Option<Uuid>) {
        let mut payments = self.payments.lock().unwrap();
        payments.insert(
            id.to_string(),
            GatewayPayment {
                id: id.to_string(),
                status: status.to_string(),
                external_reference: external_reference.map(|r| r.to_string()),
                date_approved: None,
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable("gateway timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout> {
        self.check_available()?;
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(Checkout {
            preference_id: format!("pref-{}", request.external_reference),
            checkout_url: format!("https://gateway.test/checkout/{}", request.external_reference),
        })
    }

    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.payments
            .lock()
            .unwrap()
            .get(gateway_payment_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("payment not found at gateway".to_string()))
    }

    async fn search_by_external_reference(&self, reference: &str) -> Result<Vec<GatewayPayment>> {
        self.check_available()?;
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.external_reference.as_deref() == Some(reference))
            .cloned()
            .collect())
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub ctx: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
    pub settings: Settings,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_settings(settings: Settings) -> anyhow::Result<Self> {
        let pool = test_pool().await?;
        let gateway = FakeGateway::new();
        let ctx = Arc::new(ServiceContext::new(
            pool.clone(),
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
            &settings,
        ));

        Ok(Self { pool, ctx, gateway, settings })
    }

    /// A service context with no gateway configured.
    pub async fn without_gateway() -> anyhow::Result<Self> {
        let settings = test_settings();
        let pool = test_pool().await?;
        let ctx = Arc::new(ServiceContext::new(pool.clone(), None, &settings));
        Ok(Self { pool, ctx, gateway: FakeGateway::new(), settings })
    }

    /// Registers an extra plan with an arbitrary limit.
    pub async fn add_plan(&self, name: &str, student_limit: i64) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO plans (name, display_name, monthly_price_cents, student_limit) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(name)
        .bind(student_limit * 100)
        .bind(student_limit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_professor(&self, plan_name: &str, student_limit: i64) -> anyhow::Result<Professor> {
        let professor = self
            .ctx
            .professor_repo
            .create(CreateProfessorRequest {
                name: "Ana Souza".to_string(),
                email: format!("prof-{}@example.com", Uuid::new_v4().simple()),
                plan_name: plan_name.to_string(),
                student_limit,
            })
            .await?;
        Ok(professor)
    }

    /// Creates `count` active enrollments, oldest first, one minute apart.
    pub async fn enroll_students(&self, professor_id: Uuid, count: usize) -> anyhow::Result<Vec<Uuid>> {
        let base = Utc::now() - Duration::days(1);
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let enrollment = self
                .ctx
                .enrollment_repo
                .create(NewEnrollment {
                    professor_id,
                    student_name: format!("T{}", i + 1),
                    created_at: Some(base + Duration::minutes(i as i64)),
                })
                .await?;
            ids.push(enrollment.id);
        }
        Ok(ids)
    }

    pub async fn create_payment(
        &self,
        professor_id: Uuid,
        plan_name: Option<&str>,
        due_date: DateTime<Utc>,
    ) -> anyhow::Result<Payment> {
        let now = Utc::now();
        let payment = self
            .ctx
            .payment_repo
            .create(Payment {
                id: Uuid::new_v4(),
                professor_id,
                student_id: None,
                amount_cents: 15_000,
                description: "Mensalidade".to_string(),
                due_date,
                paid_at: None,
                status: PaymentStatus::Pendente,
                precedence: Precedence::Automatic,
                eligible_to_schedule: false,
                gateway_payment_id: None,
                checkout_url: None,
                plan_name: plan_name.map(str::to_string),
                manual_reason: None,
                manual_actor: None,
                manual_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(payment)
    }

    pub async fn active_ids(&self, professor_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        Ok(self
            .ctx
            .capacity_service
            .list_enrollments(professor_id)
            .await?
            .into_iter()
            .filter(|e| e.active)
            .map(|e| e.id)
            .collect())
    }

    pub async fn ledger_count(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn audit_actions(&self, entity_type: &str, entity_id: Uuid) -> anyhow::Result<Vec<String>> {
        Ok(self
            .ctx
            .audit_service
            .list_for_entity(entity_type, &entity_id.to_string())
            .await?
            .into_iter()
            .map(|e| e.action)
            .collect())
    }
}

/// Gateway notification body in the shape the webhook endpoint receives.
pub fn notification(event_id: Option<&str>, gateway_payment_id: &str) -> Vec<u8> {
    let mut body = serde_json::json!({
        "type": "payment",
        "action": "payment.updated",
        "data": { "id": gateway_payment_id },
    });
    if let Some(id) = event_id {
        body["id"] = serde_json::json!(id);
    }

    serde_json::to_vec(&body).unwrap()
}

/// Sorted copy; `RETURNING` does not guarantee row order.
pub fn sorted(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids
}
