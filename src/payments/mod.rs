use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod mercado_pago;
pub mod signature;

pub use mercado_pago::MercadoPagoClient;

/// Payment as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub date_approved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Our payment id; the gateway echoes it back on every payment it creates.
    pub external_reference: String,
    pub title: String,
    pub amount_cents: i64,
    pub success_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub preference_id: String,
    pub checkout_url: String,
}

/// Outbound gateway API. Implementations use bounded timeouts and map transient
/// failures to `AppError::ServiceUnavailable` so callers can retry.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout>;
    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment>;
    async fn search_by_external_reference(&self, reference: &str) -> Result<Vec<GatewayPayment>>;
}
