use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::{
    config::GatewayConfig,
    error::{AppError, Result},
    payments::{Checkout, CheckoutRequest, GatewayPayment, PaymentGateway},
};

pub struct MercadoPagoClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    status: String,
    external_reference: Option<String>,
    date_approved: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PaymentResponse>,
}

impl From<PaymentResponse> for GatewayPayment {
    fn from(p: PaymentResponse) -> Self {
        let id = match p.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            id,
            status: p.status,
            external_reference: p.external_reference,
            date_approved: p.date_approved,
        }
    }
}

impl MercadoPagoClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let access_token = config.access_token.clone().ok_or_else(|| {
            AppError::Internal("Gateway enabled but no access token configured".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(5)))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout> {
        let body = json!({
            "items": [{
                "title": request.title,
                "quantity": 1,
                "currency_id": "BRL",
                "unit_price": request.amount_cents as f64 / 100.0,
            }],
            "external_reference": request.external_reference,
            "back_urls": { "success": request.success_url },
            "auto_return": "approved",
        });

        let preference: PreferenceResponse = self
            .client
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &request.external_reference)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let checkout_url = preference
            .init_point
            .ok_or_else(|| AppError::External("No checkout URL returned".to_string()))?;

        tracing::debug!(
            preference_id = %preference.id,
            external_reference = %request.external_reference,
            "Created gateway checkout"
        );

        Ok(Checkout {
            preference_id: preference.id,
            checkout_url,
        })
    }

    async fn fetch_payment(&self, gateway_payment_id: &str) -> Result<GatewayPayment> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.base_url, gateway_payment_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Gateway payment {} not found",
                gateway_payment_id
            )));
        }

        let payment: PaymentResponse = response.error_for_status()?.json().await?;
        Ok(payment.into())
    }

    async fn search_by_external_reference(&self, reference: &str) -> Result<Vec<GatewayPayment>> {
        let search: SearchResponse = self
            .client
            .get(format!("{}/v1/payments/search", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[
                ("external_reference", reference),
                ("sort", "date_created"),
                ("criteria", "desc"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(search.results.into_iter().map(Into::into).collect())
    }
}
