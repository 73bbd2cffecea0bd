use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification body as posted by the gateway. Only `data.id` is read from
/// `data`; status and ownership always come from the gateway API.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayNotification {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub topic: Option<String>,
    pub action: Option<String>,
    pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Ledger natural key: (event type, provider event id, referenced payment id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WebhookEventKey {
    pub event_type: String,
    pub provider_event_id: String,
    pub payment_reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub provider_event_id: String,
    pub payment_reference: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Normalized event handed to the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEventInput {
    pub key: WebhookEventKey,
    pub gateway_payment_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    AlreadyProcessed,
    Forward(ResolvedEventInput),
    Malformed(String),
}

/// What the webhook endpoint did with a delivery; always acknowledged with 200.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookDisposition {
    Processed {
        payment_id: Uuid,
        outcome: super::ResolutionOutcome,
    },
    Duplicate,
    Malformed {
        reason: String,
    },
    UnmatchedPayment {
        gateway_payment_id: String,
    },
}
