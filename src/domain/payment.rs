use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub professor_id: Uuid,
    /// None for subscription charges billed to the professor.
    pub student_id: Option<Uuid>,
    pub amount_cents: i64,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub precedence: Precedence,
    pub eligible_to_schedule: bool,
    pub gateway_payment_id: Option<String>,
    pub checkout_url: Option<String>,
    /// Set when settling this charge moves the professor to a plan.
    pub plan_name: Option<String>,
    pub manual_reason: Option<String>,
    pub manual_actor: Option<Uuid>,
    pub manual_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Status as presented to readers; see [`effective_status`].
    pub fn effective_status(&self, now: DateTime<Utc>) -> PaymentStatus {
        effective_status(self.status, self.due_date, now)
    }
}

/// `atrasado` is never stored: a `pendente` payment past its due date reads as overdue.
pub fn effective_status(
    status: PaymentStatus,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PaymentStatus {
    match status {
        PaymentStatus::Pendente if due_date < now => PaymentStatus::Atrasado,
        other => other,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pendente,
    Pago,
    Atrasado,
    Cancelado,
    Reembolsado,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pendente => "pendente",
            PaymentStatus::Pago => "pago",
            PaymentStatus::Atrasado => "atrasado",
            PaymentStatus::Cancelado => "cancelado",
            PaymentStatus::Reembolsado => "reembolsado",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pendente" => Some(PaymentStatus::Pendente),
            "pago" => Some(PaymentStatus::Pago),
            "atrasado" => Some(PaymentStatus::Atrasado),
            "cancelado" => Some(PaymentStatus::Cancelado),
            "reembolsado" => Some(PaymentStatus::Reembolsado),
            _ => None,
        }
    }
}

/// Which class of actor last authoritatively set a payment's status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    Automatic,
    Manual,
    Refunded,
    Cancelled,
    Chargeback,
}

impl Precedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precedence::Automatic => "automatic",
            Precedence::Manual => "manual",
            Precedence::Refunded => "refunded",
            Precedence::Cancelled => "cancelled",
            Precedence::Chargeback => "chargeback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(Precedence::Automatic),
            "manual" => Some(Precedence::Manual),
            "refunded" => Some(Precedence::Refunded),
            "cancelled" => Some(Precedence::Cancelled),
            "chargeback" => Some(Precedence::Chargeback),
            _ => None,
        }
    }
}

/// Raw payment status reported by the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewaySignal {
    Approved,
    Pending,
    InProcess,
    Cancelled,
    Refunded,
    ChargedBack,
}

/// Field values a signal writes onto a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub status: PaymentStatus,
    pub eligible_to_schedule: bool,
    /// None leaves the current precedence in place.
    pub precedence: Option<Precedence>,
    pub sets_paid_at: bool,
}

impl GatewaySignal {
    /// Returns None for statuses the engine does not act on (`rejected`, `authorized`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(GatewaySignal::Approved),
            "pending" => Some(GatewaySignal::Pending),
            "in_process" => Some(GatewaySignal::InProcess),
            "cancelled" => Some(GatewaySignal::Cancelled),
            "refunded" => Some(GatewaySignal::Refunded),
            "charged_back" => Some(GatewaySignal::ChargedBack),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewaySignal::Approved => "approved",
            GatewaySignal::Pending => "pending",
            GatewaySignal::InProcess => "in_process",
            GatewaySignal::Cancelled => "cancelled",
            GatewaySignal::Refunded => "refunded",
            GatewaySignal::ChargedBack => "charged_back",
        }
    }

    /// Terminal signals override a manual mark; the others never do.
    pub fn overrides_manual(&self) -> bool {
        matches!(
            self,
            GatewaySignal::Cancelled | GatewaySignal::Refunded | GatewaySignal::ChargedBack
        )
    }

    pub fn transition(&self) -> StatusTransition {
        match self {
            GatewaySignal::Approved => StatusTransition {
                status: PaymentStatus::Pago,
                eligible_to_schedule: true,
                precedence: Some(Precedence::Automatic),
                sets_paid_at: true,
            },
            GatewaySignal::Pending | GatewaySignal::InProcess => StatusTransition {
                status: PaymentStatus::Pendente,
                eligible_to_schedule: false,
                precedence: None,
                sets_paid_at: false,
            },
            GatewaySignal::Cancelled => StatusTransition {
                status: PaymentStatus::Cancelado,
                eligible_to_schedule: false,
                precedence: Some(Precedence::Cancelled),
                sets_paid_at: false,
            },
            GatewaySignal::Refunded => StatusTransition {
                status: PaymentStatus::Cancelado,
                eligible_to_schedule: false,
                precedence: Some(Precedence::Refunded),
                sets_paid_at: false,
            },
            GatewaySignal::ChargedBack => StatusTransition {
                status: PaymentStatus::Cancelado,
                eligible_to_schedule: false,
                precedence: Some(Precedence::Chargeback),
                sets_paid_at: false,
            },
        }
    }
}

/// Outcome of running a signal through the resolver.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Applied {
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    SkippedDueToManualOverride {
        status: PaymentStatus,
    },
    IgnoredSignal {
        raw_status: String,
    },
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateChargeRequest {
    pub professor_id: Uuid,
    pub student_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub amount_cents: i64,
    #[validate(length(min = 1, max = 255))]
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub plan_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MarkAsPaidRequest {
    #[validate(length(min = 3, max = 500))]
    pub reason: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancelPaymentRequest {
    #[validate(length(min = 3, max = 500))]
    pub reason: String,
}
