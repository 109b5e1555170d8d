//! Audit trail entries written to `system_activities`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CertificateRequest,
    CertificateApproval,
    CertificateRejection,
    CertificateCompleted,
    CertificateCancelled,
    CertificatePayment,
    PaymentReceived,
    PaymentRefund,
    PaymentListSync,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::CertificateRequest => "certificate_request",
            ActivityType::CertificateApproval => "certificate_approval",
            ActivityType::CertificateRejection => "certificate_rejection",
            ActivityType::CertificateCompleted => "certificate_completed",
            ActivityType::CertificateCancelled => "certificate_cancelled",
            ActivityType::CertificatePayment => "certificate_payment",
            ActivityType::PaymentReceived => "payment_received",
            ActivityType::PaymentRefund => "payment_refund",
            ActivityType::PaymentListSync => "payment_list_sync",
        }
    }
}

/// An audit event waiting to be persisted.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub activity_type: ActivityType,
    pub description: String,
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub target_type: Option<&'static str>,
}

impl ActivityEvent {
    /// Event about a certificate, e.g. "Certificate approved: Barangay Clearance for Juan Dela Cruz".
    pub fn certificate(
        activity_type: ActivityType,
        type_name: &str,
        resident_name: &str,
        certificate_id: Uuid,
        actor_id: Uuid,
    ) -> Self {
        let description = match activity_type {
            ActivityType::CertificateRequest => {
                format!("Certificate request: {} for {}", type_name, resident_name)
            }
            ActivityType::CertificateApproval => {
                format!("Certificate approved: {} for {}", type_name, resident_name)
            }
            ActivityType::CertificateRejection => {
                format!("Certificate rejected: {} for {}", type_name, resident_name)
            }
            ActivityType::CertificateCompleted => {
                format!("Certificate completed: {} for {}", type_name, resident_name)
            }
            ActivityType::CertificateCancelled => {
                format!("Certificate cancelled: {} by {}", type_name, resident_name)
            }
            ActivityType::CertificatePayment => {
                format!("Payment received: {} for {}", type_name, resident_name)
            }
            other => format!("Certificate action: {}", other.as_str()),
        };

        Self {
            activity_type,
            description,
            actor_id: Some(actor_id),
            target_id: Some(certificate_id),
            target_type: Some("certificate"),
        }
    }

    /// Event about money moving, e.g. "Payment received: PAY-2025-000001 - ₱50.00 from Juan Dela Cruz".
    pub fn payment(
        activity_type: ActivityType,
        payment_number: &str,
        amount: Decimal,
        payer_name: &str,
        payment_id: Uuid,
        actor_id: Uuid,
    ) -> Self {
        let amount = amount.round_dp(2);
        let description = match activity_type {
            ActivityType::PaymentReceived => format!(
                "Payment received: {} - ₱{:.2} from {}",
                payment_number, amount, payer_name
            ),
            ActivityType::PaymentRefund => format!(
                "Payment refunded: {} - ₱{:.2} to {}",
                payment_number, amount, payer_name
            ),
            other => format!("Payment action: {}", other.as_str()),
        };

        Self {
            activity_type,
            description,
            actor_id: Some(actor_id),
            target_id: Some(payment_id),
            target_type: Some("payment"),
        }
    }

    pub fn payment_list_sync(count: u64, actor_id: Uuid) -> Self {
        Self {
            activity_type: ActivityType::PaymentListSync,
            description: format!("Moved {} completed certificate(s) to the payment list", count),
            actor_id: Some(actor_id),
            target_id: None,
            target_type: None,
        }
    }
}

/// Persisted audit row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemActivity {
    pub activity_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub created_utc: DateTime<Utc>,
}
