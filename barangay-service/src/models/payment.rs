//! Payment model for barangay-service.

use crate::services::error::WorkflowError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let status = Self::from_string(s);
        (status.as_str() == s).then_some(status)
    }

    /// Terminal states that can never be settled.
    pub fn is_closed(&self) -> bool {
        matches!(self, PaymentStatus::Cancelled | PaymentStatus::Refunded)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }
}

/// How a payment was collected. `Unspecified` is stored as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(rename = "")]
    Unspecified,
    Cash,
    Gcash,
    BankTransfer,
    Online,
    Card,
    CompletedCertificate,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Unspecified => "",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Gcash => "gcash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
            PaymentMethod::Card => "card",
            PaymentMethod::CompletedCertificate => "completed_certificate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(PaymentMethod::Unspecified),
            "cash" => Some(PaymentMethod::Cash),
            "gcash" => Some(PaymentMethod::Gcash),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "online" => Some(PaymentMethod::Online),
            "card" => Some(PaymentMethod::Card),
            "completed_certificate" => Some(PaymentMethod::CompletedCertificate),
            _ => None,
        }
    }

    /// Parses user input, rejecting anything outside the accepted set.
    pub fn from_input(s: &str) -> Result<Self, WorkflowError> {
        Self::parse(s.trim())
            .ok_or_else(|| WorkflowError::validation(format!("Invalid payment method: {}", s)))
    }
}

/// Amount components of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaymentAmounts {
    pub amount: Decimal,
    pub additional_fees: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
}

impl PaymentAmounts {
    /// `amount + additional_fees + tax_amount - discount_amount`, floored at zero.
    /// Mirrors the generated `total_amount` column.
    pub fn total(&self) -> Decimal {
        let total = self.amount + self.additional_fees + self.tax_amount - self.discount_amount;
        total.max(Decimal::ZERO)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        let components = [
            ("amount", self.amount),
            ("additional_fees", self.additional_fees),
            ("discount_amount", self.discount_amount),
            ("tax_amount", self.tax_amount),
        ];
        for (name, value) in components {
            if value < Decimal::ZERO {
                return Err(WorkflowError::invalid_amount(format!(
                    "{} must not be negative",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// A fee payment, either auto-created for a certificate or recorded at the counter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub receipt_number: Option<String>,
    pub reference_number: Option<String>,
    pub resident_id: Uuid,
    pub certificate_id: Option<Uuid>,
    pub payer_name: String,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub service_type: String,
    pub service_description: Option<String>,
    pub amount: Decimal,
    pub additional_fees: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_category: String,
    pub is_certificate_payment: bool,
    pub moved_to_payment_list: bool,
    pub moved_to_payment_list_date: Option<DateTime<Utc>>,
    pub refund_amount: Decimal,
    pub refund_reason: Option<String>,
    pub refund_date: Option<DateTime<Utc>>,
    pub refunded_by: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

pub const PAYMENT_COLUMNS: &str = "payment_id, payment_number, receipt_number, reference_number, \
    resident_id, certificate_id, payer_name, payer_email, payer_phone, service_type, \
    service_description, amount, additional_fees, discount_amount, tax_amount, total_amount, \
    currency, payment_method, payment_status, payment_category, is_certificate_payment, \
    moved_to_payment_list, moved_to_payment_list_date, refund_amount, refund_reason, refund_date, \
    refunded_by, due_date, payment_date, processed_by, processed_at, notes, created_by, \
    updated_by, created_utc, updated_utc";

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }

    pub fn set_status(&mut self, status: PaymentStatus) {
        self.payment_status = status.as_str().to_string();
    }

    pub fn amounts(&self) -> PaymentAmounts {
        PaymentAmounts {
            amount: self.amount,
            additional_fees: self.additional_fees,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
        }
    }

    pub fn set_amounts(&mut self, amounts: PaymentAmounts) {
        self.amount = amounts.amount;
        self.additional_fees = amounts.additional_fees;
        self.discount_amount = amounts.discount_amount;
        self.tax_amount = amounts.tax_amount;
        self.total_amount = amounts.total();
    }

    pub fn is_paid(&self) -> bool {
        self.status() == PaymentStatus::Paid
    }

    pub fn is_pending(&self) -> bool {
        self.status() == PaymentStatus::Pending
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.due_date.is_some_and(|due| due < now)
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        match self.due_date {
            Some(due) if self.is_overdue(now) => (now - due).num_days(),
            _ => 0,
        }
    }

    pub fn is_ready_for_payment_list(&self) -> bool {
        self.is_certificate_payment
            && self.moved_to_payment_list
            && matches!(self.status(), PaymentStatus::Pending | PaymentStatus::Paid)
    }

    pub fn move_to_payment_list(&mut self, now: DateTime<Utc>) -> bool {
        if self.moved_to_payment_list {
            return false;
        }
        self.moved_to_payment_list = true;
        self.moved_to_payment_list_date = Some(now);
        true
    }

    /// Validates a refund against this payment and returns the new refund state.
    pub fn plan_refund(&self, amount: Decimal) -> Result<RefundPlan, WorkflowError> {
        if amount <= Decimal::ZERO {
            return Err(WorkflowError::invalid_amount(
                "Refund amount must be greater than zero",
            ));
        }
        if self.status() == PaymentStatus::Refunded {
            return Err(WorkflowError::invalid_state("Payment is already refunded"));
        }

        if amount > self.total_amount {
            return Err(WorkflowError::invalid_amount(format!(
                "Refund of {} exceeds payment total of {}",
                amount, self.total_amount
            )));
        }

        Ok(RefundPlan {
            refund_amount: amount,
            fully_refunded: amount == self.total_amount,
        })
    }
}

/// Outcome of a validated refund. Each refund replaces the recorded amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPlan {
    pub refund_amount: Decimal,
    pub fully_refunded: bool,
}

/// Aggregates shown on the payment dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentStats {
    pub total_payments: i64,
    pub paid_count: i64,
    pub pending_count: i64,
    pub failed_count: i64,
    pub refunded_count: i64,
    pub total_revenue: Decimal,
    pub month_revenue: Decimal,
    pub pending_total: Decimal,
    pub overdue_count: i64,
}
