//! Certificate model and its state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Certificate lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Pending,
    Processing,
    Approved,
    Ready,
    Completed,
    Rejected,
    Claimed,
    Cancelled,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Processing => "processing",
            CertificateStatus::Approved => "approved",
            CertificateStatus::Ready => "ready",
            CertificateStatus::Completed => "completed",
            CertificateStatus::Rejected => "rejected",
            CertificateStatus::Claimed => "claimed",
            CertificateStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "processing" => CertificateStatus::Processing,
            "approved" => CertificateStatus::Approved,
            "ready" => CertificateStatus::Ready,
            "completed" => CertificateStatus::Completed,
            "rejected" => CertificateStatus::Rejected,
            "claimed" => CertificateStatus::Claimed,
            "cancelled" => CertificateStatus::Cancelled,
            _ => CertificateStatus::Pending,
        }
    }

    /// Strict parse for filter input.
    pub fn parse(s: &str) -> Option<Self> {
        let status = Self::from_string(s);
        (status.as_str() == s).then_some(status)
    }

    pub fn can_approve(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Pending | CertificateStatus::Processing
        )
    }

    pub fn can_reject(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Pending
                | CertificateStatus::Processing
                | CertificateStatus::Approved
                | CertificateStatus::Ready
        )
    }

    pub fn can_complete(&self) -> bool {
        *self == CertificateStatus::Approved
    }

    pub fn can_cancel(&self) -> bool {
        *self == CertificateStatus::Pending
    }

    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Pending | CertificateStatus::Processing
        )
    }

    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Pending | CertificateStatus::Rejected
        )
    }

    /// States in which a certificate number must exist.
    pub fn requires_number(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Approved | CertificateStatus::Ready | CertificateStatus::Completed
        )
    }
}

/// Fee status tracked on the certificate side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificatePaymentStatus {
    Unpaid,
    PendingPayment,
    Paid,
}

impl CertificatePaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificatePaymentStatus::Unpaid => "unpaid",
            CertificatePaymentStatus::PendingPayment => "pending_payment",
            CertificatePaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending_payment" => CertificatePaymentStatus::PendingPayment,
            "paid" => CertificatePaymentStatus::Paid,
            _ => CertificatePaymentStatus::Unpaid,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let status = Self::from_string(s);
        (status.as_str() == s).then_some(status)
    }
}

/// A certificate request and its issuance record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Certificate {
    pub certificate_id: Uuid,
    pub certificate_number: Option<String>,
    pub resident_id: Uuid,
    pub certificate_type: String,
    pub purpose: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub fee: Decimal,
    pub payment_status: String,
    pub payment_completed: bool,
    pub moved_to_payment_list: bool,
    pub moved_to_payment_list_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub request_date: DateTime<Utc>,
    pub processed_date: Option<DateTime<Utc>>,
    pub claimed_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

pub const CERTIFICATE_COLUMNS: &str = "certificate_id, certificate_number, resident_id, \
    certificate_type, purpose, status, rejection_reason, fee, payment_status, payment_completed, \
    moved_to_payment_list, moved_to_payment_list_date, notes, processed_by, request_date, \
    processed_date, claimed_date, completed_date, payment_date, created_utc, updated_utc";

impl Certificate {
    pub fn status(&self) -> CertificateStatus {
        CertificateStatus::from_string(&self.status)
    }

    pub fn payment_state(&self) -> CertificatePaymentStatus {
        CertificatePaymentStatus::from_string(&self.payment_status)
    }

    pub fn set_status(&mut self, status: CertificateStatus) {
        self.status = status.as_str().to_string();
    }

    pub fn set_payment_state(&mut self, status: CertificatePaymentStatus) {
        self.payment_status = status.as_str().to_string();
    }

    /// Certificate is far enough along to collect its fee and the fee is still open.
    pub fn can_proceed_to_payment(&self) -> bool {
        matches!(
            self.status(),
            CertificateStatus::Approved
                | CertificateStatus::Processing
                | CertificateStatus::Ready
                | CertificateStatus::Completed
        ) && matches!(
            self.payment_state(),
            CertificatePaymentStatus::Unpaid | CertificatePaymentStatus::PendingPayment
        )
    }

    pub fn is_ready_for_payment_list(&self) -> bool {
        self.status() == CertificateStatus::Completed
            && self.payment_completed
            && self.moved_to_payment_list
    }

    /// Completed and paid, so it may sit on the payment list.
    pub fn is_eligible_for_payment_list(&self) -> bool {
        self.status() == CertificateStatus::Completed && self.payment_completed
    }

    /// Stamps the processing fields shared by every staff transition.
    pub fn stamp_processed(&mut self, actor_id: Uuid, now: DateTime<Utc>) {
        self.processed_by = Some(actor_id);
        self.processed_date = Some(now);
    }

    /// Records settlement of the fee. Moves the certificate onto the payment list
    /// when it is already completed.
    pub fn mark_fee_paid(&mut self, now: DateTime<Utc>) {
        self.set_payment_state(CertificatePaymentStatus::Paid);
        self.payment_completed = true;
        if self.payment_date.is_none() {
            self.payment_date = Some(now);
        }
        if self.is_eligible_for_payment_list() && !self.moved_to_payment_list {
            self.moved_to_payment_list = true;
            self.moved_to_payment_list_date = Some(now);
        }
    }
}

/// Result of a transition that may legitimately leave the record untouched.
#[derive(Debug, Clone)]
pub enum Transition<T> {
    Applied(T),
    Unchanged(T),
}

impl<T> Transition<T> {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Transition::Applied(value) | Transition::Unchanged(value) => value,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn certificate(status: CertificateStatus) -> Certificate {
        let now = Utc::now();
        Certificate {
            certificate_id: Uuid::new_v4(),
            certificate_number: None,
            resident_id: Uuid::new_v4(),
            certificate_type: "barangay_clearance".to_string(),
            purpose: "Employment".to_string(),
            status: status.as_str().to_string(),
            rejection_reason: None,
            fee: Decimal::new(5000, 2),
            payment_status: "unpaid".to_string(),
            payment_completed: false,
            moved_to_payment_list: false,
            moved_to_payment_list_date: None,
            notes: None,
            processed_by: None,
            request_date: now,
            processed_date: None,
            claimed_date: None,
            completed_date: None,
            payment_date: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn approve_only_from_pending_or_processing() {
        assert!(CertificateStatus::Pending.can_approve());
        assert!(CertificateStatus::Processing.can_approve());
        assert!(!CertificateStatus::Approved.can_approve());
        assert!(!CertificateStatus::Completed.can_approve());
        assert!(!CertificateStatus::Rejected.can_approve());
    }

    #[test]
    fn reject_not_allowed_after_completion() {
        assert!(CertificateStatus::Ready.can_reject());
        assert!(CertificateStatus::Approved.can_reject());
        assert!(!CertificateStatus::Completed.can_reject());
        assert!(!CertificateStatus::Cancelled.can_reject());
        assert!(!CertificateStatus::Claimed.can_reject());
    }

    #[test]
    fn only_pending_or_rejected_are_deletable() {
        assert!(CertificateStatus::Pending.is_deletable());
        assert!(CertificateStatus::Rejected.is_deletable());
        assert!(!CertificateStatus::Approved.is_deletable());
        assert!(!CertificateStatus::Completed.is_deletable());
    }

    #[test]
    fn strict_parse_rejects_unknown_values() {
        assert_eq!(
            CertificateStatus::parse("completed"),
            Some(CertificateStatus::Completed)
        );
        assert_eq!(CertificateStatus::parse("done"), None);
        assert_eq!(CertificatePaymentStatus::parse("paid"), Some(CertificatePaymentStatus::Paid));
        assert_eq!(CertificatePaymentStatus::parse("settled"), None);
    }

    #[test]
    fn payment_gate_requires_progress_and_open_fee() {
        let mut cert = certificate(CertificateStatus::Pending);
        assert!(!cert.can_proceed_to_payment());

        cert.set_status(CertificateStatus::Approved);
        assert!(cert.can_proceed_to_payment());

        cert.set_payment_state(CertificatePaymentStatus::PendingPayment);
        assert!(cert.can_proceed_to_payment());

        cert.set_payment_state(CertificatePaymentStatus::Paid);
        assert!(!cert.can_proceed_to_payment());
    }

    #[test]
    fn fee_paid_on_completed_certificate_moves_it() {
        let mut cert = certificate(CertificateStatus::Completed);
        let now = Utc::now();
        cert.mark_fee_paid(now);

        assert_eq!(cert.payment_state(), CertificatePaymentStatus::Paid);
        assert!(cert.payment_completed);
        assert!(cert.moved_to_payment_list);
        assert_eq!(cert.moved_to_payment_list_date, Some(now));
        assert!(cert.is_ready_for_payment_list());
    }

    #[test]
    fn fee_paid_before_completion_does_not_move() {
        let mut cert = certificate(CertificateStatus::Approved);
        cert.mark_fee_paid(Utc::now());

        assert!(cert.payment_completed);
        assert!(!cert.moved_to_payment_list);
        assert!(!cert.is_ready_for_payment_list());
    }

    #[test]
    fn transition_reports_whether_applied() {
        let applied = Transition::Applied(1);
        let unchanged = Transition::Unchanged(2);
        assert!(applied.applied());
        assert!(!unchanged.applied());
        assert_eq!(unchanged.into_inner(), 2);
    }
}
