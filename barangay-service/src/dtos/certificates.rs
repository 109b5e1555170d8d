use crate::dtos::payments::PaymentResponse;
use crate::models::{
    Certificate, CertificatePaymentStatus, CertificateStatus, PageRequest, PaymentMethod,
};
use crate::services::{CertificateDetail, CertificateFilter, WorkflowError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCertificateRequest {
    /// Required for staff. Residents always request for themselves.
    pub resident_id: Option<Uuid>,

    #[validate(length(min = 1, max = 50, message = "Certificate type is required"))]
    pub certificate_type: String,

    #[validate(length(min = 1, max = 500, message = "Purpose is required"))]
    pub purpose: String,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCertificateRequest {
    #[validate(length(min = 1, max = 500, message = "Purpose cannot be empty"))]
    pub purpose: Option<String>,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectCertificateRequest {
    #[validate(length(min = 1, max = 1000, message = "Rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SettleCertificateRequest {
    pub payment_method: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CertificateListQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub resident_id: Option<Uuid>,
    pub certificate_type: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CertificateListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    pub fn filter(&self) -> Result<CertificateFilter, WorkflowError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(CertificateStatus::parse(s).ok_or_else(|| {
                WorkflowError::validation(format!("Invalid certificate status: {}", s))
            })?),
            None => None,
        };
        let payment_status = match self.payment_status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(CertificatePaymentStatus::parse(s).ok_or_else(|| {
                WorkflowError::validation(format!("Invalid payment status: {}", s))
            })?),
            None => None,
        };

        Ok(CertificateFilter {
            status,
            payment_status,
            resident_id: self.resident_id,
            certificate_type: self.certificate_type.clone(),
            search: self.search.clone(),
        })
    }
}

impl SettleCertificateRequest {
    pub fn method(&self) -> Result<PaymentMethod, WorkflowError> {
        match PaymentMethod::from_input(&self.payment_method)? {
            PaymentMethod::Unspecified => {
                Err(WorkflowError::validation("payment_method is required"))
            }
            method => Ok(method),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
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
    pub can_proceed_to_payment: bool,
    pub is_ready_for_payment_list: bool,
    pub updated_utc: DateTime<Utc>,
}

impl From<Certificate> for CertificateResponse {
    fn from(c: Certificate) -> Self {
        let can_proceed_to_payment = c.can_proceed_to_payment();
        let is_ready_for_payment_list = c.is_ready_for_payment_list();
        Self {
            certificate_id: c.certificate_id,
            certificate_number: c.certificate_number,
            resident_id: c.resident_id,
            certificate_type: c.certificate_type,
            purpose: c.purpose,
            status: c.status,
            rejection_reason: c.rejection_reason,
            fee: c.fee,
            payment_status: c.payment_status,
            payment_completed: c.payment_completed,
            moved_to_payment_list: c.moved_to_payment_list,
            moved_to_payment_list_date: c.moved_to_payment_list_date,
            notes: c.notes,
            processed_by: c.processed_by,
            request_date: c.request_date,
            processed_date: c.processed_date,
            claimed_date: c.claimed_date,
            completed_date: c.completed_date,
            payment_date: c.payment_date,
            can_proceed_to_payment,
            is_ready_for_payment_list,
            updated_utc: c.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateDetailResponse {
    #[serde(flatten)]
    pub certificate: CertificateResponse,
    pub type_name: String,
    pub has_payment: bool,
    pub latest_payment: Option<PaymentResponse>,
}

impl From<CertificateDetail> for CertificateDetailResponse {
    fn from(detail: CertificateDetail) -> Self {
        let has_payment = detail.has_payment();
        Self {
            certificate: detail.certificate.into(),
            type_name: detail.type_name,
            has_payment,
            latest_payment: detail.latest_payment.map(PaymentResponse::from),
        }
    }
}

/// Certificate plus the payment touched by the same operation.
#[derive(Debug, Serialize)]
pub struct CertificatePaymentResponse {
    pub certificate: CertificateResponse,
    pub payment: PaymentResponse,
}
