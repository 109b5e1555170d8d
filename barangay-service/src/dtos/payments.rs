use crate::models::{PageRequest, Payment, PaymentAmounts, PaymentMethod};
use crate::services::{NewPayment, PaymentListFilter, PaymentUpdate, WorkflowError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn parse_method(value: Option<&str>) -> Result<Option<PaymentMethod>, WorkflowError> {
    value.map(PaymentMethod::from_input).transpose()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub resident_id: Uuid,
    pub certificate_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200, message = "Payer name is required"))]
    pub payer_name: String,

    #[validate(email(message = "Invalid payer email"))]
    pub payer_email: Option<String>,

    #[validate(length(max = 50))]
    pub payer_phone: Option<String>,

    /// Required unless the payment is linked to a certificate.
    #[validate(length(max = 50))]
    pub service_type: Option<String>,

    pub service_description: Option<String>,
    pub amount: Decimal,
    pub additional_fees: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub payment_method: String,
    pub payment_category: Option<String>,
    pub reference_number: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    /// `paid` records an already-collected payment. Anything else is left pending.
    pub payment_status: Option<String>,
}

impl CreatePaymentRequest {
    pub fn into_new_payment(self) -> Result<NewPayment, WorkflowError> {
        let payment_method = PaymentMethod::from_input(&self.payment_method)?;
        let mark_paid = match self.payment_status.as_deref().map(str::trim) {
            None | Some("") | Some("pending") => false,
            Some("paid") => true,
            Some(other) => {
                return Err(WorkflowError::validation(format!(
                    "Payments can only be created as pending or paid, not {}",
                    other
                )))
            }
        };

        Ok(NewPayment {
            resident_id: self.resident_id,
            certificate_id: self.certificate_id,
            payer_name: self.payer_name,
            payer_email: self.payer_email,
            payer_phone: self.payer_phone,
            service_type: self.service_type,
            service_description: self.service_description,
            amounts: PaymentAmounts {
                amount: self.amount,
                additional_fees: self.additional_fees.unwrap_or_default(),
                discount_amount: self.discount_amount.unwrap_or_default(),
                tax_amount: self.tax_amount.unwrap_or_default(),
            },
            payment_method,
            payment_category: self.payment_category,
            reference_number: self.reference_number,
            due_date: self.due_date,
            notes: self.notes,
            mark_paid,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePaymentRequest {
    #[validate(length(min = 1, max = 200, message = "Payer name cannot be empty"))]
    pub payer_name: Option<String>,

    #[validate(email(message = "Invalid payer email"))]
    pub payer_email: Option<String>,

    #[validate(length(max = 50))]
    pub payer_phone: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Service type cannot be empty"))]
    pub service_type: Option<String>,

    pub service_description: Option<String>,
    pub amount: Option<Decimal>,
    pub additional_fees: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl UpdatePaymentRequest {
    pub fn into_update(self) -> Result<PaymentUpdate, WorkflowError> {
        Ok(PaymentUpdate {
            payment_method: parse_method(self.payment_method.as_deref())?,
            payer_name: self.payer_name,
            payer_email: self.payer_email,
            payer_phone: self.payer_phone,
            service_type: self.service_type,
            service_description: self.service_description,
            amount: self.amount,
            additional_fees: self.additional_fees,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
            reference_number: self.reference_number,
            due_date: self.due_date,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_method: Option<String>,
}

impl MarkPaidRequest {
    pub fn method(&self) -> Result<Option<PaymentMethod>, WorkflowError> {
        parse_method(self.payment_method.as_deref())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    pub amount: Decimal,

    #[validate(length(min = 1, max = 1000, message = "Refund reason is required"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub search: Option<String>,
    pub service_type: Option<String>,
    pub payment_method: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaymentListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    pub fn filter(&self) -> Result<PaymentListFilter, WorkflowError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(WorkflowError::validation(
                    "date_from must not be after date_to",
                ));
            }
        }
        Ok(PaymentListFilter {
            search: self.search.clone(),
            service_type: self.service_type.clone(),
            payment_method: parse_method(
                self.payment_method.as_deref().filter(|m| !m.trim().is_empty()),
            )?,
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
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
    pub due_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub is_ready_for_payment_list: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        let now = Utc::now();
        let is_overdue = p.is_overdue(now);
        let days_overdue = p.days_overdue(now);
        let is_ready_for_payment_list = p.is_ready_for_payment_list();
        Self {
            payment_id: p.payment_id,
            payment_number: p.payment_number,
            receipt_number: p.receipt_number,
            reference_number: p.reference_number,
            resident_id: p.resident_id,
            certificate_id: p.certificate_id,
            payer_name: p.payer_name,
            payer_email: p.payer_email,
            payer_phone: p.payer_phone,
            service_type: p.service_type,
            service_description: p.service_description,
            amount: p.amount,
            additional_fees: p.additional_fees,
            discount_amount: p.discount_amount,
            tax_amount: p.tax_amount,
            total_amount: p.total_amount,
            currency: p.currency,
            payment_method: p.payment_method,
            payment_status: p.payment_status,
            payment_category: p.payment_category,
            is_certificate_payment: p.is_certificate_payment,
            moved_to_payment_list: p.moved_to_payment_list,
            moved_to_payment_list_date: p.moved_to_payment_list_date,
            refund_amount: p.refund_amount,
            refund_reason: p.refund_reason,
            refund_date: p.refund_date,
            due_date: p.due_date,
            payment_date: p.payment_date,
            processed_by: p.processed_by,
            processed_at: p.processed_at,
            notes: p.notes,
            is_overdue,
            days_overdue,
            is_ready_for_payment_list,
            created_utc: p.created_utc,
            updated_utc: p.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub moved_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            resident_id: Uuid::new_v4(),
            certificate_id: None,
            payer_name: "Maria Santos".to_string(),
            payer_email: Some("maria@example.com".to_string()),
            payer_phone: None,
            service_type: Some("facility_rental".to_string()),
            service_description: None,
            amount: Decimal::new(100, 0),
            additional_fees: Some(Decimal::new(10, 0)),
            discount_amount: Some(Decimal::new(20, 0)),
            tax_amount: Some(Decimal::new(5, 0)),
            payment_method: "cash".to_string(),
            payment_category: None,
            reference_number: None,
            due_date: None,
            notes: None,
            payment_status: None,
        }
    }

    #[test]
    fn create_request_maps_amounts() {
        let input = create_request().into_new_payment().unwrap();
        assert_eq!(input.amounts.total(), Decimal::new(95, 0));
        assert_eq!(input.payment_method, PaymentMethod::Cash);
        assert!(!input.mark_paid);
    }

    #[test]
    fn create_request_accepts_paid_status() {
        let mut request = create_request();
        request.payment_status = Some("paid".to_string());
        assert!(request.into_new_payment().unwrap().mark_paid);
    }

    #[test]
    fn create_request_rejects_other_statuses() {
        let mut request = create_request();
        request.payment_status = Some("refunded".to_string());
        assert!(matches!(
            request.into_new_payment(),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn invalid_email_fails_validation() {
        let mut request = create_request();
        request.payer_email = Some("not-an-email".to_string());
        assert!(request.validate().is_err());
    }

    #[test]
    fn list_query_rejects_inverted_range() {
        let query = PaymentListQuery {
            date_from: NaiveDate::from_ymd_opt(2025, 2, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(query.filter().is_err());
    }

    #[test]
    fn list_query_parses_method() {
        let query = PaymentListQuery {
            payment_method: Some("bank_transfer".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.filter().unwrap().payment_method,
            Some(PaymentMethod::BankTransfer)
        );
    }
}
