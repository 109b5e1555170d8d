//! Row-level queries shared by the certificate and payment engines.
//!
//! Everything here runs on a connection borrowed from the caller's
//! transaction. Locks are taken certificate first, then payment.

use crate::models::{
    Certificate, CertificateType, Payment, Resident, CERTIFICATE_COLUMNS,
    CERTIFICATE_TYPE_COLUMNS, PAYMENT_COLUMNS, RESIDENT_COLUMNS,
};
use crate::services::error::WorkflowError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::sequence;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

pub async fn lock_certificate(
    conn: &mut PgConnection,
    certificate_id: Uuid,
) -> Result<Certificate, WorkflowError> {
    let query = format!(
        "SELECT {} FROM certificates WHERE certificate_id = $1 FOR UPDATE",
        CERTIFICATE_COLUMNS
    );
    sqlx::query_as::<_, Certificate>(&query)
        .bind(certificate_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(WorkflowError::NotFound("Certificate"))
}

pub async fn lock_payment(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> Result<Payment, WorkflowError> {
    let query = format!(
        "SELECT {} FROM payments WHERE payment_id = $1 FOR UPDATE",
        PAYMENT_COLUMNS
    );
    sqlx::query_as::<_, Payment>(&query)
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(WorkflowError::NotFound("Payment"))
}

/// Certificate linked to a payment, read without locking so the caller can
/// lock the certificate before the payment.
pub async fn payment_certificate_id(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> Result<Option<Uuid>, WorkflowError> {
    let row: Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT certificate_id FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(|(certificate_id,)| certificate_id)
        .ok_or(WorkflowError::NotFound("Payment"))
}

/// Newest payment for a certificate, locked.
pub async fn latest_payment_for_certificate(
    conn: &mut PgConnection,
    certificate_id: Uuid,
) -> Result<Option<Payment>, WorkflowError> {
    let query = format!(
        "SELECT {} FROM payments WHERE certificate_id = $1 \
         ORDER BY created_utc DESC, payment_number DESC LIMIT 1 FOR UPDATE",
        PAYMENT_COLUMNS
    );
    Ok(sqlx::query_as::<_, Payment>(&query)
        .bind(certificate_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_resident(
    conn: &mut PgConnection,
    resident_id: Uuid,
) -> Result<Option<Resident>, WorkflowError> {
    let query = format!(
        "SELECT {} FROM residents WHERE resident_id = $1",
        RESIDENT_COLUMNS
    );
    Ok(sqlx::query_as::<_, Resident>(&query)
        .bind(resident_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_resident_by_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Resident>, WorkflowError> {
    let query = format!(
        "SELECT {} FROM residents WHERE user_id = $1",
        RESIDENT_COLUMNS
    );
    Ok(sqlx::query_as::<_, Resident>(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_certificate_type(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<CertificateType>, WorkflowError> {
    let query = format!(
        "SELECT {} FROM certificate_types WHERE code = $1",
        CERTIFICATE_TYPE_COLUMNS
    );
    Ok(sqlx::query_as::<_, CertificateType>(&query)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Display name for a type code, falling back to a title-cased code.
pub async fn certificate_type_name(
    conn: &mut PgConnection,
    code: &str,
) -> Result<String, WorkflowError> {
    Ok(find_certificate_type(conn, code)
        .await?
        .map(|t| t.name)
        .unwrap_or_else(|| crate::models::certificate_type::fallback_type_name(code)))
}

/// Writes every mutable column of the certificate back and returns the stored row.
pub async fn save_certificate(
    conn: &mut PgConnection,
    certificate: &Certificate,
) -> Result<Certificate, WorkflowError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["save_certificate"])
        .start_timer();

    let query = format!(
        r#"
        UPDATE certificates SET
            certificate_number = $2, purpose = $3, status = $4, rejection_reason = $5,
            payment_status = $6, payment_completed = $7, moved_to_payment_list = $8,
            moved_to_payment_list_date = $9, notes = $10, processed_by = $11,
            processed_date = $12, claimed_date = $13, completed_date = $14, payment_date = $15,
            updated_utc = NOW()
        WHERE certificate_id = $1
        RETURNING {}
        "#,
        CERTIFICATE_COLUMNS
    );

    let saved = sqlx::query_as::<_, Certificate>(&query)
        .bind(certificate.certificate_id)
        .bind(&certificate.certificate_number)
        .bind(&certificate.purpose)
        .bind(&certificate.status)
        .bind(&certificate.rejection_reason)
        .bind(&certificate.payment_status)
        .bind(certificate.payment_completed)
        .bind(certificate.moved_to_payment_list)
        .bind(certificate.moved_to_payment_list_date)
        .bind(&certificate.notes)
        .bind(certificate.processed_by)
        .bind(certificate.processed_date)
        .bind(certificate.claimed_date)
        .bind(certificate.completed_date)
        .bind(certificate.payment_date)
        .fetch_one(&mut *conn)
        .await?;

    timer.observe_duration();
    Ok(saved)
}

/// Writes every mutable column of the payment back and returns the stored row.
pub async fn save_payment(
    conn: &mut PgConnection,
    payment: &Payment,
) -> Result<Payment, WorkflowError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["save_payment"])
        .start_timer();

    let query = format!(
        r#"
        UPDATE payments SET
            receipt_number = $2, reference_number = $3, payer_name = $4, payer_email = $5,
            payer_phone = $6, service_type = $7, service_description = $8, amount = $9,
            additional_fees = $10, discount_amount = $11, tax_amount = $12,
            payment_method = $13, payment_status = $14, moved_to_payment_list = $15,
            moved_to_payment_list_date = $16, refund_amount = $17, refund_reason = $18,
            refund_date = $19, refunded_by = $20, due_date = $21, payment_date = $22,
            processed_by = $23, processed_at = $24, notes = $25, updated_by = $26,
            updated_utc = NOW()
        WHERE payment_id = $1
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    );

    let saved = sqlx::query_as::<_, Payment>(&query)
        .bind(payment.payment_id)
        .bind(&payment.receipt_number)
        .bind(&payment.reference_number)
        .bind(&payment.payer_name)
        .bind(&payment.payer_email)
        .bind(&payment.payer_phone)
        .bind(&payment.service_type)
        .bind(&payment.service_description)
        .bind(payment.amount)
        .bind(payment.additional_fees)
        .bind(payment.discount_amount)
        .bind(payment.tax_amount)
        .bind(&payment.payment_method)
        .bind(&payment.payment_status)
        .bind(payment.moved_to_payment_list)
        .bind(payment.moved_to_payment_list_date)
        .bind(payment.refund_amount)
        .bind(&payment.refund_reason)
        .bind(payment.refund_date)
        .bind(payment.refunded_by)
        .bind(payment.due_date)
        .bind(payment.payment_date)
        .bind(payment.processed_by)
        .bind(payment.processed_at)
        .bind(&payment.notes)
        .bind(payment.updated_by)
        .fetch_one(&mut *conn)
        .await?;

    timer.observe_duration();
    Ok(saved)
}

/// Columns supplied when a payment row is first written.
#[derive(Debug, Clone)]
pub struct NewPaymentRow {
    pub resident_id: Uuid,
    pub certificate_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub payer_name: String,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub service_type: String,
    pub service_description: Option<String>,
    pub amount: Decimal,
    pub additional_fees: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub payment_method: String,
    pub payment_category: String,
    pub is_certificate_payment: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Inserts a pending payment with a freshly allocated payment number.
pub async fn insert_payment(
    conn: &mut PgConnection,
    row: NewPaymentRow,
    now: DateTime<Utc>,
) -> Result<Payment, WorkflowError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["insert_payment"])
        .start_timer();

    let payment_number = sequence::next_payment_number(conn, now).await?;

    let query = format!(
        r#"
        INSERT INTO payments (
            payment_id, payment_number, reference_number, resident_id, certificate_id,
            payer_name, payer_email, payer_phone, service_type, service_description,
            amount, additional_fees, discount_amount, tax_amount, payment_method,
            payment_status, payment_category, is_certificate_payment, due_date, notes,
            created_by, updated_by, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                'pending', $16, $17, $18, $19, $20, $20, $21, $21)
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    );

    let payment = sqlx::query_as::<_, Payment>(&query)
        .bind(Uuid::new_v4())
        .bind(&payment_number)
        .bind(&row.reference_number)
        .bind(row.resident_id)
        .bind(row.certificate_id)
        .bind(&row.payer_name)
        .bind(&row.payer_email)
        .bind(&row.payer_phone)
        .bind(&row.service_type)
        .bind(&row.service_description)
        .bind(row.amount)
        .bind(row.additional_fees)
        .bind(row.discount_amount)
        .bind(row.tax_amount)
        .bind(&row.payment_method)
        .bind(&row.payment_category)
        .bind(row.is_certificate_payment)
        .bind(row.due_date)
        .bind(&row.notes)
        .bind(row.created_by)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

    timer.observe_duration();
    Ok(payment)
}
