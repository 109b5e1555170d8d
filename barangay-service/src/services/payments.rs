//! Payment reconciliation engine.
//!
//! Owns the payment lifecycle (pending → paid → refunded) and keeps the
//! originating certificate and the payment list in step with it.

use crate::models::{
    ActivityEvent, ActivityType, Certificate, CertificatePaymentStatus, Page, PageRequest,
    Payment, PaymentAmounts, PaymentMethod, PaymentStats, PaymentStatus, Transition,
    CERTIFICATE_COLUMNS, PAYMENT_COLUMNS,
};
use crate::services::activity::ActivityLog;
use crate::services::email::{self, Notifier};
use crate::services::error::WorkflowError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::sequence;
use crate::services::store::{self, NewPaymentRow};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

pub const SERVICE_FEE_CATEGORY: &str = "service_fee";

/// Walk-in payment recorded at the counter.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub resident_id: Uuid,
    pub certificate_id: Option<Uuid>,
    pub payer_name: String,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub service_type: Option<String>,
    pub service_description: Option<String>,
    pub amounts: PaymentAmounts,
    pub payment_method: PaymentMethod,
    pub payment_category: Option<String>,
    pub reference_number: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Record the payment as already collected.
    pub mark_paid: bool,
}

/// Editable fields of a pending or failed payment. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub service_type: Option<String>,
    pub service_description: Option<String>,
    pub amount: Option<Decimal>,
    pub additional_fees: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub reference_number: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentListFilter {
    pub search: Option<String>,
    pub service_type: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn require_text(value: &str, field: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Creates the pending fee payment for a certificate.
pub(crate) async fn create_certificate_payment(
    conn: &mut PgConnection,
    certificate: &Certificate,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Payment, WorkflowError> {
    let resident = store::find_resident(conn, certificate.resident_id)
        .await?
        .ok_or(WorkflowError::NotFound("Resident"))?;
    let type_name = store::certificate_type_name(conn, &certificate.certificate_type).await?;
    let number = certificate
        .certificate_number
        .clone()
        .unwrap_or_else(|| certificate.certificate_id.to_string());

    let payment = store::insert_payment(
        conn,
        NewPaymentRow {
            resident_id: resident.resident_id,
            certificate_id: Some(certificate.certificate_id),
            reference_number: None,
            payer_name: resident.full_name(),
            payer_email: resident.email.clone(),
            payer_phone: resident.phone.clone(),
            service_type: certificate.certificate_type.clone(),
            service_description: Some(format!("{} - {}", type_name, certificate.purpose)),
            amount: certificate.fee,
            additional_fees: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            payment_method: PaymentMethod::Unspecified.as_str().to_string(),
            payment_category: SERVICE_FEE_CATEGORY.to_string(),
            is_certificate_payment: true,
            due_date: None,
            notes: Some(format!("Auto-generated payment for certificate #{}", number)),
            created_by: actor_id,
        },
        now,
    )
    .await?;

    info!(
        payment_id = %payment.payment_id,
        payment_number = %payment.payment_number,
        certificate_id = %certificate.certificate_id,
        amount = %payment.amount,
        "Certificate payment created"
    );

    Ok(payment)
}

/// Returns the certificate's live payment, creating one when none exists.
/// The flag is true when a payment was created.
pub(crate) async fn record_for_certificate(
    conn: &mut PgConnection,
    certificate: &Certificate,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(Payment, bool), WorkflowError> {
    match store::latest_payment_for_certificate(conn, certificate.certificate_id).await? {
        Some(payment) if !payment.status().is_closed() => Ok((payment, false)),
        _ => Ok((
            create_certificate_payment(conn, certificate, actor_id, now).await?,
            true,
        )),
    }
}

/// Marks a payment paid and propagates the settlement to its certificate.
///
/// `certificate` must be the locked row the payment points at, if any.
/// Already-paid payments are returned unchanged.
pub(crate) async fn settle(
    conn: &mut PgConnection,
    mut payment: Payment,
    certificate: Option<&mut Certificate>,
    method: Option<PaymentMethod>,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transition<Payment>, WorkflowError> {
    let status = payment.status();
    if status == PaymentStatus::Paid {
        return Ok(Transition::Unchanged(payment));
    }
    if status.is_closed() {
        return Err(WorkflowError::invalid_state(format!(
            "Cannot mark a {} payment as paid",
            status.as_str()
        )));
    }

    payment.set_status(PaymentStatus::Paid);
    payment.payment_date = Some(now);
    payment.processed_by = Some(actor_id);
    payment.processed_at = Some(now);
    payment.updated_by = Some(actor_id);
    if let Some(method) = method.filter(|m| *m != PaymentMethod::Unspecified) {
        payment.payment_method = method.as_str().to_string();
    }
    if payment.receipt_number.is_none() {
        payment.receipt_number = Some(sequence::next_receipt_number(conn, now).await?);
    }

    if let Some(certificate) = certificate {
        certificate.mark_fee_paid(now);
        *certificate = store::save_certificate(conn, certificate).await?;
        if payment.is_certificate_payment {
            payment.move_to_payment_list(now);
        }
    }

    let payment = store::save_payment(conn, &payment).await?;

    info!(
        payment_id = %payment.payment_id,
        receipt_number = payment.receipt_number.as_deref().unwrap_or_default(),
        method = %payment.payment_method,
        "Payment marked paid"
    );

    Ok(Transition::Applied(payment))
}

/// Brings a completed, paid certificate and its payment onto the payment list,
/// creating or settling the payment when the certificate got ahead of it.
pub(crate) async fn reconcile_paid_certificate(
    conn: &mut PgConnection,
    certificate: &mut Certificate,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Payment, WorkflowError> {
    let (payment, _) = record_for_certificate(conn, certificate, actor_id, now).await?;

    if !payment.is_paid() {
        let method = payment
            .payment_method
            .is_empty()
            .then_some(PaymentMethod::CompletedCertificate);
        return Ok(settle(conn, payment, Some(&mut *certificate), method, actor_id, now)
            .await?
            .into_inner());
    }

    certificate.mark_fee_paid(now);
    *certificate = store::save_certificate(conn, certificate).await?;

    let mut payment = payment;
    if payment.is_certificate_payment && payment.move_to_payment_list(now) {
        payment.updated_by = Some(actor_id);
        payment = store::save_payment(conn, &payment).await?;
    }
    Ok(payment)
}

#[derive(Clone)]
pub struct PaymentEngine {
    pool: PgPool,
    activity: ActivityLog,
    notifier: Notifier,
}

impl PaymentEngine {
    pub fn new(pool: PgPool, activity: ActivityLog, notifier: Notifier) -> Self {
        Self {
            pool,
            activity,
            notifier,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let query = format!("SELECT {} FROM payments WHERE payment_id = $1", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::NotFound("Payment"))?;

        timer.observe_duration();
        Ok(payment)
    }

    /// Records a walk-in payment, optionally linked to a certificate.
    #[instrument(skip(self, input), fields(resident_id = %input.resident_id, certificate_id = ?input.certificate_id))]
    pub async fn create_payment(
        &self,
        input: NewPayment,
        actor_id: Uuid,
    ) -> Result<Payment, WorkflowError> {
        let payer_name = require_text(&input.payer_name, "payer_name")?;
        input.amounts.validate()?;
        if input.payment_method == PaymentMethod::Unspecified {
            return Err(WorkflowError::validation("payment_method is required"));
        }
        let service_type = non_empty(input.service_type.clone());
        if input.certificate_id.is_none() && service_type.is_none() {
            return Err(WorkflowError::validation("service_type is required"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let resident = store::find_resident(&mut tx, input.resident_id)
            .await?
            .ok_or(WorkflowError::NotFound("Resident"))?;

        let mut certificate = match input.certificate_id {
            Some(id) => Some(store::lock_certificate(&mut tx, id).await?),
            None => None,
        };

        let (service_type, service_description) = match &certificate {
            Some(cert) => {
                if cert.resident_id != resident.resident_id {
                    return Err(WorkflowError::validation(
                        "Certificate does not belong to the resident",
                    ));
                }
                let type_name = store::certificate_type_name(&mut tx, &cert.certificate_type).await?;
                (
                    cert.certificate_type.clone(),
                    Some(format!("{} - {}", type_name, cert.purpose)),
                )
            }
            None => (
                service_type.unwrap_or_default(),
                non_empty(input.service_description.clone()),
            ),
        };

        // A certificate keeps a single live payment; counter details land on it.
        let live = match &certificate {
            Some(cert) => store::latest_payment_for_certificate(&mut tx, cert.certificate_id)
                .await?
                .filter(|p| !p.status().is_closed()),
            None => None,
        };

        let payment = match live {
            Some(existing) if existing.is_paid() => {
                return Err(WorkflowError::invalid_state(format!(
                    "Certificate is already settled by payment {}",
                    existing.payment_number
                )));
            }
            Some(mut existing) => {
                existing.payer_name = payer_name;
                existing.payer_email = non_empty(input.payer_email.clone()).or(existing.payer_email);
                existing.payer_phone = non_empty(input.payer_phone.clone()).or(existing.payer_phone);
                existing.reference_number =
                    non_empty(input.reference_number.clone()).or(existing.reference_number);
                existing.notes = non_empty(input.notes.clone()).or(existing.notes);
                existing.due_date = input.due_date.or(existing.due_date);
                existing.payment_method = input.payment_method.as_str().to_string();
                existing.set_amounts(input.amounts);
                existing.updated_by = Some(actor_id);
                info!(
                    payment_id = %existing.payment_id,
                    payment_number = %existing.payment_number,
                    "Reusing open certificate payment"
                );
                store::save_payment(&mut tx, &existing).await?
            }
            None => {
                store::insert_payment(
                    &mut tx,
                    NewPaymentRow {
                        resident_id: resident.resident_id,
                        certificate_id: input.certificate_id,
                        reference_number: non_empty(input.reference_number.clone()),
                        payer_name,
                        payer_email: non_empty(input.payer_email.clone()),
                        payer_phone: non_empty(input.payer_phone.clone()),
                        service_type,
                        service_description,
                        amount: input.amounts.amount,
                        additional_fees: input.amounts.additional_fees,
                        discount_amount: input.amounts.discount_amount,
                        tax_amount: input.amounts.tax_amount,
                        payment_method: input.payment_method.as_str().to_string(),
                        payment_category: non_empty(input.payment_category.clone())
                            .unwrap_or_else(|| SERVICE_FEE_CATEGORY.to_string()),
                        is_certificate_payment: certificate.is_some(),
                        due_date: input.due_date,
                        notes: non_empty(input.notes.clone()),
                        created_by: actor_id,
                    },
                    now,
                )
                .await?
            }
        };

        let payment = if input.mark_paid {
            settle(
                &mut tx,
                payment,
                certificate.as_mut(),
                Some(input.payment_method),
                actor_id,
                now,
            )
            .await?
            .into_inner()
        } else {
            if let Some(cert) = certificate.as_mut() {
                if cert.payment_state() == CertificatePaymentStatus::Unpaid {
                    cert.set_payment_state(CertificatePaymentStatus::PendingPayment);
                    *cert = store::save_certificate(&mut tx, cert).await?;
                }
            }
            payment
        };

        tx.commit().await?;

        info!(
            payment_id = %payment.payment_id,
            payment_number = %payment.payment_number,
            status = %payment.payment_status,
            "Payment recorded"
        );

        if payment.is_paid() {
            self.activity.record(ActivityEvent::payment(
                ActivityType::PaymentReceived,
                &payment.payment_number,
                payment.total_amount,
                &payment.payer_name,
                payment.payment_id,
                actor_id,
            ));
            self.notifier.dispatch(email::payment_received(&payment));
        }

        Ok(payment)
    }

    #[instrument(skip(self, changes))]
    pub async fn update_payment(
        &self,
        payment_id: Uuid,
        changes: PaymentUpdate,
        actor_id: Uuid,
    ) -> Result<Payment, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let mut payment = store::lock_payment(&mut tx, payment_id).await?;

        if !payment.status().is_editable() {
            return Err(WorkflowError::invalid_state(format!(
                "Only pending or failed payments can be edited (payment is {})",
                payment.payment_status
            )));
        }

        if let Some(name) = changes.payer_name {
            payment.payer_name = require_text(&name, "payer_name")?;
        }
        if let Some(service_type) = changes.service_type {
            payment.service_type = require_text(&service_type, "service_type")?;
        }
        if changes.payer_email.is_some() {
            payment.payer_email = non_empty(changes.payer_email);
        }
        if changes.payer_phone.is_some() {
            payment.payer_phone = non_empty(changes.payer_phone);
        }
        if changes.service_description.is_some() {
            payment.service_description = non_empty(changes.service_description);
        }
        if changes.reference_number.is_some() {
            payment.reference_number = non_empty(changes.reference_number);
        }
        if changes.notes.is_some() {
            payment.notes = non_empty(changes.notes);
        }
        if let Some(due_date) = changes.due_date {
            payment.due_date = Some(due_date);
        }
        if let Some(method) = changes.payment_method {
            payment.payment_method = method.as_str().to_string();
        }

        let current = payment.amounts();
        let amounts = PaymentAmounts {
            amount: changes.amount.unwrap_or(current.amount),
            additional_fees: changes.additional_fees.unwrap_or(current.additional_fees),
            discount_amount: changes.discount_amount.unwrap_or(current.discount_amount),
            tax_amount: changes.tax_amount.unwrap_or(current.tax_amount),
        };
        amounts.validate()?;
        if amounts.total() < payment.refund_amount {
            return Err(WorkflowError::invalid_amount(
                "Total amount cannot drop below the amount already refunded",
            ));
        }
        payment.set_amounts(amounts);
        payment.updated_by = Some(actor_id);

        let payment = store::save_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        info!(payment_id = %payment.payment_id, total = %payment.total_amount, "Payment updated");
        Ok(payment)
    }

    /// Settles a payment. Certificate-linked payments also settle the certificate.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        payment_id: Uuid,
        method: Option<PaymentMethod>,
        actor_id: Uuid,
    ) -> Result<Transition<Payment>, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Lock order: certificate before payment.
        let mut certificate = match store::payment_certificate_id(&mut tx, payment_id).await? {
            Some(certificate_id) => Some(store::lock_certificate(&mut tx, certificate_id).await?),
            None => None,
        };
        let payment = store::lock_payment(&mut tx, payment_id).await?;

        let type_name = match &certificate {
            Some(cert) => Some(store::certificate_type_name(&mut tx, &cert.certificate_type).await?),
            None => None,
        };

        let outcome = settle(&mut tx, payment, certificate.as_mut(), method, actor_id, now).await?;
        tx.commit().await?;

        if let Transition::Applied(payment) = &outcome {
            self.activity.record(ActivityEvent::payment(
                ActivityType::PaymentReceived,
                &payment.payment_number,
                payment.total_amount,
                &payment.payer_name,
                payment.payment_id,
                actor_id,
            ));
            if let (Some(cert), Some(type_name)) = (&certificate, &type_name) {
                self.activity.record(ActivityEvent::certificate(
                    ActivityType::CertificatePayment,
                    type_name,
                    &payment.payer_name,
                    cert.certificate_id,
                    actor_id,
                ));
            }
            self.notifier.dispatch(email::payment_received(payment));
        }

        Ok(outcome)
    }

    /// Flags a certificate payment (and its certificate) as moved to the payment list.
    /// Returns false when nothing changed.
    #[instrument(skip(self))]
    pub async fn move_to_payment_list(
        &self,
        payment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<bool, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut certificate = match store::payment_certificate_id(&mut tx, payment_id).await? {
            Some(certificate_id) => Some(store::lock_certificate(&mut tx, certificate_id).await?),
            None => None,
        };
        let mut payment = store::lock_payment(&mut tx, payment_id).await?;

        if !payment.is_certificate_payment || payment.moved_to_payment_list {
            return Ok(false);
        }

        payment.move_to_payment_list(now);
        payment.updated_by = Some(actor_id);
        store::save_payment(&mut tx, &payment).await?;

        if let Some(cert) = certificate.as_mut() {
            if cert.is_eligible_for_payment_list() && !cert.moved_to_payment_list {
                cert.moved_to_payment_list = true;
                cert.moved_to_payment_list_date = Some(now);
                store::save_certificate(&mut tx, cert).await?;
            }
        }

        tx.commit().await?;
        info!(payment_id = %payment_id, "Payment moved to payment list");
        Ok(true)
    }

    #[instrument(skip(self, reason))]
    pub async fn process_refund(
        &self,
        payment_id: Uuid,
        amount: Decimal,
        reason: &str,
        actor_id: Uuid,
    ) -> Result<Payment, WorkflowError> {
        if amount <= Decimal::ZERO {
            return Err(WorkflowError::invalid_amount(
                "Refund amount must be greater than zero",
            ));
        }
        let reason = require_text(reason, "Refund reason")?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut payment = store::lock_payment(&mut tx, payment_id).await?;

        let plan = payment.plan_refund(amount)?;
        payment.refund_amount = plan.refund_amount;
        payment.refund_reason = Some(reason);
        payment.refund_date = Some(now);
        payment.refunded_by = Some(actor_id);
        payment.updated_by = Some(actor_id);
        if plan.fully_refunded {
            payment.set_status(PaymentStatus::Refunded);
        }

        let payment = store::save_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment.payment_id,
            refund = %amount,
            fully_refunded = plan.fully_refunded,
            "Refund processed"
        );

        self.activity.record(ActivityEvent::payment(
            ActivityType::PaymentRefund,
            &payment.payment_number,
            amount,
            &payment.payer_name,
            payment.payment_id,
            actor_id,
        ));

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn delete_payment(&self, payment_id: Uuid) -> Result<(), WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        let result = sqlx::query("DELETE FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound("Payment"));
        }
        info!(payment_id = %payment_id, "Payment deleted");
        Ok(())
    }

    /// Moves every completed, paid certificate that is not yet on the payment list,
    /// repairing its payment along the way. Safe to re-run.
    #[instrument(skip(self))]
    pub async fn sync_all_pending(&self, actor_id: Uuid) -> Result<u64, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "SELECT {} FROM certificates \
             WHERE status = 'completed' AND payment_status = 'paid' AND moved_to_payment_list = FALSE \
             ORDER BY request_date \
             FOR UPDATE",
            CERTIFICATE_COLUMNS
        );
        let certificates = sqlx::query_as::<_, Certificate>(&query)
            .fetch_all(&mut *tx)
            .await?;

        let mut moved = 0u64;
        for mut certificate in certificates {
            let payment =
                reconcile_paid_certificate(&mut tx, &mut certificate, actor_id, now).await?;
            info!(
                certificate_id = %certificate.certificate_id,
                payment_id = %payment.payment_id,
                "Certificate synced to payment list"
            );
            moved += 1;
        }

        tx.commit().await?;

        info!(count = moved, "Payment list sync completed");
        if moved > 0 {
            self.activity
                .record(ActivityEvent::payment_list_sync(moved, actor_id));
        }

        Ok(moved)
    }

    /// Paid certificate payments, newest first.
    #[instrument(skip(self))]
    pub async fn list_payment_list(
        &self,
        filter: &PaymentListFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payment_list"])
            .start_timer();

        let search = non_empty(filter.search.clone()).map(|s| format!("%{}%", s));
        let service_type = non_empty(filter.service_type.clone());
        let method = filter.payment_method.map(|m| m.as_str().to_string());

        const WHERE: &str = r#"
            WHERE is_certificate_payment = TRUE AND payment_status = 'paid'
              AND ($1::text IS NULL OR payer_name ILIKE $1 OR payment_number ILIKE $1
                   OR reference_number ILIKE $1 OR service_description ILIKE $1)
              AND ($2::varchar IS NULL OR service_type = $2)
              AND ($3::varchar IS NULL OR payment_method = $3)
              AND ($4::date IS NULL OR created_utc >= $4::date)
              AND ($5::date IS NULL OR created_utc < $5::date + 1)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM payments {}", WHERE))
            .bind(&search)
            .bind(&service_type)
            .bind(&method)
            .bind(filter.date_from)
            .bind(filter.date_to)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            "SELECT {} FROM payments {} ORDER BY created_utc DESC, payment_number DESC LIMIT $6 OFFSET $7",
            PAYMENT_COLUMNS, WHERE
        );
        let items = sqlx::query_as::<_, Payment>(&query)
            .bind(&search)
            .bind(&service_type)
            .bind(&method)
            .bind(filter.date_from)
            .bind(filter.date_to)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(Page::new(items, page.page, page.per_page, total))
    }

    #[instrument(skip(self))]
    pub async fn payment_stats(&self) -> Result<PaymentStats, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payment_stats"])
            .start_timer();

        let now = Utc::now();
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        let stats = sqlx::query_as::<_, PaymentStats>(
            r#"
            SELECT
                COUNT(*) AS total_payments,
                COUNT(*) FILTER (WHERE payment_status = 'paid') AS paid_count,
                COUNT(*) FILTER (WHERE payment_status = 'pending') AS pending_count,
                COUNT(*) FILTER (WHERE payment_status = 'failed') AS failed_count,
                COUNT(*) FILTER (WHERE payment_status = 'refunded') AS refunded_count,
                COALESCE(SUM(total_amount - refund_amount) FILTER (WHERE payment_status = 'paid'), 0) AS total_revenue,
                COALESCE(SUM(total_amount - refund_amount)
                    FILTER (WHERE payment_status = 'paid' AND payment_date >= $1), 0) AS month_revenue,
                COALESCE(SUM(total_amount) FILTER (WHERE payment_status = 'pending'), 0) AS pending_total,
                COUNT(*) FILTER (WHERE payment_status = 'pending' AND due_date < $2) AS overdue_count
            FROM payments
            "#,
        )
        .bind(month_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(stats)
    }
}
