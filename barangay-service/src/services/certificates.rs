//! Certificate lifecycle engine.
//!
//! ```text
//! pending ──► processing ──► approved ──► completed (creates payment)
//!    │             │             │
//!    ├─► cancelled └─► rejected ◄┘
//!    └─► rejected
//! ```
//!
//! Each operation runs in one transaction holding the certificate row lock.
//! Audit events and emails go out only after commit.

use crate::models::{
    ActivityEvent, ActivityType, Certificate, CertificatePaymentStatus, CertificateStatus, Page,
    PageRequest, Payment, PaymentMethod, Resident, Transition, CERTIFICATE_COLUMNS,
};
use crate::services::activity::ActivityLog;
use crate::services::email::{self, Notifier};
use crate::services::error::WorkflowError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::payments;
use crate::services::sequence;
use crate::services::store;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

pub const RESIDENT_CANCELLATION_REASON: &str = "Cancelled by resident";

#[derive(Debug, Clone)]
pub struct NewCertificateRequest {
    pub resident_id: Uuid,
    pub certificate_type: String,
    pub purpose: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub status: Option<CertificateStatus>,
    pub payment_status: Option<CertificatePaymentStatus>,
    pub resident_id: Option<Uuid>,
    pub certificate_type: Option<String>,
    pub search: Option<String>,
}

/// A certificate with the catalog name and payment it is displayed with.
#[derive(Debug, Clone)]
pub struct CertificateDetail {
    pub certificate: Certificate,
    pub type_name: String,
    pub latest_payment: Option<Payment>,
}

impl CertificateDetail {
    pub fn has_payment(&self) -> bool {
        self.latest_payment.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub certificate: Certificate,
    pub payment: Payment,
    pub payment_created: bool,
}

/// Context needed for audit descriptions and emails.
struct Subject {
    type_name: String,
    resident: Resident,
}

async fn load_subject(
    conn: &mut PgConnection,
    certificate: &Certificate,
) -> Result<Subject, WorkflowError> {
    let type_name = store::certificate_type_name(conn, &certificate.certificate_type).await?;
    let resident = store::find_resident(conn, certificate.resident_id)
        .await?
        .ok_or(WorkflowError::NotFound("Resident"))?;
    Ok(Subject {
        type_name,
        resident,
    })
}

async fn assign_number_if_absent(
    conn: &mut PgConnection,
    certificate: &mut Certificate,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if certificate.certificate_number.is_none() {
        let number =
            sequence::next_certificate_number(conn, &certificate.certificate_type, now).await?;
        info!(certificate_id = %certificate.certificate_id, number = %number, "Certificate number assigned");
        certificate.certificate_number = Some(number);
    }
    Ok(())
}

#[derive(Clone)]
pub struct CertificateEngine {
    pool: PgPool,
    activity: ActivityLog,
    notifier: Notifier,
}

impl CertificateEngine {
    pub fn new(pool: PgPool, activity: ActivityLog, notifier: Notifier) -> Self {
        Self {
            pool,
            activity,
            notifier,
        }
    }

    fn record(
        &self,
        activity_type: ActivityType,
        certificate: &Certificate,
        subject: &Subject,
        actor_id: Uuid,
    ) {
        self.activity.record(ActivityEvent::certificate(
            activity_type,
            &subject.type_name,
            &subject.resident.full_name(),
            certificate.certificate_id,
            actor_id,
        ));
    }

    #[instrument(skip(self, request), fields(resident_id = %request.resident_id, certificate_type = %request.certificate_type))]
    pub async fn create_request(
        &self,
        request: NewCertificateRequest,
        actor_id: Uuid,
    ) -> Result<Certificate, WorkflowError> {
        let purpose = request.purpose.trim().to_string();
        if purpose.is_empty() {
            return Err(WorkflowError::validation("Purpose is required"));
        }
        let code = request.certificate_type.trim().to_string();

        let mut tx = self.pool.begin().await?;

        let resident = store::find_resident(&mut tx, request.resident_id)
            .await?
            .ok_or(WorkflowError::NotFound("Resident"))?;

        let certificate_type = store::find_certificate_type(&mut tx, &code)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| WorkflowError::InvalidType(code.clone()))?;

        let query = format!(
            r#"
            INSERT INTO certificates (certificate_id, resident_id, certificate_type, purpose, status,
                fee, payment_status, notes, request_date)
            VALUES ($1, $2, $3, $4, 'pending', $5, 'unpaid', $6, NOW())
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        );
        let certificate = sqlx::query_as::<_, Certificate>(&query)
            .bind(Uuid::new_v4())
            .bind(resident.resident_id)
            .bind(&certificate_type.code)
            .bind(&purpose)
            .bind(certificate_type.fee)
            .bind(
                request
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty()),
            )
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            certificate_id = %certificate.certificate_id,
            fee = %certificate.fee,
            "Certificate request created"
        );

        self.record(
            ActivityType::CertificateRequest,
            &certificate,
            &Subject {
                type_name: certificate_type.name,
                resident,
            },
            actor_id,
        );

        Ok(certificate)
    }

    #[instrument(skip(self))]
    pub async fn get_certificate(&self, certificate_id: Uuid) -> Result<Certificate, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_certificate"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM certificates WHERE certificate_id = $1",
            CERTIFICATE_COLUMNS
        );
        let certificate = sqlx::query_as::<_, Certificate>(&query)
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::NotFound("Certificate"))?;

        timer.observe_duration();
        Ok(certificate)
    }

    /// Certificate with its display name and newest payment.
    #[instrument(skip(self))]
    pub async fn certificate_detail(
        &self,
        certificate_id: Uuid,
    ) -> Result<CertificateDetail, WorkflowError> {
        let certificate = self.get_certificate(certificate_id).await?;
        let mut conn = self.pool.acquire().await?;

        let type_name = store::certificate_type_name(&mut conn, &certificate.certificate_type).await?;
        let query = format!(
            "SELECT {} FROM payments WHERE certificate_id = $1 \
             ORDER BY created_utc DESC, payment_number DESC LIMIT 1",
            crate::models::PAYMENT_COLUMNS
        );
        let latest_payment = sqlx::query_as::<_, Payment>(&query)
            .bind(certificate_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(CertificateDetail {
            certificate,
            type_name,
            latest_payment,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_certificates(
        &self,
        filter: &CertificateFilter,
        page: PageRequest,
    ) -> Result<Page<Certificate>, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_certificates"])
            .start_timer();

        let status = filter.status.map(|s| s.as_str().to_string());
        let payment_status = filter.payment_status.map(|s| s.as_str().to_string());
        let certificate_type = filter
            .certificate_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        const WHERE: &str = r#"
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::varchar IS NULL OR payment_status = $2)
              AND ($3::uuid IS NULL OR resident_id = $3)
              AND ($4::varchar IS NULL OR certificate_type = $4)
              AND ($5::text IS NULL OR certificate_number ILIKE $5 OR purpose ILIKE $5)
        "#;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM certificates {}", WHERE))
                .bind(&status)
                .bind(&payment_status)
                .bind(filter.resident_id)
                .bind(&certificate_type)
                .bind(&search)
                .fetch_one(&self.pool)
                .await?;

        let query = format!(
            "SELECT {} FROM certificates {} ORDER BY request_date DESC LIMIT $6 OFFSET $7",
            CERTIFICATE_COLUMNS, WHERE
        );
        let items = sqlx::query_as::<_, Certificate>(&query)
            .bind(&status)
            .bind(&payment_status)
            .bind(filter.resident_id)
            .bind(&certificate_type)
            .bind(&search)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(Page::new(items, page.page, page.per_page, total))
    }

    /// pending → processing. Already processing is a no-op.
    #[instrument(skip(self))]
    pub async fn start_processing(
        &self,
        certificate_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Transition<Certificate>, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        match certificate.status() {
            CertificateStatus::Pending => {}
            CertificateStatus::Processing => return Ok(Transition::Unchanged(certificate)),
            other => {
                return Err(WorkflowError::invalid_state(format!(
                    "Only pending certificates can be processed (certificate is {})",
                    other.as_str()
                )))
            }
        }

        certificate.set_status(CertificateStatus::Processing);
        certificate.stamp_processed(actor_id, now);
        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(certificate_id = %certificate_id, "Certificate processing started");
        Ok(Transition::Applied(certificate))
    }

    /// pending/processing → approved, numbering the certificate.
    /// Any other state is returned unchanged.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        certificate_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Transition<Certificate>, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.status().can_approve() {
            info!(
                certificate_id = %certificate_id,
                status = %certificate.status,
                "Approve ignored, certificate not pending"
            );
            return Ok(Transition::Unchanged(certificate));
        }

        certificate.set_status(CertificateStatus::Approved);
        certificate.stamp_processed(approver_id, now);
        assign_number_if_absent(&mut tx, &mut certificate, now).await?;

        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        let subject = load_subject(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(
            certificate_id = %certificate_id,
            number = certificate.certificate_number.as_deref().unwrap_or_default(),
            "Certificate approved"
        );

        self.record(ActivityType::CertificateApproval, &certificate, &subject, approver_id);
        self.notifier.dispatch(email::certificate_approved(
            subject.resident.email.as_deref(),
            &subject.resident.full_name(),
            &subject.type_name,
            &certificate,
        ));

        Ok(Transition::Applied(certificate))
    }

    #[instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        certificate_id: Uuid,
        reason: &str,
        approver_id: Uuid,
    ) -> Result<Certificate, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("Rejection reason is required"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.status().can_reject() {
            return Err(WorkflowError::invalid_state(format!(
                "Certificate cannot be rejected while {}",
                certificate.status
            )));
        }

        certificate.set_status(CertificateStatus::Rejected);
        certificate.rejection_reason = Some(reason.to_string());
        certificate.stamp_processed(approver_id, now);

        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        let subject = load_subject(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(certificate_id = %certificate_id, "Certificate rejected");

        self.record(ActivityType::CertificateRejection, &certificate, &subject, approver_id);
        self.notifier.dispatch(email::certificate_rejected(
            subject.resident.email.as_deref(),
            &subject.resident.full_name(),
            &subject.type_name,
            reason,
        ));

        Ok(certificate)
    }

    /// approved → completed, creating the fee payment if the certificate has none.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        certificate_id: Uuid,
        processor_id: Uuid,
    ) -> Result<Completion, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.status().can_complete() {
            return Err(WorkflowError::invalid_state(format!(
                "Only approved certificates can be completed (certificate is {})",
                certificate.status
            )));
        }

        certificate.set_status(CertificateStatus::Completed);
        certificate.completed_date = Some(now);
        certificate.stamp_processed(processor_id, now);
        assign_number_if_absent(&mut tx, &mut certificate, now).await?;

        let (payment, payment_created) =
            payments::record_for_certificate(&mut tx, &certificate, processor_id, now).await?;

        if payment_created && certificate.payment_state() != CertificatePaymentStatus::Paid {
            certificate.set_payment_state(CertificatePaymentStatus::PendingPayment);
        }
        // Fee settled before completion: the certificate joins the payment list now.
        if certificate.is_eligible_for_payment_list() && !certificate.moved_to_payment_list {
            certificate.moved_to_payment_list = true;
            certificate.moved_to_payment_list_date = Some(now);
        }

        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        let subject = load_subject(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(
            certificate_id = %certificate_id,
            payment_id = %payment.payment_id,
            payment_created,
            "Certificate completed"
        );

        self.record(ActivityType::CertificateCompleted, &certificate, &subject, processor_id);
        if payment_created {
            self.notifier.dispatch(email::certificate_completed(
                subject.resident.email.as_deref(),
                &subject.resident.full_name(),
                &subject.type_name,
                &payment,
            ));
        }

        Ok(Completion {
            certificate,
            payment,
            payment_created,
        })
    }

    /// Resident withdraws their own pending request. Certificates owned by
    /// someone else are reported as not found.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        certificate_id: Uuid,
        resident_user_id: Uuid,
    ) -> Result<Certificate, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let resident = store::find_resident_by_user(&mut tx, resident_user_id)
            .await?
            .ok_or(WorkflowError::NotFound("Certificate"))?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if certificate.resident_id != resident.resident_id {
            return Err(WorkflowError::NotFound("Certificate"));
        }
        if !certificate.status().can_cancel() {
            return Err(WorkflowError::invalid_state(format!(
                "Only pending requests can be cancelled (certificate is {})",
                certificate.status
            )));
        }

        certificate.set_status(CertificateStatus::Cancelled);
        certificate.rejection_reason = Some(RESIDENT_CANCELLATION_REASON.to_string());
        certificate.processed_date = Some(now);

        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        let type_name =
            store::certificate_type_name(&mut tx, &certificate.certificate_type).await?;
        tx.commit().await?;

        info!(certificate_id = %certificate_id, "Certificate cancelled by resident");

        self.record(
            ActivityType::CertificateCancelled,
            &certificate,
            &Subject {
                type_name,
                resident,
            },
            resident_user_id,
        );

        Ok(certificate)
    }

    /// Edits purpose and notes while the request is still open.
    #[instrument(skip(self, purpose, notes))]
    pub async fn update_details(
        &self,
        certificate_id: Uuid,
        purpose: Option<String>,
        notes: Option<String>,
    ) -> Result<Certificate, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.status().is_editable() {
            return Err(WorkflowError::invalid_state(format!(
                "Certificate details are locked once {}",
                certificate.status
            )));
        }

        if let Some(purpose) = purpose {
            let purpose = purpose.trim();
            if purpose.is_empty() {
                return Err(WorkflowError::validation("Purpose is required"));
            }
            certificate.purpose = purpose.to_string();
        }
        if let Some(notes) = notes {
            let notes = notes.trim();
            certificate.notes = (!notes.is_empty()).then(|| notes.to_string());
        }

        let certificate = store::save_certificate(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(certificate_id = %certificate_id, "Certificate details updated");
        Ok(certificate)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, certificate_id: Uuid) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.status().is_deletable() {
            return Err(WorkflowError::invalid_state(format!(
                "Only pending or rejected certificates can be deleted (certificate is {})",
                certificate.status
            )));
        }

        sqlx::query("DELETE FROM certificates WHERE certificate_id = $1")
            .bind(certificate_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(certificate_id = %certificate_id, "Certificate deleted");
        Ok(())
    }

    /// Collects the certificate fee: settles the latest open payment or a new one.
    #[instrument(skip(self))]
    pub async fn settle_certificate(
        &self,
        certificate_id: Uuid,
        method: PaymentMethod,
        actor_id: Uuid,
    ) -> Result<(Certificate, Payment), WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if !certificate.can_proceed_to_payment() {
            return Err(WorkflowError::invalid_state(format!(
                "Certificate is not awaiting payment (status {}, payment {})",
                certificate.status, certificate.payment_status
            )));
        }

        let (payment, _) =
            payments::record_for_certificate(&mut tx, &certificate, actor_id, now).await?;
        let payment = payments::settle(
            &mut tx,
            payment,
            Some(&mut certificate),
            Some(method),
            actor_id,
            now,
        )
        .await?
        .into_inner();

        // An already-paid payment leaves the certificate untouched in settle.
        if certificate.payment_state() != CertificatePaymentStatus::Paid {
            certificate.mark_fee_paid(now);
            certificate = store::save_certificate(&mut tx, &certificate).await?;
        }

        let subject = load_subject(&mut tx, &certificate).await?;
        tx.commit().await?;

        info!(
            certificate_id = %certificate_id,
            payment_id = %payment.payment_id,
            receipt_number = payment.receipt_number.as_deref().unwrap_or_default(),
            "Certificate fee settled"
        );

        self.record(ActivityType::CertificatePayment, &certificate, &subject, actor_id);
        self.activity.record(ActivityEvent::payment(
            ActivityType::PaymentReceived,
            &payment.payment_number,
            payment.total_amount,
            &payment.payer_name,
            payment.payment_id,
            actor_id,
        ));
        self.notifier.dispatch(email::payment_received(&payment));

        Ok((certificate, payment))
    }

    /// Puts a completed, paid certificate on the payment list, repairing its payment.
    #[instrument(skip(self))]
    pub async fn move_to_payment_list(
        &self,
        certificate_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Transition<Certificate>, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut certificate = store::lock_certificate(&mut tx, certificate_id).await?;

        if certificate.status() != CertificateStatus::Completed
            || certificate.payment_state() != CertificatePaymentStatus::Paid
        {
            return Err(WorkflowError::invalid_state(
                "Only completed and paid certificates can be moved to the payment list",
            ));
        }
        if certificate.moved_to_payment_list {
            return Ok(Transition::Unchanged(certificate));
        }

        let payment =
            payments::reconcile_paid_certificate(&mut tx, &mut certificate, actor_id, now).await?;
        tx.commit().await?;

        info!(
            certificate_id = %certificate_id,
            payment_id = %payment.payment_id,
            "Certificate moved to payment list"
        );
        Ok(Transition::Applied(certificate))
    }
}
