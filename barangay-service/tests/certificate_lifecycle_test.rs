//! Certificate workflow against a real database.

mod common;

use barangay_service::models::{
    CertificatePaymentStatus, CertificateStatus, PageRequest, PaymentMethod,
};
use barangay_service::services::{CertificateFilter, NewCertificateRequest, WorkflowError};
use chrono::{Datelike, Utc};
use common::{TestApp, ADMIN_ID, CLERK_ID};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn request_starts_pending_with_type_fee() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Maria").await;

    let certificate = app.request_clearance(resident_id).await;

    assert_eq!(certificate.status(), CertificateStatus::Pending);
    assert_eq!(certificate.payment_state(), CertificatePaymentStatus::Unpaid);
    assert_eq!(certificate.fee, Decimal::new(5000, 2));
    assert!(certificate.certificate_number.is_none());

    app.cleanup().await;
}

#[tokio::test]
async fn request_rejects_unknown_type_and_blank_purpose() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Jose").await;

    let err = app
        .certificates
        .create_request(
            NewCertificateRequest {
                resident_id,
                certificate_type: "fishing_license".to_string(),
                purpose: "Leisure".to_string(),
                notes: None,
            },
            CLERK_ID,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidType(_)));

    let err = app
        .certificates
        .create_request(
            NewCertificateRequest {
                resident_id,
                certificate_type: "barangay_clearance".to_string(),
                purpose: "   ".to_string(),
                notes: None,
            },
            CLERK_ID,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = app
        .certificates
        .create_request(
            NewCertificateRequest {
                resident_id: Uuid::new_v4(),
                certificate_type: "barangay_clearance".to_string(),
                purpose: "Employment".to_string(),
                notes: None,
            },
            CLERK_ID,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound("Resident")));

    app.cleanup().await;
}

#[tokio::test]
async fn approval_assigns_yearly_number() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Ana").await;
    let year = Utc::now().year();

    let first = app.approved_clearance(resident_id).await;
    let second = app.approved_clearance(resident_id).await;

    assert_eq!(first.status(), CertificateStatus::Approved);
    assert_eq!(
        first.certificate_number.as_deref(),
        Some(format!("BC-{}-000001", year).as_str())
    );
    assert_eq!(
        second.certificate_number.as_deref(),
        Some(format!("BC-{}-000002", year).as_str())
    );

    // Approving again leaves it untouched.
    let again = app
        .certificates
        .approve(first.certificate_id, ADMIN_ID)
        .await
        .unwrap();
    assert!(!again.applied());
    assert_eq!(again.into_inner().certificate_number, first.certificate_number);

    app.cleanup().await;
}

#[tokio::test]
async fn processing_is_idempotent_and_only_from_pending() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Pedro").await;
    let certificate = app.request_clearance(resident_id).await;

    let first = app
        .certificates
        .start_processing(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();
    assert!(first.applied());
    let second = app
        .certificates
        .start_processing(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();
    assert!(!second.applied());

    // processing → approved is allowed
    let approved = app
        .certificates
        .approve(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();
    assert!(approved.applied());

    let err = app
        .certificates
        .start_processing(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn completion_creates_a_single_pending_payment() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Liza").await;
    let certificate = app.approved_clearance(resident_id).await;

    let completion = app
        .certificates
        .complete(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();

    assert!(completion.payment_created);
    assert_eq!(completion.certificate.status(), CertificateStatus::Completed);
    assert_eq!(
        completion.certificate.payment_state(),
        CertificatePaymentStatus::PendingPayment
    );
    assert!(!completion.certificate.moved_to_payment_list);

    let payment = &completion.payment;
    assert_eq!(payment.payment_status, "pending");
    assert_eq!(payment.total_amount, Decimal::new(5000, 2));
    assert_eq!(payment.certificate_id, Some(certificate.certificate_id));
    assert!(payment.is_certificate_payment);
    assert_eq!(payment.payer_name, "Liza Dela Cruz");
    assert!(payment
        .payment_number
        .starts_with(&format!("PAY-{}-", Utc::now().year())));

    // A completed certificate cannot be completed twice.
    let err = app
        .certificates
        .complete(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE certificate_id = $1")
            .bind(certificate.certificate_id)
            .fetch_one(app.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn marking_payment_paid_settles_certificate() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Carlo").await;
    let certificate = app.approved_clearance(resident_id).await;
    let completion = app
        .certificates
        .complete(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();

    let transition = app
        .payments
        .mark_paid(
            completion.payment.payment_id,
            Some(PaymentMethod::Cash),
            CLERK_ID,
        )
        .await
        .unwrap();
    assert!(transition.applied());

    let payment = transition.into_inner();
    assert_eq!(payment.payment_status, "paid");
    assert_eq!(payment.payment_method, "cash");
    assert!(payment.payment_date.is_some());
    assert!(payment.moved_to_payment_list);
    let now = Utc::now();
    assert!(payment
        .receipt_number
        .as_deref()
        .unwrap_or_default()
        .starts_with(&format!("RCP-{}{:02}-", now.year(), now.month())));

    let detail = app
        .certificates
        .certificate_detail(certificate.certificate_id)
        .await
        .unwrap();
    assert_eq!(
        detail.certificate.payment_state(),
        CertificatePaymentStatus::Paid
    );
    assert!(detail.certificate.payment_completed);
    assert!(detail.certificate.moved_to_payment_list);
    assert!(detail.certificate.is_ready_for_payment_list());
    assert!(detail.has_payment());

    // Paying again is a no-op and keeps the receipt.
    let again = app
        .payments
        .mark_paid(completion.payment.payment_id, None, CLERK_ID)
        .await
        .unwrap();
    assert!(!again.applied());
    assert_eq!(again.into_inner().receipt_number, payment.receipt_number);

    app.cleanup().await;
}

#[tokio::test]
async fn settling_before_completion_moves_on_completion() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Rosa").await;
    let certificate = app.approved_clearance(resident_id).await;

    let (settled, payment) = app
        .certificates
        .settle_certificate(certificate.certificate_id, PaymentMethod::Gcash, CLERK_ID)
        .await
        .unwrap();
    assert_eq!(settled.payment_state(), CertificatePaymentStatus::Paid);
    assert!(!settled.moved_to_payment_list);
    assert_eq!(payment.payment_status, "paid");
    assert!(payment.receipt_number.is_some());

    // Fee already settled: nothing left to collect.
    let err = app
        .certificates
        .settle_certificate(certificate.certificate_id, PaymentMethod::Cash, CLERK_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    let completion = app
        .certificates
        .complete(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap();
    assert!(!completion.payment_created);
    assert_eq!(completion.payment.payment_id, payment.payment_id);
    assert_eq!(
        completion.certificate.payment_state(),
        CertificatePaymentStatus::Paid
    );
    assert!(completion.certificate.moved_to_payment_list);

    app.cleanup().await;
}

#[tokio::test]
async fn rejection_requires_reason_and_open_request() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Nena").await;
    let certificate = app.request_clearance(resident_id).await;

    let err = app
        .certificates
        .reject(certificate.certificate_id, " ", CLERK_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let rejected = app
        .certificates
        .reject(certificate.certificate_id, "Incomplete requirements", CLERK_ID)
        .await
        .unwrap();
    assert_eq!(rejected.status(), CertificateStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Incomplete requirements")
    );

    let err = app
        .certificates
        .complete(certificate.certificate_id, CLERK_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn residents_cancel_only_their_own_pending_requests() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (owner_id, owner_user) = app.create_resident("Tess").await;
    let (_, other_user) = app.create_resident("Ramon").await;
    let certificate = app.request_clearance(owner_id).await;

    let err = app
        .certificates
        .cancel(certificate.certificate_id, other_user)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound("Certificate")));

    let cancelled = app
        .certificates
        .cancel(certificate.certificate_id, owner_user)
        .await
        .unwrap();
    assert_eq!(cancelled.status(), CertificateStatus::Cancelled);
    assert_eq!(
        cancelled.rejection_reason.as_deref(),
        Some("Cancelled by resident")
    );

    let err = app
        .certificates
        .cancel(certificate.certificate_id, owner_user)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn editing_and_deleting_follow_status() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Lito").await;
    let pending = app.request_clearance(resident_id).await;

    let updated = app
        .certificates
        .update_details(
            pending.certificate_id,
            Some("Scholarship".to_string()),
            Some("Bring two IDs".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(updated.purpose, "Scholarship");
    assert_eq!(updated.notes.as_deref(), Some("Bring two IDs"));

    let completed = app.approved_clearance(resident_id).await;
    app.certificates
        .complete(completed.certificate_id, CLERK_ID)
        .await
        .unwrap();

    let err = app
        .certificates
        .update_details(completed.certificate_id, Some("Travel".to_string()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    let err = app
        .certificates
        .delete(completed.certificate_id)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    app.certificates.delete(pending.certificate_id).await.unwrap();
    let err = app
        .certificates
        .get_certificate(pending.certificate_id)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound("Certificate")));

    app.cleanup().await;
}

#[tokio::test]
async fn listing_filters_by_status_and_search() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Elena").await;
    app.request_clearance(resident_id).await;
    let approved = app.approved_clearance(resident_id).await;

    let page = app
        .certificates
        .list_certificates(
            &CertificateFilter {
                status: Some(CertificateStatus::Approved),
                ..Default::default()
            },
            PageRequest::new(None, None),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].certificate_id, approved.certificate_id);

    let number = approved.certificate_number.clone().unwrap();
    let page = app
        .certificates
        .list_certificates(
            &CertificateFilter {
                search: Some(number[number.len() - 6..].to_string()),
                ..Default::default()
            },
            PageRequest::new(Some(1), Some(10)),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let page = app
        .certificates
        .list_certificates(
            &CertificateFilter {
                resident_id: Some(resident_id),
                ..Default::default()
            },
            PageRequest::new(Some(1), Some(1)),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert!(page.has_next);

    app.cleanup().await;
}

#[tokio::test]
async fn resident_flow_over_http() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, user_id) = app.create_resident("Gloria").await;
    let (_, stranger) = app.create_resident("Benny").await;

    let (status, body) = app
        .request(
            "POST",
            "/certificates",
            Some((user_id, "resident")),
            Some(json!({
                "certificate_type": "certificate_of_residency",
                "purpose": "School enrollment"
            })),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["resident_id"], resident_id.to_string());
    assert_eq!(body["data"]["status"], "pending");
    let certificate_id = body["data"]["certificate_id"].as_str().unwrap().to_string();

    let uri = format!("/certificates/{}", certificate_id);
    let (status, body) = app.request("GET", &uri, Some((user_id, "resident")), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["type_name"], "Certificate of Residency");
    assert_eq!(body["data"]["has_payment"], false);

    let (status, _) = app
        .request("GET", &uri, Some((stranger, "resident")), None)
        .await;
    assert_eq!(status, 404);

    let (status, body) = app
        .request("GET", "/certificates/mine", Some((user_id, "resident")), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);

    let approve = format!("/certificates/{}/approve", certificate_id);
    let (status, body) = app
        .request("POST", &approve, Some((CLERK_ID, "clerk")), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "approved");

    let complete = format!("/certificates/{}/complete", certificate_id);
    let (status, body) = app
        .request("POST", &complete, Some((CLERK_ID, "clerk")), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["certificate"]["payment_status"], "pending_payment");
    assert_eq!(body["data"]["payment"]["payment_status"], "pending");

    let (status, body) = app
        .request("POST", &complete, Some((CLERK_ID, "clerk")), None)
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);

    app.cleanup().await;
}
