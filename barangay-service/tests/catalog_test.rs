//! Certificate type catalog and resident registry over HTTP.

mod common;

use barangay_service::services::{NewCertificateRequest, WorkflowError};
use common::{TestApp, ADMIN_ID, CLERK_ID};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn seeded_catalog_is_visible_to_residents() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request(
            "GET",
            "/certificate-types",
            Some((Uuid::new_v4(), "resident")),
            None,
        )
        .await;

    assert_eq!(status, 200);
    let types = body["data"].as_array().unwrap();
    assert_eq!(types.len(), 6);
    let clearance = types
        .iter()
        .find(|t| t["code"] == "barangay_clearance")
        .unwrap();
    assert_eq!(clearance["fee"], "50.00");
    assert_eq!(clearance["requirements"][0], "Valid ID");

    app.cleanup().await;
}

#[tokio::test]
async fn staff_manage_certificate_types() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;

    let new_type = json!({
        "code": " Barangay_ID ",
        "name": "Barangay ID",
        "fee": "80.00",
        "requirements": ["Valid ID", "1x1 Photo"]
    });

    let (status, _) = app
        .request(
            "POST",
            "/certificate-types",
            Some((Uuid::new_v4(), "resident")),
            Some(new_type.clone()),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = app
        .request(
            "POST",
            "/certificate-types",
            Some((ADMIN_ID, "admin")),
            Some(new_type.clone()),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["code"], "barangay_id");
    assert_eq!(body["data"]["processing_days"], 3);
    assert_eq!(body["data"]["is_active"], true);

    let (status, _) = app
        .request(
            "POST",
            "/certificate-types",
            Some((ADMIN_ID, "admin")),
            Some(new_type),
        )
        .await;
    assert_eq!(status, 409);

    let (status, _) = app
        .request(
            "POST",
            "/certificate-types",
            Some((ADMIN_ID, "admin")),
            Some(json!({ "code": "permit", "name": "Permit", "fee": "-1.00" })),
        )
        .await;
    assert_eq!(status, 422);

    app.cleanup().await;
}

#[tokio::test]
async fn deactivated_types_reject_new_requests() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, user_id) = app.create_resident("Maria").await;

    let (status, body) = app
        .request(
            "PUT",
            "/certificate-types/health_certificate",
            Some((CLERK_ID, "clerk")),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["is_active"], false);

    let (_, body) = app
        .request("GET", "/certificate-types", Some((user_id, "resident")), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);

    // Residents cannot see inactive entries even when they ask.
    let (_, body) = app
        .request(
            "GET",
            "/certificate-types?include_inactive=true",
            Some((user_id, "resident")),
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);

    let (_, body) = app
        .request(
            "GET",
            "/certificate-types?include_inactive=true",
            Some((CLERK_ID, "clerk")),
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 6);

    let err = app
        .certificates
        .create_request(
            NewCertificateRequest {
                resident_id,
                certificate_type: "health_certificate".to_string(),
                purpose: "Food handler".to_string(),
                notes: None,
            },
            CLERK_ID,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidType(_)));

    let (status, _) = app
        .request(
            "PUT",
            "/certificate-types/passport",
            Some((CLERK_ID, "clerk")),
            Some(json!({ "fee": "10.00" })),
        )
        .await;
    assert_eq!(status, 404);

    app.cleanup().await;
}

#[tokio::test]
async fn fee_changes_do_not_touch_existing_requests() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Maria").await;
    let certificate = app.request_clearance(resident_id).await;

    let (status, body) = app
        .request(
            "PUT",
            "/certificate-types/barangay_clearance",
            Some((ADMIN_ID, "admin")),
            Some(json!({ "fee": "80.00" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["fee"], "80.00");

    let stored = app
        .certificates
        .get_certificate(certificate.certificate_id)
        .await
        .unwrap();
    assert_eq!(stored.fee, Decimal::new(5000, 2));

    let fresh = app.request_clearance(resident_id).await;
    assert_eq!(fresh.fee, Decimal::new(8000, 2));

    app.cleanup().await;
}

#[tokio::test]
async fn staff_register_and_fetch_residents() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let resident = json!({
        "user_id": user_id,
        "first_name": "Pedro",
        "last_name": "Santos",
        "email": "pedro@example.com",
        "address": "Purok 1"
    });

    let (status, _) = app
        .request(
            "POST",
            "/residents",
            Some((user_id, "resident")),
            Some(resident.clone()),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = app
        .request(
            "POST",
            "/residents",
            Some((CLERK_ID, "clerk")),
            Some(resident.clone()),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["status"], "approved");
    let resident_id = body["data"]["resident_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            "POST",
            "/residents",
            Some((CLERK_ID, "clerk")),
            Some(resident),
        )
        .await;
    assert_eq!(status, 409);

    let (status, body) = app
        .request(
            "GET",
            &format!("/residents/{}", resident_id),
            Some((CLERK_ID, "clerk")),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["last_name"], "Santos");

    let (status, _) = app
        .request(
            "GET",
            &format!("/residents/{}", Uuid::new_v4()),
            Some((CLERK_ID, "clerk")),
            None,
        )
        .await;
    assert_eq!(status, 404);

    app.cleanup().await;
}
