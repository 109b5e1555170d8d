//! Document numbers stay unique under concurrent allocation.

mod common;

use barangay_service::services::sequence;
use chrono::{Datelike, Utc};
use common::{TestApp, CLERK_ID};
use futures::future::join_all;
use std::collections::HashSet;

#[tokio::test]
async fn concurrent_allocations_never_collide() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let now = Utc::now();

    let allocations = (0..20).map(|_| {
        let pool = app.pool().clone();
        async move {
            let mut tx = pool.begin().await.unwrap();
            let number = sequence::next_payment_number(&mut tx, now).await.unwrap();
            tx.commit().await.unwrap();
            number
        }
    });
    let numbers: Vec<String> = join_all(allocations).await;

    let unique: HashSet<&String> = numbers.iter().collect();
    assert_eq!(unique.len(), 20);
    for seq in 1..=20 {
        let expected = format!("PAY-{}-{:06}", now.year(), seq);
        assert!(unique.contains(&expected), "missing {}", expected);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn rolled_back_allocation_is_reused() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let now = Utc::now();

    let mut tx = app.pool().begin().await.unwrap();
    let abandoned = sequence::next_receipt_number(&mut tx, now).await.unwrap();
    tx.rollback().await.unwrap();

    let mut tx = app.pool().begin().await.unwrap();
    let kept = sequence::next_receipt_number(&mut tx, now).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(abandoned, kept);
    assert!(kept.ends_with("-000001"));

    app.cleanup().await;
}

#[tokio::test]
async fn sequences_are_scoped_per_type() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let now = Utc::now();

    let mut tx = app.pool().begin().await.unwrap();
    let clearance = sequence::next_certificate_number(&mut tx, "barangay_clearance", now)
        .await
        .unwrap();
    let residency = sequence::next_certificate_number(&mut tx, "certificate_of_residency", now)
        .await
        .unwrap();
    let permit = sequence::next_certificate_number(&mut tx, "business_permit", now)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(clearance, format!("BC-{}-000001", now.year()));
    assert_eq!(residency, format!("CR-{}-000001", now.year()));
    assert_eq!(permit, format!("BP-{}-000001", now.year()));

    app.cleanup().await;
}

#[tokio::test]
async fn concurrent_approvals_get_distinct_numbers() {
    skip_if_no_database!();
    let app = TestApp::spawn().await;
    let (resident_id, _) = app.create_resident("Dolores").await;

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(app.request_clearance(resident_id).await.certificate_id);
    }

    let approvals = ids.iter().map(|id| app.certificates.approve(*id, CLERK_ID));
    let results = join_all(approvals).await;

    let numbers: HashSet<String> = results
        .into_iter()
        .map(|r| r.unwrap().into_inner().certificate_number.unwrap())
        .collect();
    assert_eq!(numbers.len(), 8);

    app.cleanup().await;
}
