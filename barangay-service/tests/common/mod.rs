//! Shared test utilities for barangay-service integration tests.
//!
//! Each `TestApp` gets its own PostgreSQL schema so tests can run in parallel
//! against one database. Set `TEST_DATABASE_URL` to enable them; without it the
//! database-backed tests print a notice and return early.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use barangay_service::config::{ActivityConfig, BarangayConfig, DatabaseConfig};
use barangay_service::models::Certificate;
use barangay_service::services::{
    ActivityLog, CertificateEngine, Database, LoggingEmailProvider, NewCertificateRequest,
    NewResident, Notifier, PaymentEngine,
};
use barangay_service::startup::{build_router, AppState};
use http_body_util::BodyExt;
use service_core::config::Config as CoreConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

pub const ADMIN_ID: Uuid = Uuid::from_u128(0xA0);
pub const CLERK_ID: Uuid = Uuid::from_u128(0xC0);

pub fn get_test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|s| !s.is_empty())
}

/// Returns from the enclosing test when no database is configured.
#[macro_export]
macro_rules! skip_if_no_database {
    () => {
        if common::get_test_database_url().is_none() {
            eprintln!("Skipping database test (TEST_DATABASE_URL is not set)");
            return;
        }
    };
}

/// Config with a random port and logging-only email.
pub fn test_config(database_url: &str) -> BarangayConfig {
    BarangayConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "barangay-service".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        smtp: None,
        activity: ActivityConfig { queue_size: 64 },
    }
}

pub struct TestApp {
    pub db: Database,
    pub certificates: CertificateEngine,
    pub payments: PaymentEngine,
    pub router: Router,
    schema: String,
    base_url: String,
    activity_writer: JoinHandle<()>,
}

impl TestApp {
    /// Create an isolated schema, migrate it and wire up the engines.
    pub async fn spawn() -> Self {
        let base_url = get_test_database_url().expect("TEST_DATABASE_URL must be set");

        let schema = format!(
            "test_{}_{}",
            std::process::id(),
            SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst)
        );

        let setup_pool = PgPool::connect(&base_url)
            .await
            .expect("Failed to connect to test database");
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&setup_pool)
            .await
            .expect("Failed to create test schema");
        setup_pool.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let schema_url = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema
        );

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&schema_url)
            .await
            .expect("Failed to connect with schema search_path");

        let db = Database::from_pool(pool.clone());
        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        let (activity, activity_writer) = ActivityLog::spawn(pool, 64);
        let notifier = Notifier::new(Arc::new(LoggingEmailProvider));

        let state = AppState::new(test_config(&schema_url), db.clone(), activity, notifier);
        let certificates = state.certificates.clone();
        let payments = state.payments.clone();
        let router = build_router(state);

        Self {
            db,
            certificates,
            payments,
            router,
            schema,
            base_url,
            activity_writer,
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Registers a resident with a login and an email address.
    pub async fn create_resident(&self, first_name: &str) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let resident = self
            .db
            .create_resident(NewResident {
                user_id: Some(user_id),
                first_name: first_name.to_string(),
                middle_name: None,
                last_name: "Dela Cruz".to_string(),
                suffix: None,
                email: Some(format!("{}@example.com", first_name.to_lowercase())),
                phone: None,
                address: Some("Purok 3".to_string()),
            })
            .await
            .expect("Failed to create resident");
        (resident.resident_id, user_id)
    }

    /// A pending barangay clearance request (fee 50.00).
    pub async fn request_clearance(&self, resident_id: Uuid) -> Certificate {
        self.certificates
            .create_request(
                NewCertificateRequest {
                    resident_id,
                    certificate_type: "barangay_clearance".to_string(),
                    purpose: "Employment".to_string(),
                    notes: None,
                },
                CLERK_ID,
            )
            .await
            .expect("Failed to create certificate request")
    }

    /// Drives a fresh request through approval.
    pub async fn approved_clearance(&self, resident_id: Uuid) -> Certificate {
        let certificate = self.request_clearance(resident_id).await;
        self.certificates
            .approve(certificate.certificate_id, CLERK_ID)
            .await
            .expect("Failed to approve certificate")
            .into_inner()
    }

    /// Sends a request through the router and returns status and JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        actor: Option<(Uuid, &str)>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = actor {
            builder = builder
                .header("X-User-ID", user_id.to_string())
                .header("X-User-Role", role);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Drop the test schema.
    pub async fn cleanup(self) {
        self.activity_writer.abort();
        self.db.pool().close().await;

        if let Ok(pool) = PgPool::connect(&self.base_url).await {
            let _ = sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema))
                .execute(&pool)
                .await;
            pool.close().await;
        }
    }
}
