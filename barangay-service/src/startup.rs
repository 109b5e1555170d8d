//! Application startup and lifecycle management.

use crate::config::BarangayConfig;
use crate::handlers::{catalog, certificates, health, payments};
use crate::services::{init_metrics, ActivityLog, CertificateEngine, Database, Notifier, PaymentEngine};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BarangayConfig>,
    pub db: Arc<Database>,
    pub certificates: CertificateEngine,
    pub payments: PaymentEngine,
}

impl AppState {
    pub fn new(
        config: BarangayConfig,
        db: Database,
        activity: ActivityLog,
        notifier: Notifier,
    ) -> Self {
        let pool = db.pool().clone();
        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            certificates: CertificateEngine::new(pool.clone(), activity.clone(), notifier.clone()),
            payments: PaymentEngine::new(pool, activity, notifier),
        }
    }
}

/// Routes and middleware for the HTTP API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        // Catalog and registry
        .route(
            "/certificate-types",
            get(catalog::list_certificate_types).post(catalog::create_certificate_type),
        )
        .route(
            "/certificate-types/:code",
            put(catalog::update_certificate_type),
        )
        .route("/residents", post(catalog::create_resident))
        .route("/residents/:id", get(catalog::get_resident))
        .route("/activities", get(catalog::recent_activities))
        // Certificate lifecycle
        .route(
            "/certificates",
            get(certificates::list_certificates).post(certificates::create_certificate),
        )
        .route("/certificates/mine", get(certificates::my_certificates))
        .route(
            "/certificates/:id",
            get(certificates::get_certificate)
                .put(certificates::update_certificate)
                .delete(certificates::delete_certificate),
        )
        .route(
            "/certificates/:id/process",
            post(certificates::start_processing),
        )
        .route(
            "/certificates/:id/approve",
            post(certificates::approve_certificate),
        )
        .route(
            "/certificates/:id/reject",
            post(certificates::reject_certificate),
        )
        .route(
            "/certificates/:id/complete",
            post(certificates::complete_certificate),
        )
        .route(
            "/certificates/:id/cancel",
            post(certificates::cancel_certificate),
        )
        .route(
            "/certificates/:id/settle",
            post(certificates::settle_certificate),
        )
        .route(
            "/certificates/:id/move-to-payment-list",
            post(certificates::move_certificate_to_payment_list),
        )
        // Payments
        .route("/payments", post(payments::create_payment))
        .route(
            "/payments/:id",
            get(payments::get_payment)
                .put(payments::update_payment)
                .delete(payments::delete_payment),
        )
        .route("/payments/:id/mark-paid", post(payments::mark_paid))
        .route("/payments/:id/refund", post(payments::process_refund))
        .route(
            "/payments/:id/move-to-payment-list",
            post(payments::move_payment_to_payment_list),
        )
        .route("/payment-list", get(payments::list_payment_list))
        .route("/payment-list/stats", get(payments::payment_stats))
        .route("/payment-list/sync", post(payments::sync_payment_list))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    role = tracing::field::Empty,
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    activity_writer: JoinHandle<()>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BarangayConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BarangayConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: BarangayConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let (activity, activity_writer) =
            ActivityLog::spawn(db.pool().clone(), config.activity.queue_size);

        let notifier = Notifier::from_config(config.smtp.as_ref()).map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize email provider");
            e
        })?;

        // Port 0 binds a random port for tests.
        let http_addr: SocketAddr = config.common.bind_address().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid bind address {}: {}",
                config.common.bind_address(),
                e
            ))
        })?;
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Barangay service listener bound");

        let state = AppState::new(config, db, activity, notifier);

        Ok(Self {
            http_port,
            http_listener,
            state,
            activity_writer,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "barangay-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.http_listener, router).await;
        self.activity_writer.abort();

        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }
        Ok(())
    }
}
