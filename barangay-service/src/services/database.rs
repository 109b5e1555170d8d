//! Database service for barangay-service.
//!
//! Owns the connection pool plus the catalog and resident registry queries.
//! Certificate and payment workflows live in their own engines.

use crate::models::{
    CertificateType, Resident, SystemActivity, CERTIFICATE_TYPE_COLUMNS, RESIDENT_COLUMNS,
};
use crate::services::error::WorkflowError;
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewCertificateType {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub fee: Decimal,
    pub processing_days: i32,
    pub requirements: Vec<String>,
}

/// Catalog edits. The code is immutable.
#[derive(Debug, Clone, Default)]
pub struct CertificateTypeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub fee: Option<Decimal>,
    pub processing_days: Option<i32>,
    pub is_active: Option<bool>,
    pub requirements: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct NewResident {
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub suffix: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Maps a unique-constraint violation onto a conflict.
fn conflict_on_duplicate(err: sqlx::Error, message: &str) -> WorkflowError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            WorkflowError::invalid_state(message)
        }
        _ => WorkflowError::Database(err),
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "barangay-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests and lazily connected routers).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Certificate Type Catalog
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn list_certificate_types(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<CertificateType>, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_certificate_types"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM certificate_types WHERE ($1 OR is_active) ORDER BY name",
            CERTIFICATE_TYPE_COLUMNS
        );
        let types = sqlx::query_as::<_, CertificateType>(&query)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        timer.observe_duration();
        Ok(types)
    }

    #[instrument(skip(self))]
    pub async fn get_certificate_type(&self, code: &str) -> Result<CertificateType, WorkflowError> {
        let query = format!(
            "SELECT {} FROM certificate_types WHERE code = $1",
            CERTIFICATE_TYPE_COLUMNS
        );
        sqlx::query_as::<_, CertificateType>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::NotFound("Certificate type"))
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_certificate_type(
        &self,
        input: NewCertificateType,
    ) -> Result<CertificateType, WorkflowError> {
        let code = input.code.trim().to_lowercase();
        let name = input.name.trim().to_string();
        if code.is_empty() || name.is_empty() {
            return Err(WorkflowError::validation("code and name are required"));
        }
        if input.fee < Decimal::ZERO {
            return Err(WorkflowError::invalid_amount("Fee cannot be negative"));
        }
        if input.processing_days < 0 {
            return Err(WorkflowError::validation("processing_days cannot be negative"));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_certificate_type"])
            .start_timer();

        let query = format!(
            r#"
            INSERT INTO certificate_types (certificate_type_id, code, name, description, fee,
                processing_days, is_active, requirements)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            RETURNING {}
            "#,
            CERTIFICATE_TYPE_COLUMNS
        );
        let certificate_type = sqlx::query_as::<_, CertificateType>(&query)
            .bind(Uuid::new_v4())
            .bind(&code)
            .bind(&name)
            .bind(&input.description)
            .bind(input.fee)
            .bind(input.processing_days)
            .bind(Json(&input.requirements))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_duplicate(e, "A certificate type with this code or name already exists"))?;

        timer.observe_duration();
        info!(code = %certificate_type.code, fee = %certificate_type.fee, "Certificate type created");
        Ok(certificate_type)
    }

    /// Updates a catalog entry. Existing certificates keep their fee snapshot.
    #[instrument(skip(self, changes))]
    pub async fn update_certificate_type(
        &self,
        code: &str,
        changes: CertificateTypeUpdate,
    ) -> Result<CertificateType, WorkflowError> {
        let mut current = self.get_certificate_type(code).await?;

        if let Some(name) = changes.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(WorkflowError::validation("name cannot be empty"));
            }
            current.name = name.to_string();
        }
        if changes.description.is_some() {
            current.description = changes
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
        }
        if let Some(fee) = changes.fee {
            if fee < Decimal::ZERO {
                return Err(WorkflowError::invalid_amount("Fee cannot be negative"));
            }
            current.fee = fee;
        }
        if let Some(days) = changes.processing_days {
            if days < 0 {
                return Err(WorkflowError::validation("processing_days cannot be negative"));
            }
            current.processing_days = days;
        }
        if let Some(active) = changes.is_active {
            current.is_active = active;
        }
        if let Some(requirements) = changes.requirements {
            current.requirements = Json(requirements);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_certificate_type"])
            .start_timer();

        let query = format!(
            r#"
            UPDATE certificate_types
            SET name = $2, description = $3, fee = $4, processing_days = $5, is_active = $6,
                requirements = $7, updated_utc = NOW()
            WHERE code = $1
            RETURNING {}
            "#,
            CERTIFICATE_TYPE_COLUMNS
        );
        let updated = sqlx::query_as::<_, CertificateType>(&query)
            .bind(code)
            .bind(&current.name)
            .bind(&current.description)
            .bind(current.fee)
            .bind(current.processing_days)
            .bind(current.is_active)
            .bind(&current.requirements)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict_on_duplicate(e, "A certificate type with this name already exists"))?
            .ok_or(WorkflowError::NotFound("Certificate type"))?;

        timer.observe_duration();
        info!(code = %code, "Certificate type updated");
        Ok(updated)
    }

    // =========================================================================
    // Resident Registry
    // =========================================================================

    #[instrument(skip(self, input))]
    pub async fn create_resident(&self, input: NewResident) -> Result<Resident, WorkflowError> {
        let first_name = input.first_name.trim().to_string();
        let last_name = input.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(WorkflowError::validation(
                "first_name and last_name are required",
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_resident"])
            .start_timer();

        let query = format!(
            r#"
            INSERT INTO residents (resident_id, user_id, first_name, middle_name, last_name, suffix,
                email, phone, address, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'approved')
            RETURNING {}
            "#,
            RESIDENT_COLUMNS
        );
        let resident = sqlx::query_as::<_, Resident>(&query)
            .bind(Uuid::new_v4())
            .bind(input.user_id)
            .bind(&first_name)
            .bind(&input.middle_name)
            .bind(&last_name)
            .bind(&input.suffix)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.address)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_duplicate(e, "A resident is already linked to this user"))?;

        timer.observe_duration();
        info!(resident_id = %resident.resident_id, "Resident registered");
        Ok(resident)
    }

    #[instrument(skip(self))]
    pub async fn get_resident(&self, resident_id: Uuid) -> Result<Resident, WorkflowError> {
        let query = format!(
            "SELECT {} FROM residents WHERE resident_id = $1",
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&query)
            .bind(resident_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::NotFound("Resident"))
    }

    #[instrument(skip(self))]
    pub async fn get_resident_by_user(&self, user_id: Uuid) -> Result<Resident, WorkflowError> {
        let query = format!("SELECT {} FROM residents WHERE user_id = $1", RESIDENT_COLUMNS);
        sqlx::query_as::<_, Resident>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::NotFound("Resident"))
    }

    // =========================================================================
    // Activity Log
    // =========================================================================

    /// Most recent audit entries, newest first.
    #[instrument(skip(self))]
    pub async fn recent_activities(&self, limit: i64) -> Result<Vec<SystemActivity>, WorkflowError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recent_activities"])
            .start_timer();

        let activities = sqlx::query_as::<_, SystemActivity>(
            r#"
            SELECT activity_id, activity_type, description, actor_id, target_id, target_type, created_utc
            FROM system_activities
            ORDER BY created_utc DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(activities)
    }
}
