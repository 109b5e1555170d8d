use service_core::error::AppError;
use thiserror::Error;

/// Failure modes of the certificate and payment workflows.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid or inactive certificate type: {0}")]
    InvalidType(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidAmount(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        WorkflowError::InvalidState(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        WorkflowError::InvalidAmount(msg.into())
    }

    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation",
            WorkflowError::InvalidType(_) => "invalid_type",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::InvalidState(_) => "invalid_state",
            WorkflowError::InvalidAmount(_) => "invalid_amount",
            WorkflowError::Database(_) => "database",
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            WorkflowError::InvalidType(code) => AppError::BadRequest(anyhow::anyhow!(
                "Invalid or inactive certificate type: {}",
                code
            )),
            WorkflowError::NotFound(entity) => {
                AppError::NotFound(anyhow::anyhow!("{} not found", entity))
            }
            WorkflowError::InvalidState(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            WorkflowError::InvalidAmount(msg) => {
                AppError::UnprocessableEntity(anyhow::anyhow!(msg))
            }
            WorkflowError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
