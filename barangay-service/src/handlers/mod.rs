//! HTTP handlers for barangay-service.

pub mod catalog;
pub mod certificates;
pub mod health;
pub mod payments;

use crate::services::{record_workflow_operation, WorkflowError};
use service_core::error::AppError;

/// Counts the outcome of a workflow call and converts its error for the response.
pub(crate) fn tracked<T>(
    operation: &'static str,
    result: Result<T, WorkflowError>,
) -> Result<T, AppError> {
    match &result {
        Ok(_) => record_workflow_operation(operation, "success"),
        Err(e) => record_workflow_operation(operation, e.kind()),
    }
    result.map_err(AppError::from)
}
