//! Request and response bodies for the HTTP API.

pub mod catalog;
pub mod certificates;
pub mod payments;

pub use catalog::*;
pub use certificates::*;
pub use payments::*;

use crate::models::Page;
use serde::Serialize;

/// Success envelope: `{"success": true, "message": ..., "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// A page of items mapped into their response type.
pub fn map_page<T, R>(page: Page<T>, f: impl FnMut(T) -> R) -> Page<R> {
    Page {
        items: page.items.into_iter().map(f).collect(),
        page: page.page,
        per_page: page.per_page,
        total: page.total,
        pages: page.pages,
        has_next: page.has_next,
        has_prev: page.has_prev,
    }
}
