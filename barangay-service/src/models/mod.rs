//! Data models for barangay-service.

pub mod activity;
pub mod certificate;
pub mod certificate_type;
pub mod numbering;
pub mod payment;
pub mod resident;

pub use activity::{ActivityEvent, ActivityType, SystemActivity};
pub use certificate::{
    Certificate, CertificatePaymentStatus, CertificateStatus, Transition, CERTIFICATE_COLUMNS,
};
pub use certificate_type::{CertificateType, CERTIFICATE_TYPE_COLUMNS};
pub use payment::{
    Payment, PaymentAmounts, PaymentMethod, PaymentStats, PaymentStatus, RefundPlan,
    PAYMENT_COLUMNS,
};
pub use resident::{Resident, RESIDENT_COLUMNS};

use serde::Serialize;

/// One page of a listing with the totals needed to render pagination.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let pages = ((total.max(0) as u64).div_ceil(per_page as u64)) as u32;
        Self {
            items,
            page,
            per_page,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }
}

/// Normalized 1-based page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_inputs() {
        let req = PageRequest::new(Some(0), Some(500));
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, 100);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(Some(3), None);
        assert_eq!(req.offset(), 40);
        assert_eq!(req.limit(), 20);
    }

    #[test]
    fn page_totals() {
        let page = Page::new(vec![1, 2], 2, 20, 41);
        assert_eq!(page.pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);

        let empty: Page<i32> = Page::new(vec![], 1, 20, 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}
