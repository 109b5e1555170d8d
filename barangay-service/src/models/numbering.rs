//! Document number formats and the counter scopes they draw from.
//!
//! Each number is `{scope}-{seq:06}` where the scope is also the key of the
//! row in `sequence_counters`, so sequences restart per type and year
//! (certificates, payments) or per month (receipts).

use chrono::{DateTime, Datelike, Utc};

/// Two-letter prefix for a certificate type code.
pub fn type_prefix(type_code: &str) -> &'static str {
    match type_code {
        "barangay_clearance" => "BC",
        "certificate_of_residency" => "CR",
        "certificate_of_indigency" => "CI",
        "business_permit" => "BP",
        "cedula" => "CD",
        _ => "CT",
    }
}

pub fn certificate_scope(type_code: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", type_prefix(type_code), now.year())
}

pub fn payment_scope(now: DateTime<Utc>) -> String {
    format!("PAY-{}", now.year())
}

pub fn receipt_scope(now: DateTime<Utc>) -> String {
    format!("RCP-{}{:02}", now.year(), now.month())
}

/// Appends the zero-padded sequence value to a scope.
pub fn format_number(scope: &str, seq: i64) -> String {
    format!("{}-{:06}", scope, seq)
}
