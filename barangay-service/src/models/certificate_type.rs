use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry for a certificate kind. `code` is the immutable identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CertificateType {
    pub certificate_type_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub fee: Decimal,
    pub processing_days: i32,
    pub is_active: bool,
    pub requirements: Json<Vec<String>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

pub const CERTIFICATE_TYPE_COLUMNS: &str = "certificate_type_id, code, name, description, fee, \
    processing_days, is_active, requirements, created_utc, updated_utc";

/// Human-readable name for a code that is missing from the catalog.
pub fn fallback_type_name(code: &str) -> String {
    code.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_name_title_cases_code() {
        assert_eq!(fallback_type_name("barangay_clearance"), "Barangay Clearance");
        assert_eq!(fallback_type_name("cedula"), "Cedula");
    }
}
