use crate::services::{CertificateTypeUpdate, NewCertificateType, NewResident};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct CertificateTypeQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCertificateTypeRequest {
    #[validate(length(min = 1, max = 50, message = "Code is required"))]
    pub code: String,

    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    pub description: Option<String>,
    pub fee: Decimal,

    #[validate(range(min = 0, message = "Processing days cannot be negative"))]
    pub processing_days: Option<i32>,

    #[serde(default)]
    pub requirements: Vec<String>,
}

impl From<CreateCertificateTypeRequest> for NewCertificateType {
    fn from(req: CreateCertificateTypeRequest) -> Self {
        Self {
            code: req.code,
            name: req.name,
            description: req.description,
            fee: req.fee,
            processing_days: req.processing_days.unwrap_or(3),
            requirements: req.requirements,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCertificateTypeRequest {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,

    pub description: Option<String>,
    pub fee: Option<Decimal>,

    #[validate(range(min = 0, message = "Processing days cannot be negative"))]
    pub processing_days: Option<i32>,

    pub is_active: Option<bool>,
    pub requirements: Option<Vec<String>>,
}

impl From<UpdateCertificateTypeRequest> for CertificateTypeUpdate {
    fn from(req: UpdateCertificateTypeRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            fee: req.fee,
            processing_days: req.processing_days,
            is_active: req.is_active,
            requirements: req.requirements,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateResidentRequest {
    pub user_id: Option<Uuid>,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(max = 100))]
    pub middle_name: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,

    #[validate(length(max = 20))]
    pub suffix: Option<String>,

    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,

    pub address: Option<String>,
}

impl From<CreateResidentRequest> for NewResident {
    fn from(req: CreateResidentRequest) -> Self {
        Self {
            user_id: req.user_id,
            first_name: req.first_name,
            middle_name: req.middle_name,
            last_name: req.last_name,
            suffix: req.suffix,
            email: req.email,
            phone: req.phone,
            address: req.address,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}
