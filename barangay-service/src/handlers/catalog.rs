//! Certificate type catalog, resident bootstrap and activity log endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    ActivityQuery, ApiResponse, CertificateTypeQuery, CreateCertificateTypeRequest,
    CreateResidentRequest, UpdateCertificateTypeRequest,
};
use crate::middleware::ActorContext;
use crate::models::{CertificateType, Resident, SystemActivity};
use crate::startup::AppState;

type Envelope<T> = Json<ApiResponse<T>>;

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

/// Active types for everyone. Staff may ask for inactive ones too.
pub async fn list_certificate_types(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<CertificateTypeQuery>,
) -> Result<Envelope<Vec<CertificateType>>, AppError> {
    let include_inactive = query.include_inactive && actor.is_staff();
    let types = state.db.list_certificate_types(include_inactive).await?;
    Ok(Json(ApiResponse::ok("Certificate types retrieved", types)))
}

pub async fn create_certificate_type(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreateCertificateTypeRequest>,
) -> Result<(StatusCode, Envelope<CertificateType>), AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let certificate_type = state.db.create_certificate_type(payload.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Certificate type created", certificate_type)),
    ))
}

pub async fn update_certificate_type(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(code): Path<String>,
    Json(payload): Json<UpdateCertificateTypeRequest>,
) -> Result<Envelope<CertificateType>, AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let certificate_type = state
        .db
        .update_certificate_type(&code, payload.into())
        .await?;
    Ok(Json(ApiResponse::ok("Certificate type updated", certificate_type)))
}

pub async fn create_resident(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreateResidentRequest>,
) -> Result<(StatusCode, Envelope<Resident>), AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let resident = state.db.create_resident(payload.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Resident registered", resident)),
    ))
}

pub async fn get_resident(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(resident_id): Path<Uuid>,
) -> Result<Envelope<Resident>, AppError> {
    actor.require_staff()?;

    let resident = state.db.get_resident(resident_id).await?;
    Ok(Json(ApiResponse::ok("Resident retrieved", resident)))
}

pub async fn recent_activities(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<ActivityQuery>,
) -> Result<Envelope<Vec<SystemActivity>>, AppError> {
    actor.require_admin()?;

    let activities = state
        .db
        .recent_activities(query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
        .await?;
    Ok(Json(ApiResponse::ok("Recent activity retrieved", activities)))
}
