//! Certificate request and issuance endpoints.
//!
//! Staff (admin, clerk) drive the workflow. Residents may request, view and
//! cancel their own certificates only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::tracked;
use crate::dtos::{
    map_page, ApiResponse, CertificateDetailResponse, CertificateListQuery,
    CertificatePaymentResponse, CertificateResponse, CreateCertificateRequest,
    RejectCertificateRequest, SettleCertificateRequest, UpdateCertificateRequest,
};
use crate::middleware::{ActorContext, Role};
use crate::models::{Certificate, Page, Transition};
use crate::services::{NewCertificateRequest, WorkflowError};
use crate::startup::AppState;

type Envelope<T> = Json<ApiResponse<T>>;

/// Resident record behind a resident login.
async fn own_resident_id(state: &AppState, actor: &ActorContext) -> Result<Uuid, AppError> {
    Ok(state
        .db
        .get_resident_by_user(actor.user_id)
        .await?
        .resident_id)
}

pub async fn create_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreateCertificateRequest>,
) -> Result<(StatusCode, Envelope<CertificateResponse>), AppError> {
    payload.validate()?;

    let resident_id = match actor.role {
        Role::Resident => {
            let own = own_resident_id(&state, &actor).await?;
            if payload.resident_id.is_some_and(|id| id != own) {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Residents can only request certificates for themselves"
                )));
            }
            own
        }
        Role::Admin | Role::Clerk => payload
            .resident_id
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("resident_id is required")))?,
    };

    tracing::info!(
        resident_id = %resident_id,
        certificate_type = %payload.certificate_type,
        actor_id = %actor.user_id,
        "Creating certificate request"
    );

    let certificate = tracked(
        "create_request",
        state
            .certificates
            .create_request(
                NewCertificateRequest {
                    resident_id,
                    certificate_type: payload.certificate_type,
                    purpose: payload.purpose,
                    notes: payload.notes,
                },
                actor.user_id,
            )
            .await,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Certificate request submitted",
            certificate.into(),
        )),
    ))
}

pub async fn list_certificates(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<CertificateListQuery>,
) -> Result<Envelope<Page<CertificateResponse>>, AppError> {
    actor.require_staff()?;

    let filter = query.filter()?;
    let page = state
        .certificates
        .list_certificates(&filter, query.page_request())
        .await?;

    Ok(Json(ApiResponse::ok(
        "Certificates retrieved",
        map_page(page, CertificateResponse::from),
    )))
}

/// The calling resident's own requests.
pub async fn my_certificates(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<CertificateListQuery>,
) -> Result<Envelope<Page<CertificateResponse>>, AppError> {
    actor.require_resident()?;

    let mut filter = query.filter()?;
    filter.resident_id = Some(own_resident_id(&state, &actor).await?);
    let page = state
        .certificates
        .list_certificates(&filter, query.page_request())
        .await?;

    Ok(Json(ApiResponse::ok(
        "Certificates retrieved",
        map_page(page, CertificateResponse::from),
    )))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificateDetailResponse>, AppError> {
    let detail = state.certificates.certificate_detail(certificate_id).await?;

    if !actor.is_staff() {
        let own = own_resident_id(&state, &actor).await?;
        if detail.certificate.resident_id != own {
            return Err(WorkflowError::NotFound("Certificate").into());
        }
    }

    Ok(Json(ApiResponse::ok("Certificate retrieved", detail.into())))
}

pub async fn update_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
    Json(payload): Json<UpdateCertificateRequest>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let certificate = tracked(
        "update_certificate",
        state
            .certificates
            .update_details(certificate_id, payload.purpose, payload.notes)
            .await,
    )?;

    Ok(Json(ApiResponse::ok("Certificate updated", certificate.into())))
}

pub async fn delete_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    actor.require_staff()?;

    tracked(
        "delete_certificate",
        state.certificates.delete(certificate_id).await,
    )?;

    tracing::info!(certificate_id = %certificate_id, actor_id = %actor.user_id, "Certificate deleted");
    Ok(Json(ApiResponse::message("Certificate deleted")))
}

fn transition_response(
    transition: Transition<Certificate>,
    applied: &str,
    unchanged: &str,
) -> Envelope<CertificateResponse> {
    let message = if transition.applied() { applied } else { unchanged };
    Json(ApiResponse::ok(message, transition.into_inner().into()))
}

pub async fn start_processing(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_staff()?;

    let transition = tracked(
        "start_processing",
        state
            .certificates
            .start_processing(certificate_id, actor.user_id)
            .await,
    )?;

    Ok(transition_response(
        transition,
        "Certificate is now being processed",
        "Certificate is already being processed",
    ))
}

pub async fn approve_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_staff()?;

    let transition = tracked(
        "approve",
        state
            .certificates
            .approve(certificate_id, actor.user_id)
            .await,
    )?;

    Ok(transition_response(
        transition,
        "Certificate approved",
        "Certificate is not awaiting approval, no changes made",
    ))
}

pub async fn reject_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
    Json(payload): Json<RejectCertificateRequest>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let certificate = tracked(
        "reject",
        state
            .certificates
            .reject(certificate_id, &payload.reason, actor.user_id)
            .await,
    )?;

    Ok(Json(ApiResponse::ok("Certificate rejected", certificate.into())))
}

pub async fn complete_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificatePaymentResponse>, AppError> {
    actor.require_staff()?;

    let completion = tracked(
        "complete",
        state
            .certificates
            .complete(certificate_id, actor.user_id)
            .await,
    )?;

    let message = if completion.payment_created {
        "Certificate completed and payment created"
    } else {
        "Certificate completed"
    };

    Ok(Json(ApiResponse::ok(
        message,
        CertificatePaymentResponse {
            certificate: completion.certificate.into(),
            payment: completion.payment.into(),
        },
    )))
}

pub async fn cancel_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_resident()?;

    let certificate = tracked(
        "cancel",
        state
            .certificates
            .cancel(certificate_id, actor.user_id)
            .await,
    )?;

    Ok(Json(ApiResponse::ok(
        "Certificate request cancelled",
        certificate.into(),
    )))
}

pub async fn settle_certificate(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
    Json(payload): Json<SettleCertificateRequest>,
) -> Result<Envelope<CertificatePaymentResponse>, AppError> {
    actor.require_staff()?;
    let method = payload.method()?;

    let (certificate, payment) = tracked(
        "settle_certificate",
        state
            .certificates
            .settle_certificate(certificate_id, method, actor.user_id)
            .await,
    )?;

    Ok(Json(ApiResponse::ok(
        "Certificate payment recorded",
        CertificatePaymentResponse {
            certificate: certificate.into(),
            payment: payment.into(),
        },
    )))
}

pub async fn move_certificate_to_payment_list(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(certificate_id): Path<Uuid>,
) -> Result<Envelope<CertificateResponse>, AppError> {
    actor.require_staff()?;

    let transition = tracked(
        "move_certificate_to_payment_list",
        state
            .certificates
            .move_to_payment_list(certificate_id, actor.user_id)
            .await,
    )?;

    Ok(transition_response(
        transition,
        "Certificate moved to payment list",
        "Certificate is already on the payment list",
    ))
}
