//! Payment and payment-list endpoints. Staff only.

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
    map_page, ApiResponse, CreatePaymentRequest, MarkPaidRequest, PaymentListQuery,
    PaymentResponse, RefundRequest, SyncResponse, UpdatePaymentRequest,
};
use crate::middleware::ActorContext;
use crate::models::{Page, PaymentStats};
use crate::startup::AppState;

type Envelope<T> = Json<ApiResponse<T>>;

pub async fn create_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Envelope<PaymentResponse>), AppError> {
    actor.require_staff()?;
    payload.validate()?;
    let input = payload.into_new_payment()?;

    tracing::info!(
        resident_id = %input.resident_id,
        certificate_id = ?input.certificate_id,
        total = %input.amounts.total(),
        actor_id = %actor.user_id,
        "Recording payment"
    );

    let payment = tracked(
        "create_payment",
        state.payments.create_payment(input, actor.user_id).await,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Payment recorded", payment.into())),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Envelope<PaymentResponse>, AppError> {
    actor.require_staff()?;

    let payment = state.payments.get_payment(payment_id).await?;
    Ok(Json(ApiResponse::ok("Payment retrieved", payment.into())))
}

pub async fn update_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Envelope<PaymentResponse>, AppError> {
    actor.require_staff()?;
    payload.validate()?;
    let changes = payload.into_update()?;

    let payment = tracked(
        "update_payment",
        state
            .payments
            .update_payment(payment_id, changes, actor.user_id)
            .await,
    )?;

    Ok(Json(ApiResponse::ok("Payment updated", payment.into())))
}

pub async fn delete_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    actor.require_admin()?;

    tracked(
        "delete_payment",
        state.payments.delete_payment(payment_id).await,
    )?;

    tracing::info!(payment_id = %payment_id, actor_id = %actor.user_id, "Payment deleted");
    Ok(Json(ApiResponse::message("Payment deleted")))
}

/// Body is optional; without one the stored payment method is kept.
pub async fn mark_paid(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    payload: Option<Json<MarkPaidRequest>>,
) -> Result<Envelope<PaymentResponse>, AppError> {
    actor.require_staff()?;
    let method = payload
        .map(|Json(body)| body)
        .unwrap_or_default()
        .method()?;

    let transition = tracked(
        "mark_paid",
        state
            .payments
            .mark_paid(payment_id, method, actor.user_id)
            .await,
    )?;

    let message = if transition.applied() {
        "Payment marked as paid"
    } else {
        "Payment is already paid"
    };
    Ok(Json(ApiResponse::ok(message, transition.into_inner().into())))
}

pub async fn process_refund(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<Envelope<PaymentResponse>, AppError> {
    actor.require_staff()?;
    payload.validate()?;

    let payment = tracked(
        "process_refund",
        state
            .payments
            .process_refund(payment_id, payload.amount, &payload.reason, actor.user_id)
            .await,
    )?;

    Ok(Json(ApiResponse::ok("Refund processed", payment.into())))
}

pub async fn move_payment_to_payment_list(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    actor.require_staff()?;

    let moved = tracked(
        "move_payment_to_payment_list",
        state
            .payments
            .move_to_payment_list(payment_id, actor.user_id)
            .await,
    )?;

    let message = if moved {
        "Payment moved to payment list"
    } else {
        "Payment was not moved: already on the payment list or not a certificate payment"
    };
    Ok(Json(ApiResponse::message(message)))
}

pub async fn list_payment_list(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(query): Query<PaymentListQuery>,
) -> Result<Envelope<Page<PaymentResponse>>, AppError> {
    actor.require_staff()?;

    let filter = query.filter()?;
    let page = state
        .payments
        .list_payment_list(&filter, query.page_request())
        .await?;

    Ok(Json(ApiResponse::ok(
        "Payment list retrieved",
        map_page(page, PaymentResponse::from),
    )))
}

pub async fn payment_stats(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<Envelope<PaymentStats>, AppError> {
    actor.require_staff()?;

    let stats = state.payments.payment_stats().await?;
    Ok(Json(ApiResponse::ok("Payment statistics", stats)))
}

pub async fn sync_payment_list(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<Envelope<SyncResponse>, AppError> {
    actor.require_staff()?;

    let moved_count = tracked(
        "sync_all_pending",
        state.payments.sync_all_pending(actor.user_id).await,
    )?;

    Ok(Json(ApiResponse::ok(
        format!("Moved {} certificate(s) to the payment list", moved_count),
        SyncResponse { moved_count },
    )))
}
