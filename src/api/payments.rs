//! Payment reconciliation and ledger endpoints

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::auth::Caller;
use crate::db;
use crate::db::payments::{PaymentRecord, PaymentSearch, PaymentStatus};
use crate::error::{ApiResponse, AppError};
use crate::reconcile::{
    self, PreparePayment, VerifiedPayment, VirtualAccountRequest, VirtualAccountView,
};
use crate::state::AppState;

use super::ApiResult;

const MAX_PER_PAGE: i64 = 100;

pub async fn prepare(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Json(req): Json<PreparePayment>,
) -> ApiResult<()> {
    reconcile::prepare_payment(&state, &req).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Path(payment_id): Path<String>,
) -> ApiResult<VerifiedPayment> {
    let verified = reconcile::verify_payment(&state, &payment_id).await?;
    Ok(Json(ApiResponse::success(verified)))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: String,
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(payment_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> ApiResult<VerifiedPayment> {
    caller.require_admin()?;
    let cancelled = reconcile::cancel_payment(&state, &payment_id, &body.reason).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}

pub async fn virtual_account(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Path(payment_id): Path<String>,
    Json(req): Json<VirtualAccountRequest>,
) -> ApiResult<VirtualAccountView> {
    let account = reconcile::issue_virtual_account(&state, &payment_id, &req).await?;
    Ok(Json(ApiResponse::success(account)))
}

#[derive(Debug, Deserialize)]
pub struct PaymentHistoryQuery {
    pub status: Option<PaymentStatus>,
    pub method: Option<String>,
    pub merchant_ref: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub min_amount: Option<Decimal>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<PaymentHistoryQuery>,
) -> ApiResult<Vec<PaymentRecord>> {
    caller.require_admin()?;
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(AppError::validation("from must not be after to").into());
    }
    if let Some(min_amount) = query.min_amount
        && min_amount < Decimal::ZERO
    {
        return Err(AppError::validation("min_amount must not be negative").into());
    }
    let per_page = query.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE);
    let page = query.page.unwrap_or(1).max(1);
    let records = db::payments::search(
        &state.pool,
        &PaymentSearch {
            status: query.status,
            method: query.method.as_deref(),
            merchant_ref: query.merchant_ref.as_deref(),
            from: query.from,
            to: query.to,
            min_amount: query.min_amount,
            limit: per_page,
            offset: (page - 1) * per_page,
        },
    )
    .await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn history_by_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(payment_id): Path<String>,
) -> ApiResult<Vec<PaymentRecord>> {
    caller.require_admin()?;
    let records = db::payments::list_by_payment_id(&state.pool, &payment_id).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn history_by_merchant(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(merchant_ref): Path<String>,
) -> ApiResult<Vec<PaymentRecord>> {
    caller.require_admin()?;
    let records = db::payments::list_by_merchant_ref(&state.pool, &merchant_ref).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn history_by_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(order_id): Path<i64>,
) -> ApiResult<Vec<PaymentRecord>> {
    caller.require_admin()?;
    let records = db::payments::list_by_order_id(&state.pool, order_id).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn revenue(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Decimal> {
    caller.require_admin()?;
    let total = db::payments::total_revenue(&state.pool).await?;
    Ok(Json(ApiResponse::success(total)))
}
