//! Order and order-line endpoints
//!
//! Handlers stay thin: deserialize, resolve the caller, delegate to the
//! lifecycle layer. Phone numbers are decrypted only here, after the
//! ownership check passed.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::db;
use crate::db::delivery::DeliveryLeg;
use crate::db::orders::{Order, OrderLine, OrderSearch};
use crate::error::{ApiResponse, AppError, ErrorCode};
use crate::lifecycle::amendments::{self, ChangeRequest, ExchangeShipment, ReturnedUnits};
use crate::lifecycle::fulfillment::{self, LineRef, ShipRequest};
use crate::lifecycle::place::{self, PlaceOrder, PlacedOrder};
use crate::state::AppState;

use super::ApiResult;

const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1) * per_page)
    }
}

/// Order as returned to an authorized reader, phone decrypted.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub merchant_ref: String,
    pub user_id: i64,
    pub delivery_fee: Decimal,
    pub original_total: Decimal,
    pub current_total: Decimal,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_postcode: String,
    pub recipient_address: String,
    pub delivery_request: Option<String>,
    pub payment_method: String,
    pub created_at: i64,
    pub updated_at: i64,
}

fn order_view(state: &AppState, order: Order) -> Result<OrderView, AppError> {
    let phone = state
        .phone_key
        .decrypt(&order.recipient_phone)
        .map_err(AppError::internal)?;
    Ok(OrderView {
        id: order.id,
        merchant_ref: order.merchant_ref,
        user_id: order.user_id,
        delivery_fee: order.delivery_fee,
        original_total: order.original_total,
        current_total: order.current_total,
        recipient_name: order.recipient_name,
        recipient_phone: phone,
        recipient_postcode: order.recipient_postcode,
        recipient_address: order.recipient_address,
        delivery_request: order.delivery_request,
        payment_method: order.payment_method,
        created_at: order.created_at,
        updated_at: order.updated_at,
    })
}

pub async fn place(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<PlaceOrder>,
) -> ApiResult<PlacedOrder> {
    let placed = place::place_order(&state, &caller, &req).await?;
    Ok(Json(ApiResponse::success(placed)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<OrderView>> {
    let (limit, offset) = page.limit_offset();
    let orders = db::orders::list_for_user(&state.pool, caller.user_id, limit, offset).await?;
    let views = orders
        .into_iter()
        .map(|o| order_view(&state, o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::success(views)))
}

pub async fn count(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<i64> {
    let count = db::orders::count_for_user(&state.pool, caller.user_id).await?;
    Ok(Json(ApiResponse::success(count)))
}

#[derive(Debug, Deserialize)]
pub struct OrderSearchQuery {
    pub merchant_ref: Option<String>,
    pub user_email: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn search(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<OrderSearchQuery>,
) -> ApiResult<Vec<OrderView>> {
    caller.require_admin()?;
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(AppError::validation("from must not be after to").into());
    }
    let page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let (limit, offset) = page.limit_offset();
    let orders = db::orders::search(
        &state.pool,
        &OrderSearch {
            merchant_ref: query.merchant_ref.as_deref(),
            user_email: query.user_email.as_deref(),
            from: query.from,
            to: query.to,
            limit,
            offset,
        },
    )
    .await?;
    let views = orders
        .into_iter()
        .map(|o| order_view(&state, o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::success(views)))
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderView,
    pub lines: Vec<OrderLine>,
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(order_id): Path<i64>,
) -> ApiResult<OrderDetail> {
    let order = db::orders::get(&state.pool, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    caller.require_owner_or_admin(order.user_id)?;
    let lines = db::orders::lines_for_order(&state.pool, order_id).await?;
    Ok(Json(ApiResponse::success(OrderDetail {
        order: order_view(&state, order)?,
        lines,
    })))
}

pub async fn delivery_history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
) -> ApiResult<Vec<DeliveryLeg>> {
    let line = db::orders::get_line(&state.pool, line_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderLineNotFound))?;
    let order = db::orders::get(&state.pool, line.order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    caller.require_owner_or_admin(order.user_id)?;
    let legs = db::delivery::list_for_line(&state.pool, line_id).await?;
    Ok(Json(ApiResponse::success(legs)))
}

#[derive(Debug, Deserialize)]
pub struct VersionBody {
    pub version: i32,
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(items): Json<Vec<LineRef>>,
) -> ApiResult<()> {
    fulfillment::mark_paid(&state, &caller, &items).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn begin_preparing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    fulfillment::begin_preparing(&state, &caller, line_id, body.version).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn ship(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(req): Json<ShipRequest>,
) -> ApiResult<()> {
    fulfillment::ship(&state, &caller, line_id, &req).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn arrive(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    fulfillment::arrive(&state, &caller, line_id, body.version).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    fulfillment::confirm(&state, &caller, line_id, Some(body.version)).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn request_change(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(req): Json<ChangeRequest>,
) -> ApiResult<()> {
    amendments::request_change(&state, &caller, line_id, &req).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn approve_cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    amendments::approve_cancel(&state, &caller, line_id, body.version).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn approve_return(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    amendments::approve_return(&state, &caller, line_id, body.version).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn complete_return(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(req): Json<ReturnedUnits>,
) -> ApiResult<()> {
    amendments::complete_return(&state, &caller, line_id, &req).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn approve_exchange(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(body): Json<VersionBody>,
) -> ApiResult<()> {
    amendments::approve_exchange(&state, &caller, line_id, body.version).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn exchange_received(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(req): Json<ReturnedUnits>,
) -> ApiResult<()> {
    amendments::exchange_received(&state, &caller, line_id, &req).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn exchange_ship(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(line_id): Path<i64>,
    Json(req): Json<ExchangeShipment>,
) -> ApiResult<()> {
    amendments::exchange_ship(&state, &caller, line_id, &req).await?;
    Ok(Json(ApiResponse::ok()))
}
