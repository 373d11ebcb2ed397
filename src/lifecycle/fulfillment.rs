//! Forward fulfillment: payment completion through delivery confirmation

use serde::Deserialize;

use crate::auth::Caller;
use crate::db;
use crate::db::delivery::{DeliveryStatus, DeliveryType};
use crate::db::inventory::StockUnitStatus;
use crate::error::{AppError, ErrorCode, ServiceResult};
use crate::lifecycle::retry::retry_transition;
use crate::lifecycle::status::LineEvent;
use crate::lifecycle::{StatusWrite, load_line, write_status};
use crate::state::AppState;
use crate::util::now_millis;

#[derive(Debug, Deserialize)]
pub struct LineRef {
    pub line_id: i64,
    pub version: i32,
}

/// Admin bulk action: mark pending lines paid without going through the
/// gateway (bank-transfer style flows).
pub async fn mark_paid(state: &AppState, caller: &Caller, items: &[LineRef]) -> ServiceResult<()> {
    caller.require_admin()?;
    if items.is_empty() {
        return Err(AppError::validation("No order lines given").into());
    }
    for item in items {
        let mut expected = Some(item.version);
        retry_transition(|| mark_paid_once(state, item.line_id, expected.take())).await?;
    }
    Ok(())
}

async fn mark_paid_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::MarkPaid)?;

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "payment completed",
            request_record: None,
            now,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Admin starts preparing the shipment.
pub async fn begin_preparing(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: i32,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(version);
    retry_transition(|| begin_preparing_once(state, line_id, expected.take())).await
}

async fn begin_preparing_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::BeginPreparing)?;

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "preparing shipment",
            request_record: None,
            now,
        },
    )
    .await?;

    db::delivery::insert(
        &mut *tx,
        line.id,
        DeliveryType::OrderOut,
        DeliveryStatus::Preparing,
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ShipRequest {
    pub version: i32,
    pub carrier: String,
    pub tracking_number: String,
    /// One barcode per physical unit; the count must equal the line's
    /// original quantity.
    pub barcodes: Vec<String>,
}

/// Admin ships the outbound leg: every presented unit is taken out of
/// stock and allocated to the line before the line itself advances.
pub async fn ship(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    req: &ShipRequest,
) -> ServiceResult<()> {
    caller.require_admin()?;
    if req.carrier.trim().is_empty() || req.tracking_number.trim().is_empty() {
        return Err(AppError::validation("carrier and tracking_number are required").into());
    }
    let mut expected = Some(req.version);
    retry_transition(|| ship_once(state, line_id, expected.take(), req)).await
}

async fn ship_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
    req: &ShipRequest,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::Ship)?;

    if req.barcodes.len() != line.original_quantity as usize {
        return Err(AppError::with_message(
            ErrorCode::BarcodeCountMismatch,
            format!(
                "{} barcodes presented, line quantity is {}",
                req.barcodes.len(),
                line.original_quantity
            ),
        )
        .into());
    }

    for barcode in &req.barcodes {
        let unit = db::inventory::get_unit_by_barcode(&mut *tx, barcode)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::UnitNotFound).with_detail("barcode", barcode.as_str())
            })?;
        if unit.variant_id != line.variant_id {
            return Err(AppError::with_message(
                ErrorCode::UnitStateInvalid,
                format!("Barcode {barcode} belongs to a different variant"),
            )
            .into());
        }
        let shipped = db::inventory::mark_unit_shipped(&mut *tx, unit.id, line.id, now).await?;
        if !shipped {
            return Err(AppError::with_message(
                ErrorCode::UnitStateInvalid,
                format!("Barcode {barcode} is not in stock"),
            )
            .into());
        }
        db::inventory::append_history(
            &mut *tx,
            unit.id,
            Some(line.id),
            StockUnitStatus::InStock,
            StockUnitStatus::OutOfStock,
            Some("shipped"),
            now,
        )
        .await?;
    }

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "shipment started",
            request_record: None,
            now,
        },
    )
    .await?;

    let leg = db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Preparing)
        .await?
        .ok_or_else(|| AppError::not_found("Preparing delivery leg"))?;
    db::delivery::mark_shipped(&mut *tx, leg.id, &req.carrier, &req.tracking_number, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Carrier reports arrival, for both the outbound and the exchange
/// outbound leg.
pub async fn arrive(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: i32,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(version);
    retry_transition(|| arrive_once(state, line_id, expected.take())).await
}

async fn arrive_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::Arrive)?;

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "delivery completed",
            request_record: None,
            now,
        },
    )
    .await?;

    let leg = db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Delivering)
        .await?
        .ok_or_else(|| AppError::not_found("Delivering delivery leg"))?;
    db::delivery::mark_delivered(&mut *tx, leg.id, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Owner, admin or the auto-confirm sweep acknowledges receipt. Converts
/// the line's reservation into a confirmed sale.
pub async fn confirm(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: Option<i32>,
) -> ServiceResult<()> {
    let mut expected = version;
    retry_transition(|| confirm_once(state, caller, line_id, expected.take())).await
}

async fn confirm_once(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let order = db::orders::get(&mut *tx, line.order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    caller.require_owner_or_admin(order.user_id)?;

    let to = crate::lifecycle::status::transition(line.status, LineEvent::Confirm)?;

    let converted =
        db::inventory::confirm_sale(&mut *tx, line.variant_id, line.changed_quantity, now).await?;
    if !converted {
        return Err(AppError::with_message(
            ErrorCode::InsufficientStock,
            format!("Variant {} reserved quantity underflow", line.variant_id),
        )
        .into());
    }

    let reason = if caller.is_system() {
        "auto-confirmed after 7 days"
    } else if caller.admin {
        "delivery confirmed by admin"
    } else {
        "delivery confirmed by customer"
    };

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: reason,
            request_record: None,
            now,
        },
    )
    .await?;

    if let Some(leg) =
        db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Delivered).await?
    {
        db::delivery::set_status(&mut *tx, leg.id, DeliveryStatus::Confirmed, now).await?;
    }

    tx.commit().await?;
    Ok(())
}
