//! Post-payment amendments: cancel, return and exchange flows

use serde::Deserialize;

use crate::auth::Caller;
use crate::db;
use crate::db::delivery::{DeliveryStatus, DeliveryType};
use crate::db::inventory::StockUnitStatus;
use crate::error::{AppError, ErrorCode, ServiceResult};
use crate::lifecycle::retry::retry_transition;
use crate::lifecycle::status::LineEvent;
use crate::lifecycle::{StatusWrite, load_line, recompute_order_total, write_status};
use crate::state::AppState;
use crate::util::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Cancel,
    Return,
    Exchange,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    pub version: i32,
    pub kind: ChangeKind,
    pub quantity: i32,
    pub reason: String,
}

/// Customer (or admin on their behalf) asks to cancel, return or exchange
/// part of a line. Cancel and return reduce the remaining quantity up
/// front; exchange keeps it and only checks replacement stock.
pub async fn request_change(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    req: &ChangeRequest,
) -> ServiceResult<()> {
    if req.quantity < 1 {
        return Err(AppError::validation("quantity must be at least 1").into());
    }
    if req.reason.trim().is_empty() {
        return Err(AppError::validation("reason is required").into());
    }
    let mut expected = Some(req.version);
    retry_transition(|| request_change_once(state, caller, line_id, expected.take(), req)).await
}

async fn request_change_once(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    expected_version: Option<i32>,
    req: &ChangeRequest,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let order = db::orders::get(&mut *tx, line.order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    caller.require_owner_or_admin(order.user_id)?;

    let (event, history_reason) = match req.kind {
        ChangeKind::Cancel => (LineEvent::RequestCancel, "cancellation requested"),
        ChangeKind::Return => (LineEvent::RequestReturn, "return requested"),
        ChangeKind::Exchange => (LineEvent::RequestExchange, "exchange requested"),
    };
    let to = crate::lifecycle::status::transition(line.status, event)?;

    if req.quantity > line.changed_quantity {
        return Err(AppError::with_message(
            ErrorCode::QuantityExceedsOrdered,
            format!(
                "{} requested, only {} remain on the line",
                req.quantity, line.changed_quantity
            ),
        )
        .into());
    }

    let changed_quantity = match req.kind {
        // The remaining quantity shrinks immediately; approval works on
        // the recorded request quantity.
        ChangeKind::Cancel | ChangeKind::Return => line.changed_quantity - req.quantity,
        ChangeKind::Exchange => {
            let variant = db::inventory::get_variant(&mut *tx, line.variant_id)
                .await?
                .ok_or_else(|| AppError::new(ErrorCode::VariantNotFound))?;
            if variant.stock_quantity < req.quantity {
                return Err(AppError::with_message(
                    ErrorCode::InsufficientStock,
                    format!(
                        "Variant {} has {} in stock, {} needed for exchange",
                        variant.id, variant.stock_quantity, req.quantity
                    ),
                )
                .into());
            }
            line.changed_quantity
        }
    };

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity,
            request_quantity: req.quantity,
            request_reason: Some(req.reason.trim()),
            history_reason,
            request_record: Some(req.quantity),
            now,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Admin approves a pending cancellation: the reserved stock goes back on
/// the shelf and the order total drops.
pub async fn approve_cancel(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: i32,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(version);
    retry_transition(|| approve_cancel_once(state, line_id, expected.take())).await
}

async fn approve_cancel_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let full = line.changed_quantity == 0;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::ApproveCancel { full })?;

    let released =
        db::inventory::release_reservation(&mut *tx, line.variant_id, line.request_quantity, now)
            .await?;
    if !released {
        return Err(AppError::with_message(
            ErrorCode::InsufficientStock,
            format!("Variant {} reserved quantity underflow", line.variant_id),
        )
        .into());
    }

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "cancellation approved",
            request_record: None,
            now,
        },
    )
    .await?;

    recompute_order_total(&mut tx, line.order_id, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Admin approves a return: the delivered leg flips to RETURN and an
/// inbound leg opens for the units coming back.
pub async fn approve_return(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: i32,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(version);
    retry_transition(|| approve_return_once(state, line_id, expected.take())).await
}

async fn approve_return_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::ApproveReturn)?;

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "return approved",
            request_record: None,
            now,
        },
    )
    .await?;

    if let Some(leg) =
        db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Delivered).await?
    {
        db::delivery::set_status(&mut *tx, leg.id, DeliveryStatus::Return, now).await?;
    }
    db::delivery::insert(
        &mut *tx,
        line.id,
        DeliveryType::ReturnIn,
        DeliveryStatus::Delivering,
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ReturnedUnits {
    pub version: i32,
    /// Barcodes scanned off the units that came back. The count must equal
    /// the requested return quantity.
    pub barcodes: Vec<String>,
}

/// Returned units arrived at the warehouse: recycle them into stock,
/// release the reservation and finish the return.
pub async fn complete_return(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    req: &ReturnedUnits,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(req.version);
    retry_transition(|| complete_return_once(state, line_id, expected.take(), req)).await
}

async fn complete_return_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
    req: &ReturnedUnits,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let full = line.changed_quantity == 0;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::CompleteReturn { full })?;

    if req.barcodes.len() != line.request_quantity as usize {
        return Err(AppError::with_message(
            ErrorCode::BarcodeCountMismatch,
            format!(
                "{} barcodes presented, return quantity is {}",
                req.barcodes.len(),
                line.request_quantity
            ),
        )
        .into());
    }

    for barcode in &req.barcodes {
        recycle_returned_unit(&mut tx, &line, barcode, "returned", now).await?;
    }

    let released =
        db::inventory::release_reservation(&mut *tx, line.variant_id, line.request_quantity, now)
            .await?;
    if !released {
        return Err(AppError::with_message(
            ErrorCode::InsufficientStock,
            format!("Variant {} reserved quantity underflow", line.variant_id),
        )
        .into());
    }

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "return completed",
            request_record: None,
            now,
        },
    )
    .await?;

    if let Some(leg) =
        db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Delivering).await?
    {
        db::delivery::mark_delivered(&mut *tx, leg.id, now).await?;
    }

    recompute_order_total(&mut tx, line.order_id, now).await?;

    tx.commit().await?;
    Ok(())
}

/// Admin approves an exchange: an inbound leg opens for the defective
/// units.
pub async fn approve_exchange(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    version: i32,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(version);
    retry_transition(|| approve_exchange_once(state, line_id, expected.take())).await
}

async fn approve_exchange_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::ApproveExchange)?;

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "exchange approved",
            request_record: None,
            now,
        },
    )
    .await?;

    db::delivery::insert(
        &mut *tx,
        line.id,
        DeliveryType::ExchangeIn,
        DeliveryStatus::Delivering,
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Exchanged-out units arrived back: recycle them and release their
/// reservations one by one.
pub async fn exchange_received(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    req: &ReturnedUnits,
) -> ServiceResult<()> {
    caller.require_admin()?;
    let mut expected = Some(req.version);
    retry_transition(|| exchange_received_once(state, line_id, expected.take(), req)).await
}

async fn exchange_received_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
    req: &ReturnedUnits,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::ExchangeReceived)?;

    if req.barcodes.len() != line.request_quantity as usize {
        return Err(AppError::with_message(
            ErrorCode::BarcodeCountMismatch,
            format!(
                "{} barcodes presented, exchange quantity is {}",
                req.barcodes.len(),
                line.request_quantity
            ),
        )
        .into());
    }

    for barcode in &req.barcodes {
        recycle_returned_unit(&mut tx, &line, barcode, "exchange returned", now).await?;
        let released =
            db::inventory::release_reservation(&mut *tx, line.variant_id, 1, now).await?;
        if !released {
            return Err(AppError::with_message(
                ErrorCode::InsufficientStock,
                format!("Variant {} reserved quantity underflow", line.variant_id),
            )
            .into());
        }
    }

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "exchange units received",
            request_record: None,
            now,
        },
    )
    .await?;

    if let Some(leg) =
        db::delivery::latest_by_status(&mut *tx, line.id, DeliveryStatus::Delivering).await?
    {
        db::delivery::mark_delivered(&mut *tx, leg.id, now).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ExchangeShipment {
    pub version: i32,
    pub carrier: String,
    pub tracking_number: String,
    pub barcodes: Vec<String>,
}

/// Replacement units go out: each is taken from stock with a fresh
/// reservation and the exchange outbound leg starts delivering.
pub async fn exchange_ship(
    state: &AppState,
    caller: &Caller,
    line_id: i64,
    req: &ExchangeShipment,
) -> ServiceResult<()> {
    caller.require_admin()?;
    if req.carrier.trim().is_empty() || req.tracking_number.trim().is_empty() {
        return Err(AppError::validation("carrier and tracking_number are required").into());
    }
    let mut expected = Some(req.version);
    retry_transition(|| exchange_ship_once(state, line_id, expected.take(), req)).await
}

async fn exchange_ship_once(
    state: &AppState,
    line_id: i64,
    expected_version: Option<i32>,
    req: &ExchangeShipment,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let line = load_line(&mut tx, line_id, expected_version).await?;
    let to = crate::lifecycle::status::transition(line.status, LineEvent::ExchangeShip)?;

    if req.barcodes.len() != line.request_quantity as usize {
        return Err(AppError::with_message(
            ErrorCode::BarcodeCountMismatch,
            format!(
                "{} barcodes presented, exchange quantity is {}",
                req.barcodes.len(),
                line.request_quantity
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
            Some("exchange shipped"),
            now,
        )
        .await?;
        let reserved = db::inventory::reserve_stock(&mut *tx, line.variant_id, 1, now).await?;
        if !reserved {
            return Err(AppError::with_message(
                ErrorCode::InsufficientStock,
                format!("Variant {} ran out of stock", line.variant_id),
            )
            .into());
        }
    }

    write_status(
        &mut tx,
        &line,
        StatusWrite {
            to,
            changed_quantity: line.changed_quantity,
            request_quantity: line.request_quantity,
            request_reason: line.request_reason.as_deref(),
            history_reason: "exchange shipment started",
            request_record: None,
            now,
        },
    )
    .await?;

    let leg_id = db::delivery::insert(
        &mut *tx,
        line.id,
        DeliveryType::ExchangeOut,
        DeliveryStatus::Preparing,
        now,
    )
    .await?;
    db::delivery::mark_shipped(&mut *tx, leg_id, &req.carrier, &req.tracking_number, now).await?;

    tx.commit().await?;
    Ok(())
}

async fn recycle_returned_unit(
    tx: &mut sqlx::PgConnection,
    line: &crate::db::orders::OrderLine,
    barcode: &str,
    note: &str,
    now: i64,
) -> ServiceResult<()> {
    let unit = db::inventory::get_unit_by_barcode(&mut *tx, barcode)
        .await?
        .ok_or_else(|| {
            AppError::new(ErrorCode::UnitNotFound).with_detail("barcode", barcode)
        })?;
    let recycled = db::inventory::recycle_unit(&mut *tx, unit.id, line.id, now).await?;
    if !recycled {
        return Err(AppError::with_message(
            ErrorCode::UnitStateInvalid,
            format!("Barcode {barcode} was not shipped against this line"),
        )
        .into());
    }
    db::inventory::append_history(
        &mut *tx,
        unit.id,
        Some(line.id),
        StockUnitStatus::OutOfStock,
        StockUnitStatus::InStock,
        Some(note),
        now,
    )
    .await?;
    Ok(())
}
