//! Order lifecycle engine
//!
//! Every transition operation follows the same shape: open a transaction,
//! load the line, resolve the target state through the transition table,
//! perform the inventory-ledger mutation, write the new status with the
//! observed version, append a history row and touch the delivery leg. A
//! version mismatch aborts the attempt and the whole operation is retried
//! from the load by [`retry::with_conflict_retry`].

pub mod amendments;
pub mod fulfillment;
pub mod place;
pub mod retry;
pub mod status;
pub mod sweeper;

use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::db;
use crate::db::orders::{LineStatusWrite, OrderLine};
use crate::error::{AppError, ErrorCode, ServiceResult};
use status::LineStatus;

/// Load a line, checking the caller-supplied version on the first attempt.
/// A stale caller version counts as a retryable conflict; retries pass
/// `None` and work against the freshly observed version.
pub(crate) async fn load_line(
    conn: &mut PgConnection,
    line_id: i64,
    expected_version: Option<i32>,
) -> ServiceResult<OrderLine> {
    let line = db::orders::get_line(&mut *conn, line_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderLineNotFound))?;
    if let Some(version) = expected_version
        && version != line.version
    {
        return Err(AppError::conflict().into());
    }
    Ok(line)
}

pub(crate) struct StatusWrite<'a> {
    pub to: LineStatus,
    pub changed_quantity: i32,
    pub request_quantity: i32,
    pub request_reason: Option<&'a str>,
    pub history_reason: &'a str,
    pub request_record: Option<i32>,
    pub now: i64,
}

/// Optimistic status write plus history append, shared by every transition.
pub(crate) async fn write_status(
    conn: &mut PgConnection,
    line: &OrderLine,
    write: StatusWrite<'_>,
) -> ServiceResult<()> {
    let applied = db::orders::update_line_status(
        &mut *conn,
        &LineStatusWrite {
            line_id: line.id,
            expected_version: line.version,
            status: write.to,
            changed_quantity: write.changed_quantity,
            request_quantity: write.request_quantity,
            request_reason: write.request_reason,
            now: write.now,
        },
    )
    .await?;
    if !applied {
        return Err(AppError::conflict().into());
    }
    db::orders::append_line_history(
        &mut *conn,
        line.id,
        write.request_record,
        Some(line.status),
        write.to,
        write.history_reason,
        write.now,
    )
    .await?;
    Ok(())
}

/// Recompute an order's current total from the surviving line quantities.
/// The delivery fee is waived when nothing remains.
pub(crate) async fn recompute_order_total(
    conn: &mut PgConnection,
    order_id: i64,
    now: i64,
) -> ServiceResult<()> {
    let order = db::orders::get(&mut *conn, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    let lines = db::orders::lines_for_order(&mut *conn, order_id).await?;

    let remaining: Decimal = lines
        .iter()
        .map(|l| l.final_price * Decimal::from(l.changed_quantity))
        .sum();
    let total = if remaining.is_zero() {
        Decimal::ZERO
    } else {
        remaining + order.delivery_fee
    };

    db::orders::set_current_total(&mut *conn, order_id, total, now).await?;
    Ok(())
}
