//! Order and order-line repository
//!
//! The status write is a single conditional UPDATE guarded by the observed
//! version; callers treat a non-applied update as an optimistic conflict.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgExecutor;

use crate::lifecycle::status::LineStatus;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub merchant_ref: String,
    pub user_id: i64,
    pub delivery_fee: Decimal,
    pub original_total: Decimal,
    pub current_total: Decimal,
    pub recipient_name: String,
    /// Encrypted at rest; decrypted only on authorized read paths
    pub recipient_phone: String,
    pub recipient_postcode: String,
    pub recipient_address: String,
    pub delivery_request: Option<String>,
    pub payment_method: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: i64,
    pub original_quantity: i32,
    pub changed_quantity: i32,
    pub request_quantity: i32,
    pub unit_price: Decimal,
    pub discount_rate: Decimal,
    pub final_price: Decimal,
    pub size: String,
    pub color: String,
    pub status: LineStatus,
    pub request_reason: Option<String>,
    pub version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct NewOrder<'a> {
    pub merchant_ref: &'a str,
    pub user_id: i64,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub recipient_name: &'a str,
    /// Already encrypted
    pub recipient_phone: &'a str,
    pub recipient_postcode: &'a str,
    pub recipient_address: &'a str,
    pub delivery_request: Option<&'a str>,
    pub payment_method: &'a str,
    pub now: i64,
}

pub async fn create(db: impl PgExecutor<'_>, order: &NewOrder<'_>) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO orders
            (merchant_ref, user_id, delivery_fee, original_total, current_total,
             recipient_name, recipient_phone, recipient_postcode, recipient_address,
             delivery_request, payment_method, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING id
        "#,
    )
    .bind(order.merchant_ref)
    .bind(order.user_id)
    .bind(order.delivery_fee)
    .bind(order.total)
    .bind(order.recipient_name)
    .bind(order.recipient_phone)
    .bind(order.recipient_postcode)
    .bind(order.recipient_address)
    .bind(order.delivery_request)
    .bind(order.payment_method)
    .bind(order.now)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub struct NewOrderLine {
    pub order_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_rate: Decimal,
    pub final_price: Decimal,
    pub size: String,
    pub color: String,
    pub now: i64,
}

pub async fn create_line(
    db: impl PgExecutor<'_>,
    line: &NewOrderLine,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO order_lines
            (order_id, variant_id, original_quantity, changed_quantity,
             unit_price, discount_rate, final_price, size, color, created_at, updated_at)
        VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $9)
        RETURNING id
        "#,
    )
    .bind(line.order_id)
    .bind(line.variant_id)
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.discount_rate)
    .bind(line.final_price)
    .bind(&line.size)
    .bind(&line.color)
    .bind(line.now)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn merchant_ref_exists(
    db: impl PgExecutor<'_>,
    merchant_ref: &str,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM orders WHERE merchant_ref = $1)")
            .bind(merchant_ref)
            .fetch_one(db)
            .await?;
    Ok(exists)
}

pub async fn get(db: impl PgExecutor<'_>, id: i64) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_merchant_ref(
    db: impl PgExecutor<'_>,
    merchant_ref: &str,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE merchant_ref = $1")
        .bind(merchant_ref)
        .fetch_optional(db)
        .await
}

pub async fn get_line(db: impl PgExecutor<'_>, id: i64) -> Result<Option<OrderLine>, sqlx::Error> {
    sqlx::query_as::<_, OrderLine>("SELECT * FROM order_lines WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn lines_for_order(
    db: impl PgExecutor<'_>,
    order_id: i64,
) -> Result<Vec<OrderLine>, sqlx::Error> {
    sqlx::query_as::<_, OrderLine>("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(db)
        .await
}

/// Parameters for the single optimistic status write. Callers pass the
/// current field values when a field is unchanged.
pub struct LineStatusWrite<'a> {
    pub line_id: i64,
    /// Version observed at load time; the update only applies if it still
    /// matches, and increments it.
    pub expected_version: i32,
    pub status: LineStatus,
    pub changed_quantity: i32,
    pub request_quantity: i32,
    pub request_reason: Option<&'a str>,
    pub now: i64,
}

pub async fn update_line_status(
    db: impl PgExecutor<'_>,
    write: &LineStatusWrite<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE order_lines
        SET status = $3,
            changed_quantity = $4,
            request_quantity = $5,
            request_reason = $6,
            version = version + 1,
            updated_at = $7
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(write.line_id)
    .bind(write.expected_version)
    .bind(write.status)
    .bind(write.changed_quantity)
    .bind(write.request_quantity)
    .bind(write.request_reason)
    .bind(write.now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_current_total(
    db: impl PgExecutor<'_>,
    order_id: i64,
    total: Decimal,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET current_total = $2, updated_at = $3 WHERE id = $1")
        .bind(order_id)
        .bind(total)
        .bind(now)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn append_line_history(
    db: impl PgExecutor<'_>,
    line_id: i64,
    request_quantity_record: Option<i32>,
    from: Option<LineStatus>,
    to: LineStatus,
    reason: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_line_history
            (order_line_id, request_quantity_record, status_from, status_to, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(line_id)
    .bind(request_quantity_record)
    .bind(from)
    .bind(to)
    .bind(reason)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

/// Lines sitting in delivered states whose latest delivered leg completed at
/// or before the cutoff. Input to the auto-confirm sweep.
pub async fn find_unconfirmed_delivered(
    db: impl PgExecutor<'_>,
    cutoff: i64,
) -> Result<Vec<OrderLine>, sqlx::Error> {
    sqlx::query_as::<_, OrderLine>(
        r#"
        SELECT ol.*
        FROM order_lines ol
        JOIN LATERAL (
            SELECT dh.complete_date
            FROM delivery_history dh
            WHERE dh.order_line_id = ol.id AND dh.status = 'delivered'
            ORDER BY dh.id DESC
            LIMIT 1
        ) leg ON TRUE
        WHERE ol.status IN ('delivered', 'exchange_delivered')
          AND leg.complete_date IS NOT NULL
          AND leg.complete_date <= $1
        ORDER BY ol.id
        "#,
    )
    .bind(cutoff)
    .fetch_all(db)
    .await
}

pub async fn count_for_user(db: impl PgExecutor<'_>, user_id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn list_for_user(
    db: impl PgExecutor<'_>,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
}

pub struct OrderSearch<'a> {
    pub merchant_ref: Option<&'a str>,
    pub user_email: Option<&'a str>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn search(
    db: impl PgExecutor<'_>,
    params: &OrderSearch<'_>,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT o.*
        FROM orders o
        JOIN users u ON u.id = o.user_id
        WHERE ($1::text IS NULL OR o.merchant_ref = $1)
          AND ($2::text IS NULL OR u.email = $2)
          AND ($3::bigint IS NULL OR o.created_at >= $3)
          AND ($4::bigint IS NULL OR o.created_at <= $4)
        ORDER BY o.id DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(params.merchant_ref)
    .bind(params.user_email)
    .bind(params.from)
    .bind(params.to)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(db)
    .await
}
