//! Inventory ledger: per-variant counters and barcoded stock units
//!
//! Counter moves are single conditional UPDATEs so concurrent reservations
//! can never drive `stock_quantity` or `reserved_quantity` negative. Each
//! function returns whether the guarded update applied; a `false` means the
//! precondition did not hold at execution time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "stock_unit_status", rename_all = "snake_case")]
pub enum StockUnitStatus {
    InStock,
    OutOfStock,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Variant {
    pub id: i64,
    pub product_name: String,
    pub size: String,
    pub color: String,
    pub price: Decimal,
    pub discount_rate: Decimal,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub sales_count: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockUnit {
    pub id: i64,
    pub variant_id: i64,
    pub barcode: String,
    pub status: StockUnitStatus,
    pub order_line_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub async fn get_variant(
    db: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>("SELECT * FROM product_variants WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Reserve on order: stock -qty, reserved +qty. Fails if stock would go
/// negative.
pub async fn reserve_stock(
    db: impl PgExecutor<'_>,
    variant_id: i64,
    qty: i32,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE product_variants
        SET stock_quantity = stock_quantity - $2,
            reserved_quantity = reserved_quantity + $2,
            version = version + 1,
            updated_at = $3
        WHERE id = $1 AND stock_quantity >= $2
        "#,
    )
    .bind(variant_id)
    .bind(qty)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Release on cancel/return: reserved -qty, stock +qty.
pub async fn release_reservation(
    db: impl PgExecutor<'_>,
    variant_id: i64,
    qty: i32,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE product_variants
        SET reserved_quantity = reserved_quantity - $2,
            stock_quantity = stock_quantity + $2,
            version = version + 1,
            updated_at = $3
        WHERE id = $1 AND reserved_quantity >= $2
        "#,
    )
    .bind(variant_id)
    .bind(qty)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Confirm sale: reserved -qty, sales +qty.
pub async fn confirm_sale(
    db: impl PgExecutor<'_>,
    variant_id: i64,
    qty: i32,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE product_variants
        SET reserved_quantity = reserved_quantity - $2,
            sales_count = sales_count + $2,
            version = version + 1,
            updated_at = $3
        WHERE id = $1 AND reserved_quantity >= $2
        "#,
    )
    .bind(variant_id)
    .bind(qty)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn get_unit_by_barcode(
    db: impl PgExecutor<'_>,
    barcode: &str,
) -> Result<Option<StockUnit>, sqlx::Error> {
    sqlx::query_as::<_, StockUnit>("SELECT * FROM stock_units WHERE barcode = $1")
        .bind(barcode)
        .fetch_optional(db)
        .await
}

/// Ship a unit: in_stock -> out_of_stock, allocated to the line.
pub async fn mark_unit_shipped(
    db: impl PgExecutor<'_>,
    unit_id: i64,
    line_id: i64,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE stock_units
        SET status = 'out_of_stock', order_line_id = $2, updated_at = $3
        WHERE id = $1 AND status = 'in_stock'
        "#,
    )
    .bind(unit_id)
    .bind(line_id)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Recycle a returned unit: out_of_stock and allocated to this line ->
/// in_stock, allocation cleared.
pub async fn recycle_unit(
    db: impl PgExecutor<'_>,
    unit_id: i64,
    line_id: i64,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE stock_units
        SET status = 'in_stock', order_line_id = NULL, updated_at = $3
        WHERE id = $1 AND status = 'out_of_stock' AND order_line_id = $2
        "#,
    )
    .bind(unit_id)
    .bind(line_id)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn append_history(
    db: impl PgExecutor<'_>,
    unit_id: i64,
    line_id: Option<i64>,
    from: StockUnitStatus,
    to: StockUnitStatus,
    note: Option<&str>,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO inventory_history
            (stock_unit_id, order_line_id, status_from, status_to, note, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(unit_id)
    .bind(line_id)
    .bind(from)
    .bind(to)
    .bind(note)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}
