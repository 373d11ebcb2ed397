//! Delivery legs: one row per physical shipment leg of an order line
//!
//! A line accumulates legs as it moves through outbound, return and
//! exchange flows; each leg's row mutates as that leg progresses.

use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "delivery_type", rename_all = "snake_case")]
pub enum DeliveryType {
    OrderOut,
    ReturnIn,
    ExchangeIn,
    ExchangeOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Preparing,
    Delivering,
    Delivered,
    Confirmed,
    Canceled,
    Return,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DeliveryLeg {
    pub id: i64,
    pub order_line_id: i64,
    pub delivery_type: DeliveryType,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub status: DeliveryStatus,
    pub start_date: Option<i64>,
    pub complete_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub async fn insert(
    db: impl PgExecutor<'_>,
    line_id: i64,
    delivery_type: DeliveryType,
    status: DeliveryStatus,
    now: i64,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO delivery_history
            (order_line_id, delivery_type, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        RETURNING id
        "#,
    )
    .bind(line_id)
    .bind(delivery_type)
    .bind(status)
    .bind(now)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// Most recent leg of a line in the given status.
pub async fn latest_by_status(
    db: impl PgExecutor<'_>,
    line_id: i64,
    status: DeliveryStatus,
) -> Result<Option<DeliveryLeg>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLeg>(
        r#"
        SELECT * FROM delivery_history
        WHERE order_line_id = $1 AND status = $2
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(line_id)
    .bind(status)
    .fetch_optional(db)
    .await
}

/// Leg handed to the carrier: record carrier/tracking and the start date.
pub async fn mark_shipped(
    db: impl PgExecutor<'_>,
    leg_id: i64,
    carrier: &str,
    tracking_number: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE delivery_history
        SET status = 'delivering', carrier = $2, tracking_number = $3,
            start_date = $4, updated_at = $4
        WHERE id = $1
        "#,
    )
    .bind(leg_id)
    .bind(carrier)
    .bind(tracking_number)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn mark_delivered(
    db: impl PgExecutor<'_>,
    leg_id: i64,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE delivery_history
        SET status = 'delivered', complete_date = $2, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(leg_id)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_status(
    db: impl PgExecutor<'_>,
    leg_id: i64,
    status: DeliveryStatus,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE delivery_history SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(leg_id)
        .bind(status)
        .bind(now)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn list_for_line(
    db: impl PgExecutor<'_>,
    line_id: i64,
) -> Result<Vec<DeliveryLeg>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLeg>(
        "SELECT * FROM delivery_history WHERE order_line_id = $1 ORDER BY id",
    )
    .bind(line_id)
    .fetch_all(db)
    .await
}
