//! Append-only payment reconciliation ledger
//!
//! One row per webhook/verify/cancel attempt, success or failure. Rows are
//! never updated; the table is the forensic record of what happened,
//! independent of whether the caller handled the resulting error. The raw
//! gateway payload is stored opaquely and never read back by business logic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Ready,
    Paid,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub payment_id: Option<String>,
    pub merchant_ref: Option<String>,
    pub order_id: Option<i64>,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub amount: Option<Decimal>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    /// Encrypted at rest
    pub customer_phone: Option<String>,
    pub requested_at: Option<i64>,
    #[serde(skip_serializing)]
    pub payload: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

pub struct NewPaymentRecord<'a> {
    pub payment_id: Option<&'a str>,
    pub merchant_ref: Option<&'a str>,
    pub order_id: Option<i64>,
    pub status: PaymentStatus,
    pub method: Option<&'a str>,
    pub amount: Option<Decimal>,
    pub customer_name: Option<&'a str>,
    pub customer_email: Option<&'a str>,
    /// Already encrypted
    pub customer_phone: Option<&'a str>,
    pub requested_at: Option<i64>,
    pub payload: Option<&'a serde_json::Value>,
    pub error_code: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub now: i64,
}

pub async fn append(
    db: impl PgExecutor<'_>,
    record: &NewPaymentRecord<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payment_history
            (payment_id, merchant_ref, order_id, status, method, amount,
             customer_name, customer_email, customer_phone, requested_at,
             payload, error_code, error_message, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(record.payment_id)
    .bind(record.merchant_ref)
    .bind(record.order_id)
    .bind(record.status)
    .bind(record.method)
    .bind(record.amount)
    .bind(record.customer_name)
    .bind(record.customer_email)
    .bind(record.customer_phone)
    .bind(record.requested_at)
    .bind(record.payload)
    .bind(record.error_code)
    .bind(record.error_message)
    .bind(record.now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn list_by_payment_id(
    db: impl PgExecutor<'_>,
    payment_id: &str,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(
        "SELECT * FROM payment_history WHERE payment_id = $1 ORDER BY id",
    )
    .bind(payment_id)
    .fetch_all(db)
    .await
}

pub async fn list_by_merchant_ref(
    db: impl PgExecutor<'_>,
    merchant_ref: &str,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(
        "SELECT * FROM payment_history WHERE merchant_ref = $1 ORDER BY id",
    )
    .bind(merchant_ref)
    .fetch_all(db)
    .await
}

pub async fn list_by_order_id(
    db: impl PgExecutor<'_>,
    order_id: i64,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(
        "SELECT * FROM payment_history WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(db)
    .await
}

pub struct PaymentSearch<'a> {
    pub status: Option<PaymentStatus>,
    pub method: Option<&'a str>,
    pub merchant_ref: Option<&'a str>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub min_amount: Option<Decimal>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn search(
    db: impl PgExecutor<'_>,
    params: &PaymentSearch<'_>,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(
        r#"
        SELECT *
        FROM payment_history
        WHERE ($1::payment_status IS NULL OR status = $1)
          AND ($2::text IS NULL OR method = $2)
          AND ($3::text IS NULL OR merchant_ref = $3)
          AND ($4::bigint IS NULL OR created_at >= $4)
          AND ($5::bigint IS NULL OR created_at <= $5)
          AND ($6::numeric IS NULL OR amount >= $6)
        ORDER BY id DESC
        LIMIT $7 OFFSET $8
        "#,
    )
    .bind(params.status)
    .bind(params.method)
    .bind(params.merchant_ref)
    .bind(params.from)
    .bind(params.to)
    .bind(params.min_amount)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(db)
    .await
}

/// Sum of successfully reconciled (PAID) amounts.
pub async fn total_revenue(db: impl PgExecutor<'_>) -> Result<Decimal, sqlx::Error> {
    let (total,): (Decimal,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_history WHERE status = 'paid'",
    )
    .fetch_one(db)
    .await?;
    Ok(total)
}
