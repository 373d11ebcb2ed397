//! Order placement

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::db;
use crate::db::orders::{NewOrder, NewOrderLine};
use crate::error::{AppError, ErrorCode, ServiceResult};
use crate::lifecycle::status::LineStatus;
use crate::state::AppState;
use crate::util::now_millis;

const MERCHANT_REF_ATTEMPTS: u32 = 10;
const MERCHANT_REF_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MERCHANT_REF_SUFFIX_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderLine {
    pub variant_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrder {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_postcode: String,
    pub recipient_address: String,
    pub delivery_request: Option<String>,
    pub payment_method: String,
    pub delivery_fee: Decimal,
    pub lines: Vec<PlaceOrderLine>,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub merchant_ref: String,
    pub total: Decimal,
}

/// Externally-visible order identifier: yyMMdd date part plus 6 random
/// characters. Collision-checked by the caller.
pub fn generate_merchant_ref(now_ms: i64) -> String {
    let date = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .format("%y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..MERCHANT_REF_SUFFIX_LEN)
        .map(|_| {
            let idx = rand::Rng::gen_range(&mut rng, 0..MERCHANT_REF_CHARSET.len());
            MERCHANT_REF_CHARSET[idx] as char
        })
        .collect();
    format!("{date}{suffix}")
}

/// Unit price after the variant's percentage discount, rounded to cents.
/// The rate is clamped to 0..=100 so a corrupt variant row can never
/// price a line below zero or above list price.
pub fn discounted_price(price: Decimal, discount_rate: Decimal) -> Decimal {
    let rate = discount_rate.clamp(Decimal::ZERO, Decimal::from(100));
    (price * (Decimal::ONE - rate / Decimal::from(100))).round_dp(2)
}

pub async fn place_order(
    state: &AppState,
    caller: &Caller,
    req: &PlaceOrder,
) -> ServiceResult<PlacedOrder> {
    if req.lines.is_empty() {
        return Err(AppError::validation("Order must contain at least one line").into());
    }
    if req.lines.iter().any(|l| l.quantity <= 0) {
        return Err(AppError::validation("Line quantity must be positive").into());
    }
    for (field, value) in [
        ("recipient_name", &req.recipient_name),
        ("recipient_phone", &req.recipient_phone),
        ("recipient_postcode", &req.recipient_postcode),
        ("recipient_address", &req.recipient_address),
        ("payment_method", &req.payment_method),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::validation(format!("{field} is required")).into());
        }
    }
    if req.delivery_fee < Decimal::ZERO {
        return Err(AppError::validation("delivery_fee must not be negative").into());
    }

    db::users::get(&state.pool, caller.user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    let now = now_millis();
    let encrypted_phone = state
        .phone_key
        .encrypt(&req.recipient_phone)
        .map_err(AppError::internal)?;

    let mut tx = state.pool.begin().await?;

    // Validate variants and price the order before writing anything.
    let mut priced = Vec::with_capacity(req.lines.len());
    let mut items_total = Decimal::ZERO;
    for line in &req.lines {
        let variant = db::inventory::get_variant(&mut *tx, line.variant_id)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::VariantNotFound).with_detail("variant_id", line.variant_id)
            })?;
        if !variant.is_active || variant.is_deleted {
            return Err(AppError::new(ErrorCode::VariantUnavailable)
                .with_detail("variant_id", line.variant_id)
                .into());
        }
        if variant.stock_quantity < line.quantity {
            return Err(AppError::with_message(
                ErrorCode::InsufficientStock,
                format!(
                    "Variant {} has {} in stock, {} requested",
                    variant.id, variant.stock_quantity, line.quantity
                ),
            )
            .into());
        }
        let final_price = discounted_price(variant.price, variant.discount_rate);
        items_total += final_price * Decimal::from(line.quantity);
        priced.push((variant, line.quantity, final_price));
    }
    let total = items_total + req.delivery_fee;

    let mut merchant_ref = None;
    for _ in 0..MERCHANT_REF_ATTEMPTS {
        let candidate = generate_merchant_ref(now);
        if !db::orders::merchant_ref_exists(&mut *tx, &candidate).await? {
            merchant_ref = Some(candidate);
            break;
        }
    }
    let merchant_ref =
        merchant_ref.ok_or_else(|| AppError::new(ErrorCode::MerchantRefExhausted))?;

    let order_id = db::orders::create(
        &mut *tx,
        &NewOrder {
            merchant_ref: &merchant_ref,
            user_id: caller.user_id,
            delivery_fee: req.delivery_fee,
            total,
            recipient_name: &req.recipient_name,
            recipient_phone: &encrypted_phone,
            recipient_postcode: &req.recipient_postcode,
            recipient_address: &req.recipient_address,
            delivery_request: req.delivery_request.as_deref(),
            payment_method: &req.payment_method,
            now,
        },
    )
    .await?;

    for (variant, quantity, final_price) in &priced {
        let line_id = db::orders::create_line(
            &mut *tx,
            &NewOrderLine {
                order_id,
                variant_id: variant.id,
                quantity: *quantity,
                unit_price: variant.price,
                discount_rate: variant.discount_rate,
                final_price: *final_price,
                size: variant.size.clone(),
                color: variant.color.clone(),
                now,
            },
        )
        .await?;

        // Conditional decrement is the overselling guard; the pre-check
        // above only produces a friendlier message.
        let reserved =
            db::inventory::reserve_stock(&mut *tx, variant.id, *quantity, now).await?;
        if !reserved {
            return Err(AppError::with_message(
                ErrorCode::InsufficientStock,
                format!("Variant {} ran out of stock", variant.id),
            )
            .into());
        }

        db::orders::append_line_history(
            &mut *tx,
            line_id,
            None,
            None,
            LineStatus::PaymentPending,
            "order received",
            now,
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(order_id, merchant_ref = %merchant_ref, user_id = caller.user_id, "Order placed");

    Ok(PlacedOrder {
        order_id,
        merchant_ref,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merchant_ref_format() {
        // 2024-01-15 12:00:00 UTC
        let now_ms = 1_705_320_000_000;
        let merchant_ref = generate_merchant_ref(now_ms);
        assert_eq!(merchant_ref.len(), 12);
        assert_eq!(&merchant_ref[..6], "240115");
        assert!(
            merchant_ref[6..]
                .bytes()
                .all(|b| MERCHANT_REF_CHARSET.contains(&b))
        );
    }

    #[test]
    fn test_discounted_price() {
        let price = Decimal::new(10_000, 2); // 100.00
        assert_eq!(discounted_price(price, Decimal::ZERO), price);
        assert_eq!(
            discounted_price(price, Decimal::from(10)),
            Decimal::new(9_000, 2)
        );
        // 19.99 at 15% -> 16.9915 -> 16.99
        assert_eq!(
            discounted_price(Decimal::new(1_999, 2), Decimal::from(15)),
            Decimal::new(1_699, 2)
        );
    }

    #[test]
    fn test_discounted_price_clamps_out_of_range_rates() {
        let price = Decimal::new(10_000, 2); // 100.00
        assert_eq!(discounted_price(price, Decimal::from(150)), Decimal::ZERO);
        assert_eq!(discounted_price(price, Decimal::from(-25)), price);
        assert_eq!(discounted_price(price, Decimal::from(100)), Decimal::ZERO);
    }
}
