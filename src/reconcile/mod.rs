//! Payment reconciliation against the gateway
//!
//! The gateway's own record is the trust anchor: webhook bodies are treated
//! as hints and every claim in them is re-verified with a direct gateway
//! call before any order state moves. Every reconciliation attempt, good or
//! bad, leaves a row in the payment ledger; the error row is written before
//! the error surfaces, so the ledger stays complete even when the caller
//! drops the response. Identifiers and digits are masked before they reach
//! ledger error columns or log lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::db::payments::{NewPaymentRecord, PaymentStatus};
use crate::error::{AppError, ErrorCode, ServiceError, ServiceResult};
use crate::gateway::{GatewayPayment, GatewayStatus};
use crate::lifecycle::retry::retry_transition;
use crate::lifecycle::status::{LineEvent, LineStatus};
use crate::lifecycle::{StatusWrite, write_status};
use crate::state::AppState;
use crate::util::now_millis;

/// First and last four characters survive; everything between is masked.
/// Counts characters, not bytes; the input is unauthenticated and may
/// carry arbitrary UTF-8.
pub fn mask_payment_id(payment_id: &str) -> String {
    let chars: Vec<char> = payment_id.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// Collapse every digit run to `***` so amounts, account numbers and
/// phone numbers cannot leak through error text.
pub fn mask_error_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_digits = false;
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            if !in_digits {
                out.push_str("***");
                in_digits = true;
            }
        } else {
            in_digits = false;
            out.push(ch);
        }
    }
    out
}

/// yyMMdd date part plus six characters of `[0-9A-Z]`.
pub fn merchant_ref_valid(merchant_ref: &str) -> bool {
    let bytes = merchant_ref.as_bytes();
    bytes.len() == 12
        && bytes[..6].iter().all(u8::is_ascii_digit)
        && bytes[6..]
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

pub fn payment_id_valid(payment_id: &str) -> bool {
    payment_id.is_ascii() && payment_id.len() > 4 && payment_id.starts_with("pay_")
}

/// Best-effort error row; reconciliation never fails because the ledger
/// write did.
async fn record_error(
    state: &AppState,
    payment_id: Option<&str>,
    merchant_ref: Option<&str>,
    order_id: Option<i64>,
    err: &AppError,
) {
    let code = err.code.code().to_string();
    let message = mask_error_text(&err.message);
    let result = db::payments::append(
        &state.pool,
        &NewPaymentRecord {
            payment_id,
            merchant_ref,
            order_id,
            status: PaymentStatus::Failed,
            method: None,
            amount: None,
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            requested_at: None,
            payload: None,
            error_code: Some(&code),
            error_message: Some(&message),
            now: now_millis(),
        },
    )
    .await;
    if let Err(db_err) = result {
        tracing::error!(error = %db_err, "Failed to ledger a reconciliation error");
    }
}

async fn with_error_row<T>(
    state: &AppState,
    payment_id: Option<&str>,
    merchant_ref: Option<&str>,
    order_id: Option<i64>,
    result: ServiceResult<T>,
) -> ServiceResult<T> {
    if let Err(ServiceError::App(err)) = &result {
        record_error(state, payment_id, merchant_ref, order_id, err).await;
    }
    result
}

#[derive(Debug, Deserialize)]
pub struct PreparePayment {
    pub merchant_ref: String,
    pub amount: Decimal,
    pub product_name: String,
    pub buyer_name: String,
    pub buyer_email: String,
}

/// Register the amount we expect the gateway to collect, before the
/// client launches the payment UI. The READY row anchors later
/// verification.
pub async fn prepare_payment(state: &AppState, req: &PreparePayment) -> ServiceResult<()> {
    let result = prepare_payment_inner(state, req).await;
    with_error_row(state, None, Some(&req.merchant_ref), None, result).await
}

async fn prepare_payment_inner(state: &AppState, req: &PreparePayment) -> ServiceResult<()> {
    if req.amount <= Decimal::ZERO {
        return Err(AppError::validation("amount must be positive").into());
    }
    for (field, value) in [
        ("product_name", &req.product_name),
        ("buyer_name", &req.buyer_name),
        ("buyer_email", &req.buyer_email),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::validation(format!("{field} is required")).into());
        }
    }
    if !merchant_ref_valid(&req.merchant_ref) {
        return Err(AppError::validation("merchant_ref is malformed").into());
    }

    let order = db::orders::get_by_merchant_ref(&state.pool, &req.merchant_ref)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    if req.amount != order.current_total {
        return Err(AppError::with_message(
            ErrorCode::AmountMismatch,
            "Prepared amount disagrees with the order total",
        )
        .into());
    }

    db::payments::append(
        &state.pool,
        &NewPaymentRecord {
            payment_id: None,
            merchant_ref: Some(&req.merchant_ref),
            order_id: Some(order.id),
            status: PaymentStatus::Ready,
            method: None,
            amount: Some(req.amount),
            customer_name: Some(req.buyer_name.trim()),
            customer_email: Some(req.buyer_email.trim()),
            customer_phone: None,
            requested_at: None,
            payload: None,
            error_code: None,
            error_message: None,
            now: now_millis(),
        },
    )
    .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct VerifiedPayment {
    pub payment_id: String,
    pub merchant_ref: Option<String>,
    pub status: GatewayStatus,
    pub method: Option<String>,
    pub amount: Decimal,
    pub requested_at: Option<i64>,
}

impl From<&GatewayPayment> for VerifiedPayment {
    fn from(payment: &GatewayPayment) -> Self {
        Self {
            payment_id: payment.id.clone(),
            merchant_ref: payment.order_ref.clone(),
            status: payment.status,
            method: payment.method.clone(),
            amount: payment.amount.total,
            requested_at: payment.requested_at,
        }
    }
}

/// Look a payment up at the gateway and ledger what it said.
pub async fn verify_payment(state: &AppState, payment_id: &str) -> ServiceResult<VerifiedPayment> {
    let result = verify_payment_inner(state, payment_id).await;
    with_error_row(state, Some(payment_id), None, None, result).await
}

async fn verify_payment_inner(
    state: &AppState,
    payment_id: &str,
) -> ServiceResult<VerifiedPayment> {
    if !payment_id_valid(payment_id) {
        return Err(AppError::validation("payment_id is malformed").into());
    }

    let (payment, raw) = state.gateway.get_payment(payment_id).await?;
    if !matches!(payment.status, GatewayStatus::Paid | GatewayStatus::Ready) {
        return Err(AppError::with_message(
            ErrorCode::PaymentStateInvalid,
            format!(
                "Payment {} is not verifiable in its current state",
                mask_payment_id(payment_id)
            ),
        )
        .into());
    }

    ledger_gateway_payment(state, &state.pool, &payment, &raw, None).await?;
    Ok(VerifiedPayment::from(&payment))
}

/// Cancel a payment at the gateway and ledger the outcome.
pub async fn cancel_payment(
    state: &AppState,
    payment_id: &str,
    reason: &str,
) -> ServiceResult<VerifiedPayment> {
    let result = cancel_payment_inner(state, payment_id, reason).await;
    with_error_row(state, Some(payment_id), None, None, result).await
}

async fn cancel_payment_inner(
    state: &AppState,
    payment_id: &str,
    reason: &str,
) -> ServiceResult<VerifiedPayment> {
    if !payment_id_valid(payment_id) {
        return Err(AppError::validation("payment_id is malformed").into());
    }
    if reason.trim().is_empty() {
        return Err(AppError::validation("reason is required").into());
    }

    let (payment, raw) = state.gateway.cancel_payment(payment_id, reason.trim()).await?;
    if payment.status != GatewayStatus::Cancelled {
        return Err(AppError::with_message(
            ErrorCode::PaymentStateInvalid,
            format!(
                "Gateway did not cancel payment {}",
                mask_payment_id(payment_id)
            ),
        )
        .into());
    }

    ledger_gateway_payment(state, &state.pool, &payment, &raw, None).await?;
    Ok(VerifiedPayment::from(&payment))
}

#[derive(Debug, Deserialize)]
pub struct VirtualAccountRequest {
    pub holder: String,
    pub bank_code: String,
}

#[derive(Debug, Serialize)]
pub struct VirtualAccountView {
    pub payment_id: String,
    pub bank_code: Option<String>,
    pub account_number: String,
    pub holder: Option<String>,
}

/// Have the gateway issue a virtual account for a READY payment.
pub async fn issue_virtual_account(
    state: &AppState,
    payment_id: &str,
    req: &VirtualAccountRequest,
) -> ServiceResult<VirtualAccountView> {
    let result = issue_virtual_account_inner(state, payment_id, req).await;
    with_error_row(state, Some(payment_id), None, None, result).await
}

async fn issue_virtual_account_inner(
    state: &AppState,
    payment_id: &str,
    req: &VirtualAccountRequest,
) -> ServiceResult<VirtualAccountView> {
    if !payment_id_valid(payment_id) {
        return Err(AppError::validation("payment_id is malformed").into());
    }
    if req.holder.trim().is_empty() || req.bank_code.trim().is_empty() {
        return Err(AppError::validation("holder and bank_code are required").into());
    }

    let (payment, raw) = state
        .gateway
        .issue_virtual_account(payment_id, req.holder.trim(), req.bank_code.trim())
        .await?;
    let account = payment
        .virtual_account
        .as_ref()
        .and_then(|va| va.account_number.clone())
        .ok_or_else(|| {
            AppError::with_message(
                ErrorCode::GatewayFailure,
                "Gateway response carried no virtual account number",
            )
        })?;

    ledger_gateway_payment(state, &state.pool, &payment, &raw, None).await?;
    Ok(VirtualAccountView {
        payment_id: payment.id.clone(),
        bank_code: payment
            .virtual_account
            .as_ref()
            .and_then(|va| va.bank_code.clone()),
        account_number: account,
        holder: payment
            .virtual_account
            .as_ref()
            .and_then(|va| va.holder.clone()),
    })
}

/// One ledger row mirroring a gateway payment object, raw payload attached.
/// Takes an executor so webhook processing can append inside the same
/// transaction as the line transitions it records.
async fn ledger_gateway_payment(
    state: &AppState,
    db: impl sqlx::PgExecutor<'_>,
    payment: &GatewayPayment,
    raw: &serde_json::Value,
    order_id: Option<i64>,
) -> ServiceResult<()> {
    let status = match payment.status {
        GatewayStatus::Ready => PaymentStatus::Ready,
        GatewayStatus::Paid => PaymentStatus::Paid,
        GatewayStatus::Failed => PaymentStatus::Failed,
        GatewayStatus::Cancelled => PaymentStatus::Cancelled,
    };
    let customer = payment.customer.as_ref();
    let encrypted_phone = match customer.and_then(|c| c.phone.as_deref()) {
        Some(phone) => Some(state.phone_key.encrypt(phone).map_err(AppError::internal)?),
        None => None,
    };

    db::payments::append(
        db,
        &NewPaymentRecord {
            payment_id: Some(&payment.id),
            merchant_ref: payment.order_ref.as_deref(),
            order_id,
            status,
            method: payment.method.as_deref(),
            amount: Some(payment.amount.total),
            customer_name: customer.and_then(|c| c.name.as_deref()),
            customer_email: customer.and_then(|c| c.email.as_deref()),
            customer_phone: encrypted_phone.as_deref(),
            requested_at: payment.requested_at,
            payload: Some(raw),
            error_code: None,
            error_message: None,
            now: now_millis(),
        },
    )
    .await?;
    Ok(())
}

/// Webhook body. Everything in it is unauthenticated input.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub payment_id: String,
    pub order_ref: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
}

#[derive(Debug)]
struct WebhookFields<'a> {
    order_ref: &'a str,
    status: &'a str,
    amount: Decimal,
}

/// Every field is mandatory; the amount claim in particular must be
/// present so it can be checked against the gateway's record.
fn validate_webhook_fields(event: &WebhookEvent) -> Result<WebhookFields<'_>, AppError> {
    if !payment_id_valid(&event.payment_id) {
        return Err(AppError::validation("payment_id is malformed"));
    }
    let order_ref = event
        .order_ref
        .as_deref()
        .ok_or_else(|| AppError::validation("order_ref is required"))?;
    if !merchant_ref_valid(order_ref) {
        return Err(AppError::validation("order_ref is malformed"));
    }
    let status = event
        .status
        .as_deref()
        .ok_or_else(|| AppError::validation("status is required"))?;
    let amount = event
        .amount
        .ok_or_else(|| AppError::validation("amount is required"))?;
    Ok(WebhookFields {
        order_ref,
        status,
        amount,
    })
}

pub async fn process_webhook(state: &AppState, event: &WebhookEvent) -> ServiceResult<()> {
    let result = process_webhook_inner(state, event).await;
    with_error_row(
        state,
        Some(&event.payment_id),
        event.order_ref.as_deref(),
        None,
        result,
    )
    .await
}

async fn process_webhook_inner(state: &AppState, event: &WebhookEvent) -> ServiceResult<()> {
    let fields = validate_webhook_fields(event)?;

    // The webhook only tells us to go look; the gateway's record decides.
    let (verified, raw) = state.gateway.get_payment(&event.payment_id).await?;

    let order = db::orders::get_by_merchant_ref(&state.pool, fields.order_ref)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;

    if verified.order_ref.as_deref() != Some(fields.order_ref) {
        return Err(AppError::with_message(
            ErrorCode::ValidationFailed,
            "order_ref disagrees with the gateway record",
        )
        .into());
    }
    let expected_status = match verified.status {
        GatewayStatus::Ready => "READY",
        GatewayStatus::Paid => "PAID",
        GatewayStatus::Failed => "FAILED",
        GatewayStatus::Cancelled => "CANCELLED",
    };
    if fields.status != expected_status {
        return Err(AppError::with_message(
            ErrorCode::PaymentStateInvalid,
            format!(
                "Webhook status disagrees with the gateway record for {}",
                mask_payment_id(&event.payment_id)
            ),
        )
        .into());
    }
    if fields.amount != verified.amount.total {
        return Err(AppError::new(ErrorCode::AmountMismatch).into());
    }

    match verified.status {
        GatewayStatus::Paid => handle_paid(state, &order, &verified, &raw).await,
        GatewayStatus::Failed => {
            handle_failure(state, &order, &verified, &raw, LineEvent::PaymentFailed).await
        }
        GatewayStatus::Cancelled => {
            handle_failure(state, &order, &verified, &raw, LineEvent::PaymentCancelled).await
        }
        GatewayStatus::Ready => Err(AppError::with_message(
            ErrorCode::PaymentStateInvalid,
            format!(
                "Payment {} has not reached a final state",
                mask_payment_id(&event.payment_id)
            ),
        )
        .into()),
    }
}

/// What a PAID reconciliation does with one line, given its state.
#[derive(Debug, PartialEq, Eq)]
enum PaidLineAction {
    Advance(LineStatus),
    AlreadyPaid,
    Reject,
}

fn paid_line_action(status: LineStatus) -> PaidLineAction {
    match crate::lifecycle::status::next(status, LineEvent::MarkPaid) {
        Some(to) => PaidLineAction::Advance(to),
        // A replayed webhook or a concurrent admin mark-paid; nothing to do
        // for this line, the rest of the order must still be processed.
        None if status == LineStatus::PaymentCompleted => PaidLineAction::AlreadyPaid,
        None => PaidLineAction::Reject,
    }
}

async fn handle_paid(
    state: &AppState,
    order: &db::orders::Order,
    verified: &GatewayPayment,
    raw: &serde_json::Value,
) -> ServiceResult<()> {
    if verified.amount.total != order.current_total {
        return Err(AppError::with_message(
            ErrorCode::AmountMismatch,
            "Gateway-verified amount disagrees with the order total",
        )
        .into());
    }

    retry_transition(|| paid_once(state, order, verified, raw)).await?;

    tracing::info!(
        order_id = order.id,
        merchant_ref = %order.merchant_ref,
        payment_id = %mask_payment_id(&verified.id),
        "Payment reconciled as PAID"
    );

    let user = db::users::get(&state.pool, order.user_id).await?;
    if let Some(user) = user {
        let state = state.clone();
        let merchant_ref = order.merchant_ref.clone();
        let amount = verified.amount.total;
        let payment_id = verified.id.clone();
        tokio::spawn(async move {
            let sent = crate::email::send_payment_completed(
                &state.ses,
                &state.ses_from_email,
                &user.email,
                &user.name,
                &merchant_ref,
                amount,
            )
            .await;
            if let Err(err) = sent {
                tracing::warn!(
                    merchant_ref = %merchant_ref,
                    error = %err,
                    "Payment confirmation email failed"
                );
                let app = AppError::with_message(
                    ErrorCode::InternalError,
                    format!("confirmation email failed: {err}"),
                );
                record_error(&state, Some(&payment_id), Some(&merchant_ref), None, &app).await;
            }
        });
    }

    Ok(())
}

/// One attempt at reconciling PAID: every eligible line advances and the
/// ledger row lands in the same transaction, so a failure partway through
/// leaves nothing committed. Lines that are already past the payment step
/// (a replayed webhook racing an admin mark-paid) are skipped; a webhook
/// that finds no line left to advance is itself a replay and is rejected.
async fn paid_once(
    state: &AppState,
    order: &db::orders::Order,
    verified: &GatewayPayment,
    raw: &serde_json::Value,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let lines = db::orders::lines_for_order(&mut *tx, order.id).await?;
    if lines.is_empty() {
        return Err(AppError::new(ErrorCode::OrderLineNotFound).into());
    }

    let mut transitioned = 0;
    for line in &lines {
        let to = match paid_line_action(line.status) {
            PaidLineAction::Advance(to) => to,
            PaidLineAction::AlreadyPaid => continue,
            PaidLineAction::Reject => {
                return Err(AppError::with_message(
                    ErrorCode::TransitionNotAllowed,
                    format!("{:?} does not accept a payment confirmation", line.status),
                )
                .into());
            }
        };

        write_status(
            &mut tx,
            line,
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
        db::delivery::insert(
            &mut *tx,
            line.id,
            crate::db::delivery::DeliveryType::OrderOut,
            crate::db::delivery::DeliveryStatus::Preparing,
            now,
        )
        .await?;
        transitioned += 1;
    }

    if transitioned == 0 {
        return Err(AppError::with_message(
            ErrorCode::TransitionNotAllowed,
            "All order lines already reconciled as paid",
        )
        .into());
    }

    ledger_gateway_payment(state, &mut *tx, verified, raw, Some(order.id)).await?;

    tx.commit().await?;
    Ok(())
}

/// FAILED and CANCELLED take the same shape: cancel every surviving line,
/// zero the order total and ledger the verdict, all in one transaction.
async fn handle_failure(
    state: &AppState,
    order: &db::orders::Order,
    verified: &GatewayPayment,
    raw: &serde_json::Value,
    event: LineEvent,
) -> ServiceResult<()> {
    let reason = match event {
        LineEvent::PaymentFailed => "payment failed",
        _ => "payment cancelled",
    };

    retry_transition(|| failure_once(state, order, verified, raw, event, reason)).await?;

    tracing::info!(
        order_id = order.id,
        merchant_ref = %order.merchant_ref,
        payment_id = %mask_payment_id(&verified.id),
        reason,
        "Payment reconciled as not collected"
    );
    Ok(())
}

async fn failure_once(
    state: &AppState,
    order: &db::orders::Order,
    verified: &GatewayPayment,
    raw: &serde_json::Value,
    event: LineEvent,
    reason: &str,
) -> ServiceResult<()> {
    let now = now_millis();
    let mut tx = state.pool.begin().await?;

    let lines = db::orders::lines_for_order(&mut *tx, order.id).await?;
    for line in &lines {
        if line.status.is_terminal() {
            continue;
        }
        let to = crate::lifecycle::status::transition(line.status, event)?;

        if line.changed_quantity > 0 {
            let released = db::inventory::release_reservation(
                &mut *tx,
                line.variant_id,
                line.changed_quantity,
                now,
            )
            .await?;
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
            line,
            StatusWrite {
                to,
                changed_quantity: 0,
                request_quantity: line.request_quantity,
                request_reason: line.request_reason.as_deref(),
                history_reason: reason,
                request_record: None,
                now,
            },
        )
        .await?;

        if line.status == LineStatus::Preparing
            && let Some(leg) = db::delivery::latest_by_status(
                &mut *tx,
                line.id,
                crate::db::delivery::DeliveryStatus::Preparing,
            )
            .await?
        {
            crate::db::delivery::set_status(
                &mut *tx,
                leg.id,
                crate::db::delivery::DeliveryStatus::Canceled,
                now,
            )
            .await?;
        }
    }

    db::orders::set_current_total(&mut *tx, order.id, Decimal::ZERO, now).await?;
    ledger_gateway_payment(state, &mut *tx, verified, raw, Some(order.id)).await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_payment_id() {
        assert_eq!(mask_payment_id("pay_20240115abcdef"), "pay_****cdef");
        assert_eq!(mask_payment_id("pay_x"), "****");
        assert_eq!(mask_payment_id(""), "****");
    }

    #[test]
    fn test_mask_payment_id_multibyte_input() {
        // Webhook bodies are unauthenticated; masking must survive ids
        // where char boundaries do not line up with byte offsets.
        assert_eq!(mask_payment_id("payé12345"), "payé****2345");
        assert_eq!(mask_payment_id("崔崔崔崔崔崔崔崔崔"), "崔崔崔崔****崔崔崔崔");
        assert_eq!(mask_payment_id("pay_é"), "****");
    }

    #[test]
    fn test_mask_error_text() {
        assert_eq!(
            mask_error_text("card 1234567812345678 declined"),
            "card *** declined"
        );
        assert_eq!(mask_error_text("no digits here"), "no digits here");
        assert_eq!(mask_error_text("a1b22c333"), "a***b***c***");
    }

    #[test]
    fn test_merchant_ref_valid() {
        assert!(merchant_ref_valid("240115A1B2C3"));
        assert!(merchant_ref_valid("240115000000"));
        assert!(!merchant_ref_valid("240115a1b2c3"));
        assert!(!merchant_ref_valid("24011A5A1B2C"));
        assert!(!merchant_ref_valid("240115A1B2C"));
        assert!(!merchant_ref_valid("240115A1B2C34"));
    }

    #[test]
    fn test_payment_id_valid() {
        assert!(payment_id_valid("pay_abc123"));
        assert!(!payment_id_valid("pay_"));
        assert!(!payment_id_valid("tok_abc123"));
        assert!(!payment_id_valid(""));
        assert!(!payment_id_valid("pay_abcé123"));
    }

    fn webhook(
        order_ref: Option<&str>,
        status: Option<&str>,
        amount: Option<Decimal>,
    ) -> WebhookEvent {
        WebhookEvent {
            payment_id: "pay_abc123".to_string(),
            order_ref: order_ref.map(str::to_string),
            status: status.map(str::to_string),
            amount,
        }
    }

    #[test]
    fn test_webhook_fields_all_present() {
        let event = webhook(Some("240115A1B2C3"), Some("PAID"), Some(Decimal::from(100)));
        let fields = validate_webhook_fields(&event).unwrap();
        assert_eq!(fields.order_ref, "240115A1B2C3");
        assert_eq!(fields.status, "PAID");
        assert_eq!(fields.amount, Decimal::from(100));
    }

    #[test]
    fn test_webhook_fields_rejects_missing_amount() {
        let event = webhook(Some("240115A1B2C3"), Some("PAID"), None);
        let err = validate_webhook_fields(&event).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_webhook_fields_rejects_missing_order_ref_or_status() {
        let event = webhook(None, Some("PAID"), Some(Decimal::from(100)));
        assert!(validate_webhook_fields(&event).is_err());

        let event = webhook(Some("240115A1B2C3"), None, Some(Decimal::from(100)));
        assert!(validate_webhook_fields(&event).is_err());
    }

    #[test]
    fn test_paid_line_action_per_status() {
        assert_eq!(
            paid_line_action(LineStatus::PaymentPending),
            PaidLineAction::Advance(LineStatus::PaymentCompleted)
        );
        // A replay finds lines already past the payment step and skips
        // them instead of aborting the rest of the order.
        assert_eq!(
            paid_line_action(LineStatus::PaymentCompleted),
            PaidLineAction::AlreadyPaid
        );
        assert_eq!(paid_line_action(LineStatus::Delivering), PaidLineAction::Reject);
        assert_eq!(paid_line_action(LineStatus::Canceled), PaidLineAction::Reject);
    }
}
