//! Transactional email over SES

use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use rust_decimal::Decimal;

use crate::error::BoxError;

/// Payment confirmation mail. Fire-and-forget at the call site; a failure
/// here must never unwind a reconciled payment.
pub async fn send_payment_completed(
    ses: &aws_sdk_sesv2::Client,
    from: &str,
    to: &str,
    name: &str,
    merchant_ref: &str,
    amount: Decimal,
) -> Result<(), BoxError> {
    let subject = Content::builder()
        .data(format!("Payment received for order {merchant_ref}"))
        .build()?;

    let body_text = format!(
        "Hello {name},\n\n\
         We received your payment of {amount} for order {merchant_ref}.\n\
         We will let you know as soon as your items ship.\n\n\
         Thank you for shopping with us."
    );

    let body = Body::builder()
        .text(Content::builder().data(body_text).build()?)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    ses.send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await?;

    tracing::info!(merchant_ref, "Payment confirmation email sent");
    Ok(())
}
