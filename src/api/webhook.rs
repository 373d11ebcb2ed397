//! Gateway webhook receiver
//!
//! Returns a bare status code; the gateway retries on non-2xx. The body is
//! untrusted and the reconciliation layer re-verifies everything it claims.

use axum::Json;
use axum::extract::State;
use http::StatusCode;

use crate::error::AppError;
use crate::reconcile::{self, WebhookEvent, mask_payment_id};
use crate::state::AppState;

pub async fn receive(State(state): State<AppState>, Json(event): Json<WebhookEvent>) -> StatusCode {
    match reconcile::process_webhook(&state, &event).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            let app = AppError::from(err);
            tracing::warn!(
                payment_id = %mask_payment_id(&event.payment_id),
                code = %app.code,
                message = %app.message,
                "Webhook rejected"
            );
            app.http_status()
        }
    }
}
