//! Daily auto-confirm sweep
//!
//! Lines delivered more than a week ago without a customer confirmation
//! are confirmed on their behalf, through the same path a manual
//! confirmation takes.

use crate::auth::Caller;
use crate::db;
use crate::error::AppError;
use crate::lifecycle::fulfillment;
use crate::state::AppState;
use crate::util::now_millis;

pub const AUTO_CONFIRM_AFTER_DAYS: i64 = 7;

pub async fn run_auto_confirm(state: &AppState) {
    let cutoff = now_millis() - AUTO_CONFIRM_AFTER_DAYS * 24 * 60 * 60 * 1000;

    let lines = match db::orders::find_unconfirmed_delivered(&state.pool, cutoff).await {
        Ok(lines) => lines,
        Err(err) => {
            tracing::error!(error = %err, "Auto-confirm sweep failed to list candidates");
            return;
        }
    };
    if lines.is_empty() {
        return;
    }

    let system = Caller::system();
    let mut confirmed = 0usize;
    let mut failed = 0usize;
    for line in &lines {
        match fulfillment::confirm(state, &system, line.id, None).await {
            Ok(()) => confirmed += 1,
            Err(err) => {
                failed += 1;
                let err = AppError::from(err);
                tracing::warn!(
                    line_id = line.id,
                    code = u16::from(err.code),
                    message = %err.message,
                    "Auto-confirm skipped a line"
                );
            }
        }
    }

    tracing::info!(
        candidates = lines.len(),
        confirmed,
        failed,
        "Auto-confirm sweep finished"
    );
}
