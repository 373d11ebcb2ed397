//! Order-line status machine
//!
//! All legality checks go through the transition table in [`next`]; an
//! illegal transition is a single lookup miss, surfaced by [`transition`] as
//! `TransitionNotAllowed`. No operation compares statuses ad hoc.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "line_status", rename_all = "snake_case")]
pub enum LineStatus {
    PaymentPending,
    PaymentCompleted,
    Preparing,
    Delivering,
    Delivered,
    DeliveryConfirmed,
    CancelRequested,
    Canceled,
    ReturnRequested,
    Returning,
    Returned,
    ExchangeRequested,
    ExchangeReturning,
    ExchangePreparing,
    ExchangeDelivering,
    ExchangeDelivered,
}

impl LineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LineStatus::DeliveryConfirmed | LineStatus::Canceled | LineStatus::Returned
        )
    }
}

/// Events that drive line transitions. `full` distinguishes whole-line
/// cancellations/returns (terminal) from partial ones (line survives).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Payment confirmed (webhook PAID or admin bulk action)
    MarkPaid,
    /// Payment failed at the gateway
    PaymentFailed,
    /// Payment cancelled at the gateway
    PaymentCancelled,
    /// Admin starts preparing the shipment
    BeginPreparing,
    /// Admin ships the outbound leg
    Ship,
    /// Carrier reports arrival (outbound or exchange outbound)
    Arrive,
    /// Owner, admin or the sweep confirms receipt
    Confirm,
    RequestCancel,
    RequestReturn,
    RequestExchange,
    ApproveCancel { full: bool },
    ApproveReturn,
    CompleteReturn { full: bool },
    ApproveExchange,
    /// Exchanged units arrived back at the warehouse
    ExchangeReceived,
    /// Replacement units shipped out
    ExchangeShip,
}

/// Transition table: (source state, event) -> target state.
pub fn next(from: LineStatus, event: LineEvent) -> Option<LineStatus> {
    use LineEvent as E;
    use LineStatus as S;

    let to = match (from, event) {
        (S::PaymentPending, E::MarkPaid) => S::PaymentCompleted,
        (S::PaymentPending, E::PaymentFailed) => S::Canceled,
        (S::PaymentPending | S::Preparing, E::PaymentCancelled) => S::Canceled,
        (S::PaymentCompleted, E::BeginPreparing) => S::Preparing,
        (S::Preparing, E::Ship) => S::Delivering,
        (S::Delivering, E::Arrive) => S::Delivered,
        (S::ExchangeDelivering, E::Arrive) => S::ExchangeDelivered,
        (S::Delivered | S::ExchangeDelivered, E::Confirm) => S::DeliveryConfirmed,
        (S::PaymentPending | S::Preparing, E::RequestCancel) => S::CancelRequested,
        (S::Delivered, E::RequestReturn) => S::ReturnRequested,
        (S::Delivered, E::RequestExchange) => S::ExchangeRequested,
        (S::CancelRequested, E::ApproveCancel { full: true }) => S::Canceled,
        (S::CancelRequested, E::ApproveCancel { full: false }) => S::Delivered,
        (S::ReturnRequested, E::ApproveReturn) => S::Returning,
        (S::Returning, E::CompleteReturn { full: true }) => S::Returned,
        (S::Returning, E::CompleteReturn { full: false }) => S::Delivered,
        (S::ExchangeRequested, E::ApproveExchange) => S::ExchangeReturning,
        (S::ExchangeReturning, E::ExchangeReceived) => S::ExchangePreparing,
        (S::ExchangePreparing, E::ExchangeShip) => S::ExchangeDelivering,
        _ => return None,
    };
    Some(to)
}

/// Resolve the target state or fail with `TransitionNotAllowed`.
pub fn transition(from: LineStatus, event: LineEvent) -> Result<LineStatus, AppError> {
    next(from, event).ok_or_else(|| {
        AppError::with_message(
            ErrorCode::TransitionNotAllowed,
            format!("{from:?} does not accept {event:?}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use LineEvent as E;
    use LineStatus as S;

    #[test]
    fn test_happy_path() {
        let mut status = S::PaymentPending;
        for event in [E::MarkPaid, E::BeginPreparing, E::Ship, E::Arrive, E::Confirm] {
            status = next(status, event).unwrap();
        }
        assert_eq!(status, S::DeliveryConfirmed);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_cancel_branch() {
        assert_eq!(next(S::PaymentPending, E::RequestCancel), Some(S::CancelRequested));
        assert_eq!(next(S::Preparing, E::RequestCancel), Some(S::CancelRequested));
        assert_eq!(
            next(S::CancelRequested, E::ApproveCancel { full: true }),
            Some(S::Canceled)
        );
        assert_eq!(
            next(S::CancelRequested, E::ApproveCancel { full: false }),
            Some(S::Delivered)
        );
    }

    #[test]
    fn test_return_branch() {
        let mut status = S::Delivered;
        status = next(status, E::RequestReturn).unwrap();
        status = next(status, E::ApproveReturn).unwrap();
        assert_eq!(status, S::Returning);
        assert_eq!(
            next(status, E::CompleteReturn { full: true }),
            Some(S::Returned)
        );
        assert_eq!(
            next(status, E::CompleteReturn { full: false }),
            Some(S::Delivered)
        );
    }

    #[test]
    fn test_exchange_branch() {
        let mut status = S::Delivered;
        for event in [
            E::RequestExchange,
            E::ApproveExchange,
            E::ExchangeReceived,
            E::ExchangeShip,
            E::Arrive,
            E::Confirm,
        ] {
            status = next(status, event).unwrap();
        }
        assert_eq!(status, S::DeliveryConfirmed);
    }

    #[test]
    fn test_payment_failure_paths() {
        assert_eq!(next(S::PaymentPending, E::PaymentFailed), Some(S::Canceled));
        assert_eq!(next(S::PaymentPending, E::PaymentCancelled), Some(S::Canceled));
        assert_eq!(next(S::Preparing, E::PaymentCancelled), Some(S::Canceled));
        assert_eq!(next(S::Delivering, E::PaymentCancelled), None);
        assert_eq!(next(S::Preparing, E::PaymentFailed), None);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert_eq!(next(S::PaymentPending, E::Ship), None);
        assert_eq!(next(S::Delivered, E::RequestCancel), None);
        assert_eq!(next(S::Delivering, E::Confirm), None);
        let err = transition(S::PaymentPending, E::Confirm).unwrap_err();
        assert_eq!(err.code, ErrorCode::TransitionNotAllowed);
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [S::DeliveryConfirmed, S::Canceled, S::Returned] {
            for event in [
                E::MarkPaid,
                E::BeginPreparing,
                E::Ship,
                E::Arrive,
                E::Confirm,
                E::RequestCancel,
                E::RequestReturn,
                E::RequestExchange,
                E::ApproveCancel { full: true },
                E::ApproveReturn,
                E::CompleteReturn { full: true },
                E::ApproveExchange,
                E::ExchangeReceived,
                E::ExchangeShip,
            ] {
                assert_eq!(next(terminal, event), None, "{terminal:?} / {event:?}");
            }
        }
    }
}
