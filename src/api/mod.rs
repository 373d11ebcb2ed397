//! HTTP surface

mod health;
mod orders;
mod payments;
mod webhook;

use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::error::{ApiResponse, ServiceError};
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, ServiceError>;

pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/api/orders", post(orders::place).get(orders::list))
        .route("/api/orders/count", get(orders::count))
        .route("/api/orders/search", get(orders::search))
        .route("/api/orders/{id}", get(orders::detail))
        .route("/api/order-lines/mark-paid", post(orders::mark_paid))
        .route(
            "/api/order-lines/{id}/preparing",
            post(orders::begin_preparing),
        )
        .route("/api/order-lines/{id}/ship", post(orders::ship))
        .route("/api/order-lines/{id}/arrive", post(orders::arrive))
        .route("/api/order-lines/{id}/confirm", post(orders::confirm))
        .route("/api/order-lines/{id}/request", post(orders::request_change))
        .route(
            "/api/order-lines/{id}/cancel-approval",
            post(orders::approve_cancel),
        )
        .route(
            "/api/order-lines/{id}/return-approval",
            post(orders::approve_return),
        )
        .route(
            "/api/order-lines/{id}/return-complete",
            post(orders::complete_return),
        )
        .route(
            "/api/order-lines/{id}/exchange-approval",
            post(orders::approve_exchange),
        )
        .route(
            "/api/order-lines/{id}/exchange-received",
            post(orders::exchange_received),
        )
        .route(
            "/api/order-lines/{id}/exchange-ship",
            post(orders::exchange_ship),
        )
        .route(
            "/api/order-lines/{id}/delivery-history",
            get(orders::delivery_history),
        )
        .route("/api/payments/prepare", post(payments::prepare))
        .route("/api/payments/{id}/verify", post(payments::verify))
        .route("/api/payments/{id}/cancel", post(payments::cancel))
        .route(
            "/api/payments/{id}/virtual-account",
            post(payments::virtual_account),
        )
        .route("/api/payments/history", get(payments::history))
        .route(
            "/api/payments/history/by-payment/{payment_id}",
            get(payments::history_by_payment),
        )
        .route(
            "/api/payments/history/by-merchant/{merchant_ref}",
            get(payments::history_by_merchant),
        )
        .route(
            "/api/payments/history/by-order/{order_id}",
            get(payments::history_by_order),
        )
        .route("/api/payments/revenue", get(payments::revenue))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        // The gateway calls this; it carries no bearer token.
        .route("/api/payments/webhook", post(webhook::receive))
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
