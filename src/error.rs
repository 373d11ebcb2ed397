//! Error codes, client-facing error type and the service-layer bridge
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: User errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Inventory errors
//! - 9xxx: System errors

use axum::response::IntoResponse;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error code enum, represented as u16 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Admin role required
    AdminRequired = 2003,

    // ==================== 3xxx: User ====================
    /// User not found
    UserNotFound = 3001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order line not found
    OrderLineNotFound = 4002,
    /// Status transition not allowed from the current state
    TransitionNotAllowed = 4003,
    /// Optimistic version conflict
    VersionConflict = 4004,
    /// Requested quantity exceeds the ordered quantity
    QuantityExceedsOrdered = 4005,
    /// Could not generate a collision-free merchant reference
    MerchantRefExhausted = 4006,

    // ==================== 5xxx: Payment ====================
    /// Payment not found
    PaymentNotFound = 5001,
    /// Payment gateway call failed
    GatewayFailure = 5002,
    /// Claimed amount disagrees with the gateway-verified amount
    AmountMismatch = 5003,
    /// Payment is in the wrong state for the requested operation
    PaymentStateInvalid = 5004,

    // ==================== 6xxx: Inventory ====================
    /// Product variant not found
    VariantNotFound = 6001,
    /// Product variant is inactive or deleted
    VariantUnavailable = 6002,
    /// Insufficient stock
    InsufficientStock = 6003,
    /// Stock unit (barcode) not found
    UnitNotFound = 6004,
    /// Stock unit is in the wrong state
    UnitStateInvalid = 6005,
    /// Barcode count does not match the line quantity
    BarcodeCountMismatch = 6006,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
}

impl ErrorCode {
    /// Numeric wire value
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Default human-readable message
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "OK",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::NotAuthenticated => "Not authenticated",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Token is invalid",
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::AdminRequired => "Admin role required",
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderLineNotFound => "Order line not found",
            ErrorCode::TransitionNotAllowed => "Status transition not allowed",
            ErrorCode::VersionConflict => "Concurrent update conflict",
            ErrorCode::QuantityExceedsOrdered => "Requested quantity exceeds ordered quantity",
            ErrorCode::MerchantRefExhausted => "Could not generate a unique merchant reference",
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::GatewayFailure => "Payment gateway call failed",
            ErrorCode::AmountMismatch => "Payment amount mismatch",
            ErrorCode::PaymentStateInvalid => "Payment is in the wrong state",
            ErrorCode::VariantNotFound => "Product variant not found",
            ErrorCode::VariantUnavailable => "Product variant is not available",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::UnitNotFound => "Stock unit not found",
            ErrorCode::UnitStateInvalid => "Stock unit is in the wrong state",
            ErrorCode::BarcodeCountMismatch => "Barcode count mismatch",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
        }
    }

    /// HTTP status this code maps to
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::Success => StatusCode::OK,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidRequest
            | ErrorCode::QuantityExceedsOrdered
            | ErrorCode::BarcodeCountMismatch
            | ErrorCode::AmountMismatch => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound
            | ErrorCode::UserNotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::OrderLineNotFound
            | ErrorCode::PaymentNotFound
            | ErrorCode::VariantNotFound
            | ErrorCode::UnitNotFound => StatusCode::NOT_FOUND,
            ErrorCode::NotAuthenticated | ErrorCode::TokenExpired | ErrorCode::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::PermissionDenied | ErrorCode::AdminRequired => StatusCode::FORBIDDEN,
            ErrorCode::TransitionNotAllowed
            | ErrorCode::VersionConflict
            | ErrorCode::PaymentStateInvalid
            | ErrorCode::VariantUnavailable
            | ErrorCode::InsufficientStock
            | ErrorCode::UnitStateInvalid => StatusCode::CONFLICT,
            ErrorCode::GatewayFailure => StatusCode::BAD_GATEWAY,
            ErrorCode::MerchantRefExhausted
            | ErrorCode::InternalError
            | ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => ErrorCode::Success,
            2 => ErrorCode::ValidationFailed,
            3 => ErrorCode::NotFound,
            5 => ErrorCode::InvalidRequest,
            1001 => ErrorCode::NotAuthenticated,
            1003 => ErrorCode::TokenExpired,
            1004 => ErrorCode::TokenInvalid,
            2001 => ErrorCode::PermissionDenied,
            2003 => ErrorCode::AdminRequired,
            3001 => ErrorCode::UserNotFound,
            4001 => ErrorCode::OrderNotFound,
            4002 => ErrorCode::OrderLineNotFound,
            4003 => ErrorCode::TransitionNotAllowed,
            4004 => ErrorCode::VersionConflict,
            4005 => ErrorCode::QuantityExceedsOrdered,
            4006 => ErrorCode::MerchantRefExhausted,
            5001 => ErrorCode::PaymentNotFound,
            5002 => ErrorCode::GatewayFailure,
            5003 => ErrorCode::AmountMismatch,
            5004 => ErrorCode::PaymentStateInvalid,
            6001 => ErrorCode::VariantNotFound,
            6002 => ErrorCode::VariantUnavailable,
            6003 => ErrorCode::InsufficientStock,
            6004 => ErrorCode::UnitNotFound,
            6005 => ErrorCode::UnitStateInvalid,
            6006 => ErrorCode::BarcodeCountMismatch,
            9001 => ErrorCode::InternalError,
            9002 => ErrorCode::DatabaseError,
            other => return Err(format!("Unknown error code: {other}")),
        };
        Ok(code)
    }
}

/// Application error with structured error code and details
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field-level errors, context, etc.)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{r} not found")).with_detail("resource", r)
    }

    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create an optimistic-conflict error
    pub fn conflict() -> Self {
        Self::new(ErrorCode::VersionConflict)
    }
}

/// Unified API response structure
///
/// - `code`: Error code (0 for success)
/// - `message`: Human-readable message
/// - `data`: Response payload (on success)
/// - `details`: Additional error details (on failure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: Some(data),
            details: None,
        }
    }
}

impl ApiResponse<()> {
    /// Create a success response without data
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: None,
            details: None,
        }
    }

    /// Create an error response from an AppError
    pub fn error(err: &AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message.clone(),
            data: None,
            details: err.details.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        if matches!(
            self.code,
            ErrorCode::InternalError | ErrorCode::DatabaseError
        ) {
            tracing::error!(code = %self.code, message = %self.message, "System error");
        }

        let status = self.http_status();
        let body = ApiResponse::error(&self);
        (status, Json(body)).into_response()
    }
}

/// Service-layer error — only two variants, keeps things simple.
///
/// - `Db`: Database/infrastructure errors (auto-logged, mapped to InternalError)
/// - `App`: Business-rule errors (transparent pass-through to client)
#[derive(Debug)]
pub enum ServiceError {
    /// Database or infrastructure error (sqlx, AWS SDK, serde, etc.)
    Db(BoxError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Db(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service database error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::OrderNotFound);
        assert_eq!(err.code, ErrorCode::OrderNotFound);
        assert_eq!(err.message, "Order not found");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("Missing required fields")
            .with_detail("field", "amount")
            .with_detail("reason", "required");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details.get("field").unwrap(), "amount");
        assert_eq!(details.get("reason").unwrap(), "required");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            AppError::new(ErrorCode::OrderNotFound).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::new(ErrorCode::NotAuthenticated).http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::new(ErrorCode::AdminRequired).http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::new(ErrorCode::VersionConflict).http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::new(ErrorCode::GatewayFailure).http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_code_round_trip() {
        for code in [
            ErrorCode::Success,
            ErrorCode::ValidationFailed,
            ErrorCode::VersionConflict,
            ErrorCode::InsufficientStock,
            ErrorCode::AmountMismatch,
            ErrorCode::InternalError,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
        assert!(ErrorCode::try_from(60000).is_err());
    }

    #[test]
    fn test_api_response_error() {
        let err = AppError::with_message(ErrorCode::InsufficientStock, "Only 2 left")
            .with_detail("variant_id", 7);
        let response = ApiResponse::error(&err);

        assert_eq!(response.code, Some(6003));
        assert_eq!(response.message, "Only 2 left");
        assert!(response.data.is_none());
        assert!(response.details.is_some());
    }

    #[test]
    fn test_api_response_serialize() {
        let response = ApiResponse::success("hello");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"code\":0"));
        assert!(json.contains("\"data\":\"hello\""));
    }

    #[test]
    fn test_service_error_to_app_error() {
        let err: ServiceError = AppError::conflict().into();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::VersionConflict);

        let db: ServiceError = ServiceError::Db("boom".into());
        let app: AppError = db.into();
        assert_eq!(app.code, ErrorCode::InternalError);
    }
}
