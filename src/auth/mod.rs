//! JWT authentication resolving the caller's identity
//!
//! The middleware is the only place a token is inspected; everything past it
//! receives an explicit [`Caller`] value and performs its own ownership and
//! admin checks against it.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::state::AppState;

/// JWT claims for customer/admin authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Elevated privilege
    pub admin: bool,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated caller identity, threaded as a parameter into every
/// lifecycle and payment operation.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i64,
    pub admin: bool,
}

impl Caller {
    /// Identity used by background jobs. Holds admin privilege but is
    /// distinguishable from a human admin in audit reasons.
    pub fn system() -> Self {
        Self {
            user_id: 0,
            admin: true,
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == 0 && self.admin
    }

    /// Reject non-admin callers
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.admin {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::AdminRequired))
        }
    }

    /// Reject callers that neither own the resource nor hold admin privilege
    pub fn require_owner_or_admin(&self, owner_id: i64) -> Result<(), AppError> {
        if self.admin || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::permission_denied(
                "Caller does not own this resource",
            ))
        }
    }
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// Create a JWT token for a user
pub fn create_token(
    user_id: i64,
    admin: bool,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        admin,
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Middleware that extracts and verifies the bearer JWT and inserts a
/// [`Caller`] extension for downstream handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::new(ErrorCode::NotAuthenticated).into_response())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid).into_response())?;

    let validation = Validation::default();
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        AppError::new(ErrorCode::TokenInvalid).into_response()
    })?;

    let user_id: i64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::new(ErrorCode::TokenInvalid).into_response())?;

    let caller = Caller {
        user_id,
        admin: token_data.claims.admin,
    };

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = create_token(42, true, "test-secret").unwrap();
        let decoded = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "42");
        assert!(decoded.claims.admin);
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let token = create_token(42, false, "test-secret").unwrap();
        let result = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_require_admin() {
        let admin = Caller {
            user_id: 1,
            admin: true,
        };
        let customer = Caller {
            user_id: 2,
            admin: false,
        };
        assert!(admin.require_admin().is_ok());
        assert_eq!(
            customer.require_admin().unwrap_err().code,
            ErrorCode::AdminRequired
        );
    }

    #[test]
    fn test_require_owner_or_admin() {
        let customer = Caller {
            user_id: 2,
            admin: false,
        };
        assert!(customer.require_owner_or_admin(2).is_ok());
        assert!(customer.require_owner_or_admin(3).is_err());
        assert!(Caller::system().require_owner_or_admin(3).is_ok());
    }
}
