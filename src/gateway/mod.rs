//! Payment gateway HTTP client
//!
//! Thin typed wrapper around the gateway's REST API. Authenticates with an
//! API key pair, caches the bearer token and refreshes it shortly before
//! expiry. Every payment response is returned both parsed and as the raw
//! JSON body, so callers can ledger the exact payload the gateway sent.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::{AppError, ErrorCode, ServiceError};
use crate::util::now_millis;

const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("gateway token error: {0}")]
    Token(String),
    #[error("unexpected gateway response shape: {0}")]
    Shape(String),
}

impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        ServiceError::App(AppError::with_message(
            ErrorCode::GatewayFailure,
            e.to_string(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Ready,
    Paid,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayAmount {
    pub total: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCustomer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualAccount {
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub holder: Option<String>,
}

/// Payment object as the gateway reports it. This, not the webhook body,
/// is the source of truth for amounts and status.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_ref: Option<String>,
    pub status: GatewayStatus,
    pub method: Option<String>,
    pub amount: GatewayAmount,
    pub customer: Option<GatewayCustomer>,
    pub requested_at: Option<i64>,
    pub virtual_account: Option<VirtualAccount>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until expiry
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref()
                && token.expires_at - TOKEN_REFRESH_MARGIN_MS > now_millis()
            {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/login/api-key", self.base_url))
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "api_secret": self.api_secret,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Token(format!("login returned {status}: {body}")));
        }
        let token: TokenResponse = response.json().await?;

        let cached = CachedToken {
            expires_at: now_millis() + token.expires_in * 1000,
            access_token: token.access_token.clone(),
        };
        *self.token.write().await = Some(cached);
        Ok(token.access_token)
    }

    async fn payment_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(GatewayPayment, Value), GatewayError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }
        let raw: Value = response.json().await?;
        let payment: GatewayPayment =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Shape(e.to_string()))?;
        Ok((payment, raw))
    }

    /// Fetch a payment by gateway id.
    pub async fn get_payment(
        &self,
        payment_id: &str,
    ) -> Result<(GatewayPayment, Value), GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/payments/{payment_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        self.payment_response(response).await
    }

    /// Cancel a payment on the gateway side.
    pub async fn cancel_payment(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> Result<(GatewayPayment, Value), GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/payments/{payment_id}/cancel", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await?;
        self.payment_response(response).await
    }

    /// Ask the gateway to issue a virtual account for a READY payment.
    pub async fn issue_virtual_account(
        &self,
        payment_id: &str,
        holder: &str,
        bank_code: &str,
    ) -> Result<(GatewayPayment, Value), GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/payments/{payment_id}/virtual-account",
                self.base_url
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({ "holder": holder, "bank_code": bank_code }))
            .send()
            .await?;
        self.payment_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payment() {
        let raw = serde_json::json!({
            "id": "pay_20240115abcdef",
            "order_ref": "240115A1B2C3",
            "status": "PAID",
            "method": "CARD",
            "amount": { "total": "129.99" },
            "customer": { "name": "Jane Doe", "email": "jane@example.com", "phone": null },
            "requested_at": 1705320000000i64
        });
        let payment: GatewayPayment = serde_json::from_value(raw).unwrap();
        assert_eq!(payment.id, "pay_20240115abcdef");
        assert_eq!(payment.status, GatewayStatus::Paid);
        assert_eq!(payment.amount.total, Decimal::new(12_999, 2));
        assert_eq!(payment.customer.unwrap().name.as_deref(), Some("Jane Doe"));
        assert!(payment.virtual_account.is_none());
    }

    #[test]
    fn test_parse_virtual_account_payment() {
        let raw = serde_json::json!({
            "id": "pay_va001",
            "order_ref": null,
            "status": "READY",
            "amount": { "total": 50 },
            "virtual_account": {
                "bank_code": "004",
                "account_number": "123-456-789",
                "holder": "Mall Store"
            }
        });
        let payment: GatewayPayment = serde_json::from_value(raw).unwrap();
        assert_eq!(payment.status, GatewayStatus::Ready);
        let va = payment.virtual_account.unwrap();
        assert_eq!(va.account_number.as_deref(), Some("123-456-789"));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let raw = serde_json::json!({
            "id": "pay_x",
            "status": "EXPLODED",
            "amount": { "total": 1 }
        });
        assert!(serde_json::from_value::<GatewayPayment>(raw).is_err());
    }
}
