//! Shared application state

use aws_sdk_sesv2::Client as SesClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::PhoneKey;
use crate::error::BoxError;
use crate::gateway::GatewayClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    /// AWS SES client for sending emails
    pub ses: SesClient,
    /// SES sender email address
    pub ses_from_email: String,
    /// Payment gateway REST client
    pub gateway: GatewayClient,
    /// Key for stored phone numbers
    pub phone_key: PhoneKey,
    /// JWT secret for request authentication
    pub jwt_secret: String,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };

        let phone_key = if config.phone_enc_key.is_empty() {
            if config.environment != "development" {
                return Err(format!(
                    "PHONE_ENC_KEY must be set in {} environment",
                    config.environment
                )
                .into());
            }
            tracing::warn!("PHONE_ENC_KEY not set, using an ephemeral key");
            PhoneKey::generate()
        } else {
            PhoneKey::from_base64(&config.phone_enc_key)?
        };

        let gateway = GatewayClient::new(
            &config.gateway_base_url,
            &config.gateway_api_key,
            &config.gateway_api_secret,
        );

        Ok(Self {
            pool,
            ses,
            ses_from_email: config.ses_from_email.clone(),
            gateway,
            phone_key,
            jwt_secret: config.jwt_secret.clone(),
        })
    }
}
