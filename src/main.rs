mod api;
mod auth;
mod config;
mod crypto;
mod db;
mod email;
mod error;
mod gateway;
mod lifecycle;
mod reconcile;
mod state;
mod util;

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::BoxError;
use crate::state::AppState;

const AUTO_CONFIRM_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mall_cloud=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::new(&config).await?;

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUTO_CONFIRM_INTERVAL);
        loop {
            ticker.tick().await;
            lifecycle::sweeper::run_auto_confirm(&sweep_state).await;
        }
    });

    let app = api::create_router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
