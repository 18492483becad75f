//! anonn-backend
//!
//! OAuth token-exchange proxy.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anonn_backend::{serve, ProxyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anonn_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProxyConfig::from_env()?;
    if config.twitter.is_none() {
        tracing::warn!("Missing TWITTER_CLIENT_ID or TWITTER_CLIENT_SECRET. Twitter token exchange will fail.");
    }
    if config.github.is_none() {
        tracing::warn!("Missing GITHUB_CLIENT_ID or GITHUB_CLIENT_SECRET. GitHub token exchange will fail.");
    }

    serve(config).await
}
