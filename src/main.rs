//! vidgen - HTTP server entry point.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidgen::{config::Config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from a .env file if it exists.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidgen=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Fails fast on a missing provider key instead of erroring per request.
    let config = Config::from_env()?;
    info!(
        text_model = %config.models.text_to_video,
        image_model = %config.models.image_to_video,
        fallback_model = %config.models.fallback,
        "configuration loaded"
    );

    server::serve(config).await
}
