//! imreview server binary

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use imreview_core::ReviewConfig;
use imreview_server::{serve, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,imreview_server=debug")),
        )
        .init();

    let config = match std::env::var("IMREVIEW_CONFIG") {
        Ok(path) => ReviewConfig::from_path(&path)?,
        Err(_) => {
            tracing::warn!("IMREVIEW_CONFIG not set, starting with defaults and no identities");
            ReviewConfig::default()
        }
    };
    let addr = std::env::var("IMREVIEW_ADDR").unwrap_or_else(|_| config.server.addr.clone());

    let state = Arc::new(AppState::from_config(&config)?);
    serve(&addr, state).await
}
