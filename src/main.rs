use reqwest::Client;
use std::sync::Arc;

use munsell_picker::api::{self, AppState};
use munsell_picker::config::Config;
use munsell_picker::engine::ClassificationEngine;
use munsell_picker::source;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "White point {}, transfer {}, neutral threshold {}, interpolation {}",
        config.engine.converter.white_point,
        config.engine.converter.transfer,
        config.engine.matcher.neutral_threshold,
        if config.engine.matcher.interpolate { "on" } else { "off" }
    );

    // The table is required; without it nothing can be classified
    let table_source = source::source_from_setting(config.table.as_deref(), Client::new());
    let table = match source::load_table(table_source.as_ref()).await {
        Ok(table) => table,
        Err(e) => {
            tracing::error!("Cannot load reference table: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(ClassificationEngine::new(Arc::new(table), config.engine));
    let app = api::router(AppState::new(engine));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
