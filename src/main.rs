// Entry point of the rental label service.
//
// **Architecture Overview:**
// - `core/` = Business logic (login flow, label extraction, row appends)
// - `infra/` = Implementations of core traits (identity provider, workbook API, OCR, token file)
// - `http/` = axum routes translating requests into core calls
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Serve the HTTP router

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "http/http_layer.rs"]
mod http;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core::auth::{AccessTokenSource, AuthService};
use crate::core::shipment::RecordExtractor;
use crate::core::spreadsheet::SpreadsheetAppender;
use crate::http::AppState;
use crate::infra::graph::GraphWorkbookClient;
use crate::infra::identity::MicrosoftIdentityClient;
use crate::infra::ocr::TesseractOcr;
use crate::infra::token_store::FileTokenStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    // Auth: identity provider + token file
    let token_store = Arc::new(FileTokenStore::new(&config.token_cache_path));
    let identity = Arc::new(MicrosoftIdentityClient::new(
        client.clone(),
        config.identity.clone(),
    ));
    tracing::info!(path = %token_store.path().display(), "Token store ready");
    let auth = Arc::new(AuthService::new(identity, token_store));

    // Workbook appends reuse the login's tokens
    let workbook = Arc::new(GraphWorkbookClient::new(client, &config.workbook));
    let tokens: Arc<dyn AccessTokenSource> = auth.clone();
    let appender = Arc::new(SpreadsheetAppender::new(
        workbook,
        tokens,
        config.strategy.clone(),
    ));
    tracing::info!(
        file = %config.workbook.file_name,
        worksheet = %config.workbook.worksheet,
        strategy = ?config.strategy,
        "Workbook appender ready"
    );

    // OCR
    let ocr = TesseractOcr::new(&config.ocr);
    match ocr.version().await {
        Ok(version) => tracing::info!(version = %version, "Tesseract available"),
        Err(e) => tracing::warn!(
            "Tesseract not usable, label fields will be empty: {}",
            e
        ),
    }
    let extractor = Arc::new(RecordExtractor::new(Arc::new(ocr)));

    let state = AppState {
        auth,
        extractor,
        appender,
        upload_dir: Arc::new(config.upload_dir.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, http::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
