//! `studypack serve` command - Run the HTTP API

use super::build_generator;
use anyhow::Result;
use std::sync::Arc;
use studypack_core::{server, Config, GeminiClient};
use tracing::{info, warn};

pub async fn run(config: Config) -> Result<()> {
    let generator = build_generator(&config, &config.quota).await?;

    match GeminiClient::from_config(&config.gemini).version().await {
        Ok(version) => info!("Gemini CLI {} ({})", version, config.gemini.model),
        Err(e) => {
            warn!("Gemini CLI version check failed: {}", e);
            eprintln!(
                "⚠️  Warning: Gemini CLI not found at '{}'",
                config.gemini.binary
            );
            eprintln!("   Make sure it's installed and in your PATH.");
            eprintln!("   Install: npm install -g @google/gemini-cli");
        }
    }

    info!(
        "Quota: {} per day, {} per {}s, store={}",
        config.quota.daily_limit,
        config.quota.rate_limit,
        config.quota.rate_window_secs,
        config.quota.store
    );

    println!("🚀 StudyPack server starting on {}", config.server_url());
    println!("   Generate:  POST {}/v1/study-pack", config.server_url());
    println!("   Usage:     GET  {}/v1/usage", config.server_url());
    println!("   OpenAPI:   GET  {}/openapi.json", config.server_url());
    if config.server.trust_proxy_headers {
        println!("   Callers keyed by x-user-id / x-forwarded-for (trust_proxy_headers)");
    }
    println!("   Press Ctrl+C to stop");

    let state = Arc::new(server::AppState::new(generator, config));
    server::start_server(state).await?;

    Ok(())
}
