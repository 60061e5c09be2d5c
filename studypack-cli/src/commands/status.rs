//! `studypack status` command - Check a running server

use anyhow::Result;
use studypack_core::{Config, HealthResponse, UsageSnapshot};

pub async fn run(config: Config) -> Result<()> {
    let url = format!("{}/health", config.server_url());

    println!("Checking StudyPack server status...");
    println!("URL: {}", url);

    let response = match reqwest::get(&url).await {
        Ok(response) => response,
        Err(_) => {
            println!("\n❌ StudyPack server is not running");
            println!("   Start it with: studypack serve");
            return Ok(());
        }
    };

    if !response.status().is_success() {
        println!(
            "\n⚠️  StudyPack server responded with status: {}",
            response.status()
        );
        return Ok(());
    }

    let health: HealthResponse = response.json().await?;

    println!("\n✅ StudyPack server is running");
    println!("   Status:          {}", health.status);
    println!("   Version:         {}", health.version);
    println!("   Quota store:     {}", health.quota_store);
    println!(
        "   Gemini CLI:      {}",
        if health.completion_available {
            "available ✓"
        } else {
            "not available ⚠"
        }
    );

    let usage_url = format!("{}/v1/usage", config.server_url());
    if let Ok(usage_response) = reqwest::get(&usage_url).await {
        if let Ok(usage) = usage_response.json::<UsageSnapshot>().await {
            println!("\n📊 Usage (this machine):");
            println!("   Today:     {}/{}", usage.used_today, usage.daily_limit);
            println!("   Remaining: {}", usage.remaining_today);
        }
    }

    Ok(())
}
