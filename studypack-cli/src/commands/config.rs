//! `studypack config` commands - View and manage configuration

use super::truncate;
use anyhow::Result;
use studypack_core::Config;

/// Show current configuration
pub fn show(config: Config) -> Result<()> {
    println!("╭─────────────────────────────────────────╮");
    println!("│        StudyPack Configuration          │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Gemini                                  │");
    println!("│   Binary:       {:<23} │", truncate(&config.gemini.binary, 23));
    println!("│   Model:        {:<23} │", config.gemini.model);
    println!("│   Timeout:      {:<23} │", format!("{}s", config.gemini.timeout_secs));
    println!("│   Max tokens:   {:<23} │", config.gemini.max_tokens);
    println!("├─────────────────────────────────────────┤");
    println!("│ Server                                  │");
    println!("│   URL:          {:<23} │", config.server_url());
    println!(
        "│   Trust proxy:  {:<23} │",
        config.server.trust_proxy_headers
    );
    println!("├─────────────────────────────────────────┤");
    println!("│ Quota                                   │");
    println!("│   Per day:      {:<23} │", config.quota.daily_limit);
    println!(
        "│   Rate:         {:<23} │",
        format!("{} / {}s", config.quota.rate_limit, config.quota.rate_window_secs)
    );
    println!("│   Store:        {:<23} │", config.quota.store.to_string());
    println!("├─────────────────────────────────────────┤");
    println!("│ Generation                              │");
    println!("│   Chunk chars:  {:<23} │", config.generation.max_chunk_chars);
    println!("│   Break after:  {:<23} │", config.generation.min_break_distance);
    println!(
        "│   Charge:       {:<23} │",
        format!("{:?}", config.generation.consume)
    );
    println!("├─────────────────────────────────────────┤");
    println!("│ Logging                                 │");
    println!("│   Level:        {:<23} │", config.logging.level);
    println!("╰─────────────────────────────────────────╯");

    println!("\n📁 Paths:");
    if let Some(path) = Config::default_config_path() {
        println!(
            "   Config:   {} {}",
            path.display(),
            if path.exists() { "✓" } else { "(not created)" }
        );
    }
    if let Some(path) = config.quota.resolved_db_path() {
        println!(
            "   Database: {} {}",
            path.display(),
            if path.exists() { "✓" } else { "(not created)" }
        );
    }

    Ok(())
}

/// Initialize default configuration
pub fn init(force: bool) -> Result<()> {
    let path = Config::default_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    if path.exists() && !force {
        println!(
            "⚠️  Configuration file already exists at: {}",
            path.display()
        );
        println!("   Use --force to overwrite.");
        return Ok(());
    }

    Config::ensure_dirs()?;

    let config = Config::default();
    config.save_to_file(&path)?;

    println!("✅ Created configuration file at: {}", path.display());
    println!("\n📝 Default configuration:");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
