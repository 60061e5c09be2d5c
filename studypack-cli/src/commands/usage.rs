//! `studypack usage` command - Show today's generation count

use super::{build_generator, local_actor, local_quota, truncate};
use anyhow::Result;
use studypack_core::Config;

pub async fn run(config: Config, user: Option<String>, json_output: bool) -> Result<()> {
    let quota = local_quota(&config);
    let generator = build_generator(&config, &quota).await?;
    let actor = local_actor(user.as_deref());
    let usage = generator.usage(&actor).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }

    let pct = if usage.daily_limit == 0 {
        100.0
    } else {
        (usage.used_today as f64 / usage.daily_limit as f64 * 100.0).min(100.0)
    };

    println!("╭─────────────────────────────────────────╮");
    println!("│         StudyPack Daily Usage           │");
    println!("├─────────────────────────────────────────┤");
    println!("│  Actor:        {:<24} │", truncate(actor.as_str(), 24));
    println!(
        "│  Used today:   {:>6} / {:<6}          │",
        usage.used_today, usage.daily_limit
    );
    println!("│  Remaining:    {:>6}                   │", usage.remaining_today);
    println!("│  Store:        {:<24} │", quota.store.to_string());
    println!("╰─────────────────────────────────────────╯");
    println!("\nDaily:  {}", progress_bar(pct, 30));

    Ok(())
}

fn progress_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage / 100.0) * width as f64) as usize;
    let empty = width.saturating_sub(filled);

    let marker = if percentage >= 90.0 {
        "🔴"
    } else if percentage >= 70.0 {
        "🟡"
    } else {
        "🟢"
    };

    format!(
        "[{}{}] {:>5.1}% {}",
        "█".repeat(filled),
        "░".repeat(empty),
        percentage,
        marker
    )
}
