//! SQLite-backed usage tracker.
//!
//! Keeps rate and daily-usage state in a database so that several processes
//! sharing one file enforce the same limits. Daily consumption is a single
//! conditional UPSERT, so two concurrent requests cannot both take the last
//! slot.

use crate::model::{ActorKey, UsageSnapshot};
use crate::quota::{day_key, QuotaError, QuotaLimits, UsageTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Tracker persisting quota state in SQLite
pub struct SqliteTracker {
    pool: SqlitePool,
    limits: QuotaLimits,
}

impl SqliteTracker {
    /// Open (or create) the database at the given path
    #[instrument(skip_all)]
    pub async fn new(db_path: &Path, limits: QuotaLimits) -> Result<Self, QuotaError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QuotaError::InitializationError(format!("Failed to create directory: {}", e))
            })?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!("Connecting to SQLite database at: {}", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        Self::init_schema(&pool).await?;

        let tracker = Self { pool, limits };
        let removed = tracker.prune_stale_at(Utc::now()).await?;
        info!(
            "SQLite quota tracker ready ({} stale rows pruned)",
            removed
        );

        Ok(tracker)
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), QuotaError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_key TEXT NOT NULL,
                ts_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_rate_actor_ts
            ON rate_events(actor_key, ts_ms)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_usage (
                actor_key TEXT PRIMARY KEY,
                day TEXT NOT NULL,
                count INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete rate events outside the window and usage rows from earlier days.
    ///
    /// Returns the number of rows removed.
    pub async fn prune_stale_at(&self, now: DateTime<Utc>) -> Result<u64, QuotaError> {
        let cutoff = window_cutoff_ms(now, &self.limits);

        let events = sqlx::query("DELETE FROM rate_events WHERE ts_ms < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let days = sqlx::query("DELETE FROM daily_usage WHERE day != ?")
            .bind(day_key(now))
            .execute(&self.pool)
            .await?;

        Ok(events.rows_affected() + days.rows_affected())
    }
}

fn window_cutoff_ms(now: DateTime<Utc>, limits: &QuotaLimits) -> i64 {
    now.timestamp_millis() - limits.rate_window.num_milliseconds()
}

#[async_trait]
impl UsageTracker for SqliteTracker {
    fn limits(&self) -> QuotaLimits {
        self.limits
    }

    fn store_name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, actor, now), fields(actor = %actor))]
    async fn check_rate_limit_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rate_events WHERE actor_key = ? AND ts_ms < ?")
            .bind(actor.as_str())
            .bind(window_cutoff_ms(now, &self.limits))
            .execute(&mut *tx)
            .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rate_events WHERE actor_key = ?")
                .bind(actor.as_str())
                .fetch_one(&mut *tx)
                .await?;
        let current = current as u32;

        if current >= self.limits.rate_limit {
            // The prune above is kept even though the request is refused
            tx.commit().await?;
            warn!(
                "Rate limit exceeded: {}/{} in {}s",
                current,
                self.limits.rate_limit,
                self.limits.window_secs()
            );
            return Err(QuotaError::RateLimitExceeded {
                current,
                limit: self.limits.rate_limit,
                window_secs: self.limits.window_secs(),
            });
        }

        sqlx::query("INSERT INTO rate_events (actor_key, ts_ms) VALUES (?, ?)")
            .bind(actor.as_str())
            .bind(now.timestamp_millis())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Rate check passed: {}/{}", current + 1, self.limits.rate_limit);
        Ok(())
    }

    async fn usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT day, count FROM daily_usage WHERE actor_key = ?")
                .bind(actor.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let today = day_key(now);
        let used = match row {
            Some((day, count)) if day == today => count as u32,
            _ => 0,
        };

        Ok(UsageSnapshot::new(used, self.limits.daily_limit))
    }

    #[instrument(skip(self, actor, now), fields(actor = %actor))]
    async fn consume_daily_usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError> {
        let today = day_key(now);

        // Rows from an earlier day restart at 1; today's row only increments
        // while under the limit, otherwise no row is returned.
        let next: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO daily_usage (actor_key, day, count) VALUES (?, ?, 1)
            ON CONFLICT(actor_key) DO UPDATE SET
                count = CASE WHEN daily_usage.day = excluded.day
                             THEN daily_usage.count + 1 ELSE 1 END,
                day = excluded.day
            WHERE daily_usage.day != excluded.day OR daily_usage.count < ?
            RETURNING count
            "#,
        )
        .bind(actor.as_str())
        .bind(&today)
        .bind(self.limits.daily_limit as i64)
        .fetch_optional(&self.pool)
        .await?;

        match next {
            Some(count) if count as u32 <= self.limits.daily_limit => {
                let count = count as u32;
                debug!("Consumed daily usage: {}/{}", count, self.limits.daily_limit);
                Ok(UsageSnapshot::new(count, self.limits.daily_limit))
            }
            _ => {
                let used = self.usage_at(actor, now).await?.used_today;
                warn!("Daily limit reached: {}/{}", used, self.limits.daily_limit);
                Err(QuotaError::DailyLimitReached {
                    used,
                    limit: self.limits.daily_limit,
                })
            }
        }
    }
}
