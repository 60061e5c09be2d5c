//! Quota tracking and enforcement.
//!
//! Admission control for generation requests combines a short sliding-window
//! rate limit with a per-day quota, both partitioned by [`ActorKey`].
//! [`UsageTracker`] is implemented by [`InMemoryTracker`] (process-local) and
//! by [`crate::store::SqliteTracker`] (shared database).

use crate::config::{QuotaConfig, QuotaStore};
use crate::model::{ActorKey, UsageSnapshot};
use crate::store::SqliteTracker;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Errors related to quota management
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Rate limit exceeded. Please wait a minute before generating again.")]
    RateLimitExceeded {
        current: u32,
        limit: u32,
        window_secs: u64,
    },

    #[error("Daily limit reached ({used}/{limit}). Try again tomorrow.")]
    DailyLimitReached { used: u32, limit: u32 },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Failed to initialize quota store: {0}")]
    InitializationError(String),
}

/// Limits applied by a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily_limit: u32,
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl QuotaLimits {
    pub fn window_secs(&self) -> u64 {
        self.rate_window.num_seconds().max(0) as u64
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        QuotaLimits::from(&QuotaConfig::default())
    }
}

impl From<&QuotaConfig> for QuotaLimits {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            daily_limit: config.daily_limit,
            rate_limit: config.rate_limit,
            rate_window: Duration::seconds(config.rate_window_secs as i64),
        }
    }
}

/// Calendar day a usage bucket belongs to
pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Admission control keyed by actor.
///
/// The `*_at` methods take the current instant explicitly; the plain methods
/// use the wall clock.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Limits enforced by this tracker
    fn limits(&self) -> QuotaLimits;

    /// Short name of the backing store, for status output
    fn store_name(&self) -> &'static str;

    /// Admit one request into the actor's rate window or refuse it
    async fn check_rate_limit_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError>;

    /// Read today's usage without changing it
    async fn usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError>;

    /// Charge one generation against today's quota
    async fn consume_daily_usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError>;

    async fn check_rate_limit(&self, actor: &ActorKey) -> Result<(), QuotaError> {
        self.check_rate_limit_at(actor, Utc::now()).await
    }

    async fn usage(&self, actor: &ActorKey) -> Result<UsageSnapshot, QuotaError> {
        self.usage_at(actor, Utc::now()).await
    }

    async fn consume_daily_usage(&self, actor: &ActorKey) -> Result<UsageSnapshot, QuotaError> {
        self.consume_daily_usage_at(actor, Utc::now()).await
    }
}

/// Open the tracker selected by the configuration
pub async fn open_tracker(config: &QuotaConfig) -> Result<Arc<dyn UsageTracker>, QuotaError> {
    let limits = QuotaLimits::from(config);
    match config.store {
        QuotaStore::Memory => {
            info!("Using in-memory quota tracker; quotas reset on restart");
            Ok(Arc::new(InMemoryTracker::new(limits)))
        }
        QuotaStore::Sqlite => {
            let path = config.resolved_db_path().ok_or_else(|| {
                QuotaError::InitializationError("Could not determine database path".to_string())
            })?;
            let tracker = SqliteTracker::new(&path, limits).await?;
            Ok(Arc::new(tracker))
        }
    }
}

#[derive(Debug, Default)]
struct RateBucket {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl RateBucket {
    /// Drop timestamps older than the window; one exactly `window` old is kept
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.signed_duration_since(oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Clone)]
struct UsageBucket {
    day: String,
    count: u32,
}

impl UsageBucket {
    fn count_on(&self, day: &str) -> u32 {
        if self.day == day {
            self.count
        } else {
            0
        }
    }
}

/// Process-local tracker.
///
/// Buckets are never removed; stale ones are pruned or ignored on next access.
pub struct InMemoryTracker {
    limits: QuotaLimits,
    rate: Mutex<HashMap<ActorKey, RateBucket>>,
    usage: RwLock<HashMap<ActorKey, UsageBucket>>,
}

impl InMemoryTracker {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            rate: Mutex::new(HashMap::new()),
            usage: RwLock::new(HashMap::new()),
        }
    }

    /// Number of actors with rate state, for diagnostics
    pub async fn tracked_actors(&self) -> usize {
        self.rate.lock().await.len()
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new(QuotaLimits::default())
    }
}

#[async_trait]
impl UsageTracker for InMemoryTracker {
    fn limits(&self) -> QuotaLimits {
        self.limits
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, actor, now), fields(actor = %actor))]
    async fn check_rate_limit_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        let mut rate = self.rate.lock().await;
        let bucket = rate.entry(actor.clone()).or_default();
        bucket.prune(now, self.limits.rate_window);

        let current = bucket.timestamps.len() as u32;
        if current >= self.limits.rate_limit {
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

        bucket.timestamps.push_back(now);
        debug!("Rate check passed: {}/{}", current + 1, self.limits.rate_limit);
        Ok(())
    }

    async fn usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError> {
        let today = day_key(now);
        let usage = self.usage.read().await;
        let used = usage.get(actor).map(|b| b.count_on(&today)).unwrap_or(0);
        Ok(UsageSnapshot::new(used, self.limits.daily_limit))
    }

    #[instrument(skip(self, actor, now), fields(actor = %actor))]
    async fn consume_daily_usage_at(
        &self,
        actor: &ActorKey,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError> {
        let today = day_key(now);
        let mut usage = self.usage.write().await;
        let current = usage.get(actor).map(|b| b.count_on(&today)).unwrap_or(0);

        if current >= self.limits.daily_limit {
            warn!("Daily limit reached: {}/{}", current, self.limits.daily_limit);
            return Err(QuotaError::DailyLimitReached {
                used: current,
                limit: self.limits.daily_limit,
            });
        }

        let next = current + 1;
        usage.insert(
            actor.clone(),
            UsageBucket {
                day: today,
                count: next,
            },
        );
        debug!("Consumed daily usage: {}/{}", next, self.limits.daily_limit);

        Ok(UsageSnapshot::new(next, self.limits.daily_limit))
    }
}
