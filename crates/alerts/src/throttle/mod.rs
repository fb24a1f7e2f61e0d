//! Per-policy hourly alert caps, minimum alert gaps, and keyed suppression
//! windows.
//!
//! State lives behind the [`ThrottleStore`] trait. The check-and-increment
//! on a `(policy_id, hour_start)` bucket is a single store operation
//! ([`ThrottleStore::try_record_alert`]) so concurrent callers can never
//! push a bucket past its cap.

mod memory;
mod postgres;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use watchpost_core::config::{FailMode, ThrottleConfig};

use crate::error::ThrottleError;

pub use memory::MemoryThrottleStore;
pub use postgres::PgThrottleStore;

/// Throttle settings carried on a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleLimits {
    /// Minimum gap between two alerts of the same policy. `0` disables it.
    pub throttle_minutes: u32,
    pub max_alerts_per_hour: u32,
}

/// Alert counter for one policy within one clock hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleBucket {
    pub policy_id: String,
    /// Always on an hour boundary.
    pub hour_start: DateTime<Utc>,
    pub alert_count: u32,
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// Alerts for `(policy_id, suppression_key)` are withheld until
/// `suppressed_until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SuppressionEntry {
    pub policy_id: String,
    pub suppression_key: String,
    pub suppressed_until: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SuppressionEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.suppressed_until > now
    }
}

/// Outcome of the atomic bucket check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketDecision {
    /// Alert counted; `alert_count` is the new total for the hour.
    Recorded { alert_count: u32 },
    RateCapped { alert_count: u32 },
    Throttled { last_alert_at: DateTime<Utc> },
}

/// Rows removed by a purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub suppressions: u64,
    pub buckets: u64,
}

/// Persistence for buckets and suppression entries.
///
/// Implementations must make `try_record_alert` atomic per
/// `(policy_id, hour_start)` key.
#[async_trait::async_trait]
pub trait ThrottleStore: Send + Sync {
    /// The suppression for this key if it is still active at `now`.
    async fn active_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>, ThrottleError>;

    /// Check the bucket for `now`'s hour against `limits` and, if allowed,
    /// increment it and set `last_alert_at = now`.
    async fn try_record_alert(
        &self,
        policy_id: &str,
        limits: &ThrottleLimits,
        now: DateTime<Utc>,
    ) -> Result<BucketDecision, ThrottleError>;

    /// Create or replace the suppression for `(policy_id, suppression_key)`.
    async fn upsert_suppression(&self, entry: &SuppressionEntry) -> Result<(), ThrottleError>;

    /// Returns whether an entry was removed.
    async fn remove_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
    ) -> Result<bool, ThrottleError>;

    /// Remove suppressions that ended at or before `now` and buckets whose
    /// hour started before `bucket_cutoff`.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        bucket_cutoff: DateTime<Utc>,
    ) -> Result<PurgeStats, ThrottleError>;

    async fn bucket(
        &self,
        policy_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<ThrottleBucket>, ThrottleError>;

    /// Short backend name for logs (e.g. `"memory"`, `"postgres"`).
    fn backend_name(&self) -> &str;
}

/// Top of the clock hour containing `ts`.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp().div_euclid(3600) * 3600;
    DateTime::from_timestamp(secs, 0).unwrap_or(ts)
}

/// Cap and gap checks against the current bucket. `None` means the alert
/// may be recorded.
pub(crate) fn check_bucket(
    bucket: Option<&ThrottleBucket>,
    limits: &ThrottleLimits,
    now: DateTime<Utc>,
) -> Option<BucketDecision> {
    let alert_count = bucket.map(|b| b.alert_count).unwrap_or(0);
    if alert_count >= limits.max_alerts_per_hour {
        return Some(BucketDecision::RateCapped { alert_count });
    }
    let last_alert_at = bucket.and_then(|b| b.last_alert_at)?;
    if limits.throttle_minutes > 0
        && now - last_alert_at < Duration::minutes(i64::from(limits.throttle_minutes))
    {
        return Some(BucketDecision::Throttled { last_alert_at });
    }
    None
}

/// Answer of [`ThrottleManager::should_emit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EmitDecision {
    Emit { alert_count: u32 },
    Suppressed { until: DateTime<Utc> },
    RateCapped { alert_count: u32 },
    Throttled { last_alert_at: DateTime<Utc> },
    /// The store failed or timed out; `allowed` follows the fail mode.
    StoreUnavailable { reason: String, allowed: bool },
}

impl EmitDecision {
    pub fn allowed(&self) -> bool {
        matches!(
            self,
            EmitDecision::Emit { .. } | EmitDecision::StoreUnavailable { allowed: true, .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            EmitDecision::Emit { .. } => "emit",
            EmitDecision::Suppressed { .. } => "suppressed",
            EmitDecision::RateCapped { .. } => "rate_capped",
            EmitDecision::Throttled { .. } => "throttled",
            EmitDecision::StoreUnavailable { .. } => "store_unavailable",
        }
    }
}

/// Decides whether a matched policy may raise an alert now.
#[derive(Clone)]
pub struct ThrottleManager {
    store: Arc<dyn ThrottleStore>,
    config: ThrottleConfig,
}

impl ThrottleManager {
    pub fn new(store: Arc<dyn ThrottleStore>, config: ThrottleConfig) -> Self {
        Self { store, config }
    }

    /// Manager over a fresh process-local store.
    pub fn in_memory(config: ThrottleConfig) -> Self {
        Self::new(Arc::new(MemoryThrottleStore::new()), config)
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Suppression first, then the hourly cap and minimum gap. Only an
    /// [`EmitDecision::Emit`] consumes a slot in the hour's bucket.
    pub async fn should_emit(
        &self,
        policy_id: &str,
        suppression_key: &str,
        limits: &ThrottleLimits,
        now: DateTime<Utc>,
    ) -> EmitDecision {
        match self.check(policy_id, suppression_key, limits, now).await {
            Ok(decision) => {
                debug!(
                    policy_id,
                    suppression_key,
                    decision = decision.label(),
                    "throttle decision"
                );
                decision
            }
            Err(e) => {
                let allowed = self.config.fail_mode == FailMode::Open;
                warn!(
                    policy_id,
                    backend = self.store.backend_name(),
                    fail_mode = %self.config.fail_mode,
                    error = %e,
                    "throttle store unavailable"
                );
                EmitDecision::StoreUnavailable {
                    reason: e.to_string(),
                    allowed,
                }
            }
        }
    }

    async fn check(
        &self,
        policy_id: &str,
        suppression_key: &str,
        limits: &ThrottleLimits,
        now: DateTime<Utc>,
    ) -> Result<EmitDecision, ThrottleError> {
        let suppression = self
            .timed(self.store.active_suppression(policy_id, suppression_key, now))
            .await?;
        if let Some(entry) = suppression {
            return Ok(EmitDecision::Suppressed {
                until: entry.suppressed_until,
            });
        }

        let decision = self
            .timed(self.store.try_record_alert(policy_id, limits, now))
            .await?;
        Ok(match decision {
            BucketDecision::Recorded { alert_count } => EmitDecision::Emit { alert_count },
            BucketDecision::RateCapped { alert_count } => EmitDecision::RateCapped { alert_count },
            BucketDecision::Throttled { last_alert_at } => EmitDecision::Throttled { last_alert_at },
        })
    }

    /// Withhold alerts for `(policy_id, suppression_key)` until `until`.
    /// Replaces any existing window for the key.
    pub async fn suppress(
        &self,
        policy_id: &str,
        suppression_key: &str,
        until: DateTime<Utc>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry, ThrottleError> {
        if until <= now {
            return Err(ThrottleError::InvalidWindow(format!(
                "suppressed_until {until} is not after {now}"
            )));
        }
        let entry = SuppressionEntry {
            policy_id: policy_id.to_string(),
            suppression_key: suppression_key.to_string(),
            suppressed_until: until,
            reason,
            created_at: now,
        };
        self.timed(self.store.upsert_suppression(&entry)).await?;
        tracing::info!(policy_id, suppression_key, %until, "suppression window set");
        Ok(entry)
    }

    pub async fn lift_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
    ) -> Result<bool, ThrottleError> {
        let removed = self
            .timed(self.store.remove_suppression(policy_id, suppression_key))
            .await?;
        if removed {
            tracing::info!(policy_id, suppression_key, "suppression lifted");
        }
        Ok(removed)
    }

    /// Drop ended suppressions and buckets older than the retention window.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeStats, ThrottleError> {
        let cutoff =
            truncate_to_hour(now) - Duration::hours(i64::from(self.config.bucket_retention_hours));
        let stats = self.timed(self.store.purge_expired(now, cutoff)).await?;
        debug!(
            suppressions = stats.suppressions,
            buckets = stats.buckets,
            "purged expired throttle state"
        );
        Ok(stats)
    }

    /// The bucket covering `at`, if any alert was recorded in that hour.
    pub async fn bucket(
        &self,
        policy_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ThrottleBucket>, ThrottleError> {
        self.timed(self.store.bucket(policy_id, truncate_to_hour(at))).await
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, ThrottleError>>,
    ) -> Result<T, ThrottleError> {
        match tokio::time::timeout(self.config.store_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(ThrottleError::Timeout(self.config.store_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests;
