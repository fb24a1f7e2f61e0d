//! Process-local throttle store. State is lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{
    check_bucket, truncate_to_hour, BucketDecision, PurgeStats, SuppressionEntry, ThrottleBucket,
    ThrottleLimits, ThrottleStore,
};
use crate::error::ThrottleError;

#[derive(Default)]
struct State {
    buckets: HashMap<(String, DateTime<Utc>), ThrottleBucket>,
    suppressions: HashMap<(String, String), SuppressionEntry>,
}

/// In-memory [`ThrottleStore`]. One lock guards all keys, so every
/// check-and-increment is atomic.
#[derive(Default)]
pub struct MemoryThrottleStore {
    state: Mutex<State>,
}

impl MemoryThrottleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ThrottleError> {
        self.state
            .lock()
            .map_err(|_| ThrottleError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ThrottleStore for MemoryThrottleStore {
    async fn active_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>, ThrottleError> {
        let state = self.state()?;
        Ok(state
            .suppressions
            .get(&(policy_id.to_string(), suppression_key.to_string()))
            .filter(|entry| entry.is_active(now))
            .cloned())
    }

    async fn try_record_alert(
        &self,
        policy_id: &str,
        limits: &ThrottleLimits,
        now: DateTime<Utc>,
    ) -> Result<BucketDecision, ThrottleError> {
        let hour_start = truncate_to_hour(now);
        let mut state = self.state()?;
        let key = (policy_id.to_string(), hour_start);

        if let Some(denied) = check_bucket(state.buckets.get(&key), limits, now) {
            return Ok(denied);
        }

        let bucket = state.buckets.entry(key).or_insert_with(|| ThrottleBucket {
            policy_id: policy_id.to_string(),
            hour_start,
            alert_count: 0,
            last_alert_at: None,
        });
        bucket.alert_count += 1;
        bucket.last_alert_at = Some(now);
        Ok(BucketDecision::Recorded {
            alert_count: bucket.alert_count,
        })
    }

    async fn upsert_suppression(&self, entry: &SuppressionEntry) -> Result<(), ThrottleError> {
        let mut state = self.state()?;
        state.suppressions.insert(
            (entry.policy_id.clone(), entry.suppression_key.clone()),
            entry.clone(),
        );
        Ok(())
    }

    async fn remove_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
    ) -> Result<bool, ThrottleError> {
        let mut state = self.state()?;
        Ok(state
            .suppressions
            .remove(&(policy_id.to_string(), suppression_key.to_string()))
            .is_some())
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        bucket_cutoff: DateTime<Utc>,
    ) -> Result<PurgeStats, ThrottleError> {
        let mut state = self.state()?;
        let suppressions_before = state.suppressions.len();
        state.suppressions.retain(|_, entry| entry.is_active(now));
        let buckets_before = state.buckets.len();
        state.buckets.retain(|(_, hour), _| *hour >= bucket_cutoff);
        Ok(PurgeStats {
            suppressions: (suppressions_before - state.suppressions.len()) as u64,
            buckets: (buckets_before - state.buckets.len()) as u64,
        })
    }

    async fn bucket(
        &self,
        policy_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<ThrottleBucket>, ThrottleError> {
        let state = self.state()?;
        Ok(state
            .buckets
            .get(&(policy_id.to_string(), hour_start))
            .cloned())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
