//! Tests for the throttle manager over the in-memory store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use super::*;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

fn limits(throttle_minutes: u32, max_alerts_per_hour: u32) -> ThrottleLimits {
    ThrottleLimits {
        throttle_minutes,
        max_alerts_per_hour,
    }
}

fn manager() -> ThrottleManager {
    ThrottleManager::in_memory(ThrottleConfig::default())
}

/// Store whose every call fails (or never returns).
struct BrokenStore {
    hang: bool,
}

impl BrokenStore {
    async fn fail<T>(&self) -> Result<T, ThrottleError> {
        if self.hang {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        Err(ThrottleError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait::async_trait]
impl ThrottleStore for BrokenStore {
    async fn active_suppression(
        &self,
        _policy_id: &str,
        _suppression_key: &str,
        _now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>, ThrottleError> {
        self.fail().await
    }
    async fn try_record_alert(
        &self,
        _policy_id: &str,
        _limits: &ThrottleLimits,
        _now: DateTime<Utc>,
    ) -> Result<BucketDecision, ThrottleError> {
        self.fail().await
    }
    async fn upsert_suppression(&self, _entry: &SuppressionEntry) -> Result<(), ThrottleError> {
        self.fail().await
    }
    async fn remove_suppression(&self, _policy_id: &str, _key: &str) -> Result<bool, ThrottleError> {
        self.fail().await
    }
    async fn purge_expired(
        &self,
        _now: DateTime<Utc>,
        _cutoff: DateTime<Utc>,
    ) -> Result<PurgeStats, ThrottleError> {
        self.fail().await
    }
    async fn bucket(
        &self,
        _policy_id: &str,
        _hour_start: DateTime<Utc>,
    ) -> Result<Option<ThrottleBucket>, ThrottleError> {
        self.fail().await
    }
    fn backend_name(&self) -> &str {
        "broken"
    }
}

#[test]
fn truncates_to_hour() {
    let ts = Utc.with_ymd_and_hms(2026, 3, 2, 10, 59, 59).unwrap();
    assert_eq!(truncate_to_hour(ts), at(10, 0));
    assert_eq!(truncate_to_hour(at(11, 0)), at(11, 0));
}

#[tokio::test]
async fn hourly_cap_resets_on_next_hour() {
    let m = manager();
    let l = limits(0, 2);

    assert!(m.should_emit("p1", "k", &l, at(10, 5)).await.allowed());
    assert!(m.should_emit("p1", "k", &l, at(10, 30)).await.allowed());
    assert_eq!(
        m.should_emit("p1", "k", &l, at(10, 55)).await,
        EmitDecision::RateCapped { alert_count: 2 }
    );
    assert_eq!(
        m.should_emit("p1", "k", &l, at(11, 5)).await,
        EmitDecision::Emit { alert_count: 1 }
    );

    let old = m.bucket("p1", at(10, 59)).await.unwrap().unwrap();
    assert_eq!(old.hour_start, at(10, 0));
    assert_eq!(old.alert_count, 2);
    assert_eq!(old.last_alert_at, Some(at(10, 30)));
}

#[tokio::test]
async fn suppression_blocks_until_window_ends() {
    let m = manager();
    let l = limits(0, 100);
    let now = at(10, 0);
    m.suppress("p1", "host-a", now + Duration::minutes(10), Some("maintenance".into()), now)
        .await
        .unwrap();

    assert_eq!(
        m.should_emit("p1", "host-a", &l, now).await,
        EmitDecision::Suppressed {
            until: at(10, 10)
        }
    );
    // other keys and policies are unaffected
    assert!(m.should_emit("p1", "host-b", &l, now).await.allowed());
    assert!(m.should_emit("p2", "host-a", &l, now).await.allowed());
    // the window end is exclusive
    assert!(m.should_emit("p1", "host-a", &l, at(10, 10)).await.allowed());
}

#[tokio::test]
async fn suppressed_alerts_do_not_consume_the_cap() {
    let m = manager();
    let l = limits(0, 1);
    let now = at(9, 0);
    m.suppress("p1", "k", at(9, 30), None, now).await.unwrap();
    assert!(!m.should_emit("p1", "k", &l, at(9, 10)).await.allowed());
    assert!(m.bucket("p1", now).await.unwrap().is_none());
    assert!(m.should_emit("p1", "k", &l, at(9, 40)).await.allowed());
}

#[tokio::test]
async fn minimum_gap_between_alerts() {
    let m = manager();
    let l = limits(15, 10);

    assert!(m.should_emit("p1", "k", &l, at(10, 0)).await.allowed());
    assert_eq!(
        m.should_emit("p1", "k", &l, at(10, 14)).await,
        EmitDecision::Throttled {
            last_alert_at: at(10, 0)
        }
    );
    assert!(m.should_emit("p1", "k", &l, at(10, 15)).await.allowed());
    assert!(m.should_emit("p1", "k", &l, at(10, 55)).await.allowed());
    // the gap is tracked per hourly bucket
    assert!(m.should_emit("p1", "k", &l, at(11, 1)).await.allowed());
}

#[tokio::test]
async fn zero_cap_never_emits() {
    let m = manager();
    assert_eq!(
        m.should_emit("p1", "k", &limits(0, 0), at(10, 0)).await,
        EmitDecision::RateCapped { alert_count: 0 }
    );
}

#[tokio::test]
async fn suppression_window_must_end_in_future() {
    let m = manager();
    let now = at(10, 0);
    assert!(matches!(
        m.suppress("p1", "k", now, None, now).await,
        Err(ThrottleError::InvalidWindow(_))
    ));
}

#[tokio::test]
async fn lift_and_purge() {
    let m = manager();
    let l = limits(0, 10);
    let now = at(10, 0);
    m.suppress("p1", "a", at(10, 5), None, now).await.unwrap();
    m.suppress("p1", "b", at(12, 0), None, now).await.unwrap();
    m.should_emit("p1", "x", &l, at(7, 30)).await;
    m.should_emit("p1", "x", &l, at(10, 30)).await;

    assert!(m.lift_suppression("p1", "b").await.unwrap());
    assert!(!m.lift_suppression("p1", "b").await.unwrap());

    // 48h retention keeps both buckets; the 10:05 window has ended
    let stats = m.purge_expired(at(10, 6)).await.unwrap();
    assert_eq!(stats, PurgeStats { suppressions: 1, buckets: 0 });

    let short = ThrottleManager::new(
        Arc::new(MemoryThrottleStore::new()),
        ThrottleConfig {
            bucket_retention_hours: 1,
            ..ThrottleConfig::default()
        },
    );
    short.should_emit("p1", "x", &l, at(7, 30)).await;
    short.should_emit("p1", "x", &l, at(10, 30)).await;
    let stats = short.purge_expired(at(10, 45)).await.unwrap();
    assert_eq!(stats.buckets, 1);
    assert!(short.bucket("p1", at(10, 30)).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_callers_never_exceed_cap() {
    let m = manager();
    let l = limits(0, 5);
    let now = at(10, 0);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let m = m.clone();
            tokio::spawn(async move { m.should_emit("p1", "k", &l, now).await })
        })
        .collect();

    let mut emitted = 0;
    for h in handles {
        if h.await.unwrap().allowed() {
            emitted += 1;
        }
    }
    assert_eq!(emitted, 5);
    assert_eq!(m.bucket("p1", now).await.unwrap().unwrap().alert_count, 5);
}

#[tokio::test]
async fn store_failure_follows_fail_mode() {
    let closed = ThrottleManager::new(Arc::new(BrokenStore { hang: false }), ThrottleConfig::default());
    let decision = closed.should_emit("p1", "k", &limits(0, 10), at(10, 0)).await;
    assert!(matches!(decision, EmitDecision::StoreUnavailable { allowed: false, .. }));
    assert!(!decision.allowed());

    let open = ThrottleManager::new(
        Arc::new(BrokenStore { hang: false }),
        ThrottleConfig {
            fail_mode: FailMode::Open,
            ..ThrottleConfig::default()
        },
    );
    assert!(open.should_emit("p1", "k", &limits(0, 10), at(10, 0)).await.allowed());
}

#[tokio::test]
async fn slow_store_times_out() {
    let m = ThrottleManager::new(
        Arc::new(BrokenStore { hang: true }),
        ThrottleConfig {
            store_timeout_ms: 20,
            ..ThrottleConfig::default()
        },
    );
    match m.should_emit("p1", "k", &limits(0, 10), at(10, 0)).await {
        EmitDecision::StoreUnavailable { reason, allowed } => {
            assert!(!allowed);
            assert!(reason.contains("timed out"));
        }
        other => panic!("unexpected decision: {other:?}"),
    }
    assert!(matches!(m.purge_expired(at(10, 0)).await, Err(ThrottleError::Timeout(20))));
}
