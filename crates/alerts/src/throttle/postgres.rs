//! PostgreSQL throttle store over the `alert_throttle_buckets` and
//! `alert_suppressions` tables.
//!
//! The bucket check-and-increment is one conditional upsert, so the
//! database row lock serializes concurrent writers on the same key.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use watchpost_core::config::PostgresConfig;

use super::{
    check_bucket, truncate_to_hour, BucketDecision, PurgeStats, SuppressionEntry, ThrottleBucket,
    ThrottleLimits, ThrottleStore,
};
use crate::error::ThrottleError;

const RECORD_ALERT: &str = "
    INSERT INTO alert_throttle_buckets (policy_id, hour_start, alert_count, last_alert_at)
    VALUES ($1, $2, 1, $3)
    ON CONFLICT (policy_id, hour_start) DO UPDATE
    SET alert_count = alert_throttle_buckets.alert_count + 1,
        last_alert_at = EXCLUDED.last_alert_at
    WHERE alert_throttle_buckets.alert_count < $4
      AND ($5 = 0
           OR alert_throttle_buckets.last_alert_at IS NULL
           OR alert_throttle_buckets.last_alert_at <= $3 - make_interval(mins => $5))
    RETURNING alert_count";

#[derive(sqlx::FromRow)]
struct BucketRow {
    policy_id: String,
    hour_start: DateTime<Utc>,
    alert_count: i32,
    last_alert_at: Option<DateTime<Utc>>,
}

impl From<BucketRow> for ThrottleBucket {
    fn from(row: BucketRow) -> Self {
        Self {
            policy_id: row.policy_id,
            hour_start: row.hour_start,
            alert_count: u32::try_from(row.alert_count).unwrap_or(0),
            last_alert_at: row.last_alert_at,
        }
    }
}

/// [`ThrottleStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgThrottleStore {
    pool: PgPool,
}

impl PgThrottleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with `config` and apply pending migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, ThrottleError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!(host = %config.host, db = %config.database, "PostgreSQL connected");
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Throttle migrations applied");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[async_trait::async_trait]
impl ThrottleStore for PgThrottleStore {
    async fn active_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>, ThrottleError> {
        let entry = sqlx::query_as::<_, SuppressionEntry>(
            "SELECT policy_id, suppression_key, suppressed_until, reason, created_at
             FROM alert_suppressions
             WHERE policy_id = $1 AND suppression_key = $2 AND suppressed_until > $3",
        )
        .bind(policy_id)
        .bind(suppression_key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn try_record_alert(
        &self,
        policy_id: &str,
        limits: &ThrottleLimits,
        now: DateTime<Utc>,
    ) -> Result<BucketDecision, ThrottleError> {
        if limits.max_alerts_per_hour == 0 {
            return Ok(BucketDecision::RateCapped { alert_count: 0 });
        }
        let hour_start = truncate_to_hour(now);

        let recorded: Option<(i32,)> = sqlx::query_as(RECORD_ALERT)
            .bind(policy_id)
            .bind(hour_start)
            .bind(now)
            .bind(to_i32(limits.max_alerts_per_hour))
            .bind(to_i32(limits.throttle_minutes))
            .fetch_optional(&self.pool)
            .await?;

        if let Some((alert_count,)) = recorded {
            return Ok(BucketDecision::Recorded {
                alert_count: u32::try_from(alert_count).unwrap_or(0),
            });
        }

        // The upsert declined; read the row only to report why.
        let bucket = self.bucket(policy_id, hour_start).await?;
        check_bucket(bucket.as_ref(), limits, now).ok_or_else(|| {
            ThrottleError::Unavailable(format!(
                "bucket for '{policy_id}' at {hour_start} changed during update"
            ))
        })
    }

    async fn upsert_suppression(&self, entry: &SuppressionEntry) -> Result<(), ThrottleError> {
        sqlx::query(
            "INSERT INTO alert_suppressions
                 (policy_id, suppression_key, suppressed_until, reason, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (policy_id, suppression_key) DO UPDATE
             SET suppressed_until = EXCLUDED.suppressed_until,
                 reason = EXCLUDED.reason,
                 created_at = EXCLUDED.created_at",
        )
        .bind(&entry.policy_id)
        .bind(&entry.suppression_key)
        .bind(entry.suppressed_until)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_suppression(
        &self,
        policy_id: &str,
        suppression_key: &str,
    ) -> Result<bool, ThrottleError> {
        let result = sqlx::query(
            "DELETE FROM alert_suppressions WHERE policy_id = $1 AND suppression_key = $2",
        )
        .bind(policy_id)
        .bind(suppression_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        bucket_cutoff: DateTime<Utc>,
    ) -> Result<PurgeStats, ThrottleError> {
        let suppressions = sqlx::query("DELETE FROM alert_suppressions WHERE suppressed_until <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        let buckets = sqlx::query("DELETE FROM alert_throttle_buckets WHERE hour_start < $1")
            .bind(bucket_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(PurgeStats {
            suppressions,
            buckets,
        })
    }

    async fn bucket(
        &self,
        policy_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<ThrottleBucket>, ThrottleError> {
        let row = sqlx::query_as::<_, BucketRow>(
            "SELECT policy_id, hour_start, alert_count, last_alert_at
             FROM alert_throttle_buckets
             WHERE policy_id = $1 AND hour_start = $2",
        )
        .bind(policy_id)
        .bind(hour_start)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ThrottleBucket::from))
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
