//! Redis implementation of the job store.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, IntoConnectionInfo};
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::Result;
use crate::job::{epoch_seconds, JobPayload};
use crate::store::{queue_key, JobStore, DEAD_CAP, DEAD_KEY, SCHEDULE_KEY};

/// Server-side wait for a blocking pop.
const POLL_WAIT_SECS: f64 = 1.0;
/// Deadline for establishing a connection.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for a single command round-trip.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);
/// Reconnect attempts on a broken connection.
const MAX_RETRIES: usize = 3;
/// Schedule entries examined per promotion sweep.
const PROMOTE_BATCH: isize = 100;

/// Job store backed by a multiplexed Redis connection.
///
/// The connection manager is shared by every task; per-command response
/// timeouts keep one slow call from wedging the rest.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis with the configured endpoint and timeouts.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }
        if config.db != 0 {
            info.redis.db = config.db;
        }

        let client = redis::Client::open(info)?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(DIAL_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT)
            .set_number_of_retries(MAX_RETRIES);
        let conn = ConnectionManager::new_with_config(client, manager_config).await?;

        Ok(Self { conn })
    }

    /// Create a store from an existing connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn poll(&self, queues: &[String]) -> Result<Option<JobPayload>> {
        let keys: Vec<String> = queues.iter().map(|q| queue_key(q)).collect();
        let mut conn = self.conn.clone();

        let popped: Option<(String, String)> = conn.brpop(keys, POLL_WAIT_SECS).await?;
        match popped {
            Some((source, raw)) => {
                let job = JobPayload::from_json(&raw)?;
                tracing::debug!(jid = %job.jid, queue = %source, "popped job");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn schedule_retry(&self, job: &mut JobPayload, delay: Duration) -> Result<()> {
        let now = epoch_seconds();
        job.retry += 1;
        job.failed_at = Some(now);

        let encoded = job.to_json()?;
        let mut conn = self.conn.clone();

        if delay.is_zero() {
            conn.lpush::<_, _, ()>(queue_key(&job.queue), &encoded).await?;
        } else {
            let score = now + delay.as_secs_f64();
            conn.zadd::<_, _, _, ()>(SCHEDULE_KEY, &encoded, score).await?;
        }

        tracing::debug!(
            jid = %job.jid,
            retry = job.retry,
            delay_secs = delay.as_secs_f64(),
            "scheduled retry"
        );
        Ok(())
    }

    async fn move_to_dead(&self, job: &mut JobPayload) -> Result<()> {
        let now = epoch_seconds();
        job.failed_at = Some(now);

        let encoded = job.to_json()?;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(DEAD_KEY, &encoded, now).await?;

        // Keep only the newest DEAD_CAP entries. Trim failure leaves the
        // record safely stored, so it only warrants a warning.
        if let Err(e) = conn
            .zremrangebyrank::<_, ()>(DEAD_KEY, 0, -(DEAD_CAP + 1))
            .await
        {
            tracing::warn!(error = %e, "failed to trim dead set");
        }

        Ok(())
    }

    async fn promote_scheduled(&self) -> Result<usize> {
        let now = epoch_seconds();
        let mut conn = self.conn.clone();

        let due: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULE_KEY, "-inf", now, 0, PROMOTE_BATCH)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut promoted = 0;
        for raw in due {
            let job = match JobPayload::from_json(&raw) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed schedule entry");
                    continue;
                }
            };

            let mut pipe = redis::pipe();
            pipe.atomic()
                .zrem(SCHEDULE_KEY, &raw)
                .lpush(queue_key(&job.queue), &raw);
            pipe.query_async::<()>(&mut conn).await?;

            tracing::debug!(jid = %job.jid, queue = %job.queue, "promoted scheduled job");
            promoted += 1;
        }

        Ok(promoted)
    }

    async fn queue_size(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(queue_key(queue)).await?;
        Ok(len)
    }

    async fn close(&self) -> Result<()> {
        // The manager multiplexes one connection shared by every clone;
        // the socket itself tears down when the last clone drops.
        tracing::debug!("redis store closed");
        Ok(())
    }
}
