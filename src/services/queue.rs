use chrono::Utc;
use redis::AsyncCommands;
use std::collections::HashMap;

use crate::models::job::{
    JobOptions, JobPayload, JobPriority, JobProgress, JobRecord, JobResult, JobStatus, QueueCounts,
    QueuedJob,
};

const JOB_KEY_PREFIX: &str = "embeddings:jobs:";
const WAITING_KEY: &str = "embeddings:queue:waiting";
const DELAYED_KEY: &str = "embeddings:queue:delayed";
const ACTIVE_KEY: &str = "embeddings:queue:active";
const COMPLETED_KEY: &str = "embeddings:queue:completed";
const FAILED_KEY: &str = "embeddings:queue:failed";
const PAUSED_KEY: &str = "embeddings:queue:paused";

/// Retention: completed jobs kept 1 hour / last 100, failed jobs kept
/// 24 hours / last 500.
const COMPLETED_TTL_SECS: i64 = 3600;
const COMPLETED_KEEP_LAST: isize = 100;
const FAILED_TTL_SECS: i64 = 86_400;
const FAILED_KEEP_LAST: isize = 500;

/// Priority bands dominate enqueue time in the waiting-set score, so a
/// Critical job enqueued later still dequeues before a Background one.
const PRIORITY_BAND: f64 = 1e13;

/// Outcome of failing a job: re-delayed for another attempt, or terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retried { delay_ms: u64 },
    Terminal,
}

/// Redis-backed priority job queue with delayed retries, pause/resume, and
/// capped retention of terminal jobs.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn job_key(id: &str) -> String {
        format!("{JOB_KEY_PREFIX}{id}")
    }

    fn waiting_score(priority: JobPriority, now_ms: i64) -> f64 {
        priority as u64 as f64 * PRIORITY_BAND + now_ms as f64
    }

    /// Enqueue a job. Returns false when a job with the same id already
    /// exists in a non-terminal state (idempotent creation for
    /// deterministic ids). HSETNX on the job hash makes the claim atomic:
    /// of two concurrent creates, exactly one wins.
    pub async fn enqueue(
        &self,
        payload: &JobPayload,
        id: &str,
        priority: JobPriority,
        options: &JobOptions,
    ) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let key = Self::job_key(id);

        let claimed: bool = conn.hset_nx(&key, "id", id).await?;
        if !claimed {
            match self.load_record(&mut conn, id).await? {
                Some(existing)
                    if matches!(existing.status, JobStatus::Completed | JobStatus::Failed) =>
                {
                    // Terminal leftover with the same id: replace it.
                    let _: () = conn.del(&key).await?;
                    let _: () = conn.zrem(COMPLETED_KEY, id).await?;
                    let _: () = conn.zrem(FAILED_KEY, id).await?;
                    let reclaimed: bool = conn.hset_nx(&key, "id", id).await?;
                    if !reclaimed {
                        return Ok(false);
                    }
                }
                // In-flight, or a concurrent create mid-write.
                _ => return Ok(false),
            }
        }

        let now = Utc::now();
        let fields: Vec<(&str, String)> = vec![
            ("payload", serde_json::to_string(payload)?),
            ("status", JobStatus::Waiting.to_string()),
            ("priority", priority.to_string()),
            ("attempts", "0".to_string()),
            ("max_attempts", options.max_attempts.to_string()),
            ("backoff_base_ms", options.backoff_base_ms.to_string()),
            ("created_at", now.to_rfc3339()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        if let Some(requested_by) = &options.requested_by {
            let _: () = conn.hset(&key, "requested_by", requested_by).await?;
        }

        let score = Self::waiting_score(priority, now.timestamp_millis());
        let _: () = conn.zadd(WAITING_KEY, id, score).await?;
        Ok(true)
    }

    /// Dequeue the next job. Promotes due delayed jobs first; returns None
    /// when the queue is paused or empty.
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.conn().await?;

        let paused: bool = conn.exists(PAUSED_KEY).await?;
        if paused {
            return Ok(None);
        }

        self.promote_due(&mut conn).await?;

        let popped: Vec<(String, f64)> = conn.zpopmin(WAITING_KEY, 1).await?;
        let Some((id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let key = Self::job_key(&id);
        let _: () = conn.sadd(ACTIVE_KEY, &id).await?;
        let _: () = conn.hset(&key, "status", JobStatus::Active.to_string()).await?;
        let attempts: u32 = conn.hincr(&key, "attempts", 1).await?;

        match self.load_record(&mut conn, &id).await? {
            Some(record) => Ok(Some(QueuedJob {
                id: record.id,
                payload: record.payload,
                priority: record.priority,
                attempts,
                max_attempts: record.max_attempts,
                created_at: record.created_at,
                requested_by: record.requested_by,
            })),
            // Hash expired between pop and load; skip it.
            None => {
                let _: () = conn.srem(ACTIVE_KEY, &id).await?;
                Ok(None)
            }
        }
    }

    /// Move delayed jobs whose backoff has elapsed back into the waiting set.
    async fn promote_due(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(DELAYED_KEY, "-inf", now_ms, 0, 100)
            .await?;
        for id in due {
            let key = Self::job_key(&id);
            let priority = self.read_priority(conn, &key).await?;
            let _: () = conn.zrem(DELAYED_KEY, &id).await?;
            let _: () = conn
                .hset(&key, "status", JobStatus::Waiting.to_string())
                .await?;
            let _: () = conn
                .zadd(WAITING_KEY, &id, Self::waiting_score(priority, now_ms))
                .await?;
        }
        Ok(())
    }

    async fn read_priority(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> Result<JobPriority, QueueError> {
        let raw: Option<String> = conn.hget(key, "priority").await?;
        Ok(raw
            .and_then(|p| p.parse().ok())
            .unwrap_or(JobPriority::Normal))
    }

    /// Mark a job completed and apply retention trimming.
    pub async fn complete(&self, id: &str, result: &JobResult) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let key = Self::job_key(id);
        let now_ms = Utc::now().timestamp_millis();

        let _: () = conn.srem(ACTIVE_KEY, id).await?;
        let fields: Vec<(&str, String)> = vec![
            ("status", JobStatus::Completed.to_string()),
            ("result", serde_json::to_string(result)?),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.expire(&key, COMPLETED_TTL_SECS).await?;
        let _: () = conn.zadd(COMPLETED_KEY, id, now_ms).await?;

        let cutoff = now_ms - COMPLETED_TTL_SECS * 1000;
        let _: () = conn.zrembyscore(COMPLETED_KEY, "-inf", cutoff).await?;
        let _: () = conn
            .zremrangebyrank(COMPLETED_KEY, 0, -(COMPLETED_KEEP_LAST + 1))
            .await?;
        Ok(())
    }

    /// Fail a job. While attempts remain and the caller allows retry, the
    /// job is re-delayed with exponential backoff; otherwise it becomes
    /// terminal with the error (and any partial result) recorded.
    pub async fn fail(
        &self,
        id: &str,
        error: &str,
        result: Option<&JobResult>,
        allow_retry: bool,
    ) -> Result<FailOutcome, QueueError> {
        let mut conn = self.conn().await?;
        let key = Self::job_key(id);
        let now_ms = Utc::now().timestamp_millis();

        let attempts: u32 = conn
            .hget::<_, _, Option<u32>>(&key, "attempts")
            .await?
            .unwrap_or(0);
        let max_attempts: u32 = conn
            .hget::<_, _, Option<u32>>(&key, "max_attempts")
            .await?
            .unwrap_or(1);
        let backoff_base_ms: u64 = conn
            .hget::<_, _, Option<u64>>(&key, "backoff_base_ms")
            .await?
            .unwrap_or(1000);

        let _: () = conn.srem(ACTIVE_KEY, id).await?;

        if allow_retry && attempts < max_attempts {
            let delay_ms = backoff_base_ms.saturating_mul(1 << attempts.saturating_sub(1).min(16));
            let fields: Vec<(&str, String)> = vec![
                ("status", JobStatus::Delayed.to_string()),
                ("error", error.to_string()),
            ];
            let _: () = conn.hset_multiple(&key, &fields).await?;
            let _: () = conn
                .zadd(DELAYED_KEY, id, now_ms + delay_ms as i64)
                .await?;
            return Ok(FailOutcome::Retried { delay_ms });
        }

        let mut fields: Vec<(&str, String)> = vec![
            ("status", JobStatus::Failed.to_string()),
            ("error", error.to_string()),
        ];
        if let Some(result) = result {
            fields.push(("result", serde_json::to_string(result)?));
        }
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.expire(&key, FAILED_TTL_SECS).await?;
        let _: () = conn.zadd(FAILED_KEY, id, now_ms).await?;

        let cutoff = now_ms - FAILED_TTL_SECS * 1000;
        let _: () = conn.zrembyscore(FAILED_KEY, "-inf", cutoff).await?;
        let _: () = conn
            .zremrangebyrank(FAILED_KEY, 0, -(FAILED_KEEP_LAST + 1))
            .await?;
        Ok(FailOutcome::Terminal)
    }

    /// Re-enqueue a terminally failed job with a fresh attempt budget.
    pub async fn retry(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.zrem(FAILED_KEY, id).await?;
        if removed == 0 {
            return Ok(false);
        }
        let key = Self::job_key(id);
        let priority = self.read_priority(&mut conn, &key).await?;
        let fields: Vec<(&str, String)> = vec![
            ("status", JobStatus::Waiting.to_string()),
            ("attempts", "0".to_string()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.hdel(&key, &["error", "result"]).await?;
        let _: () = conn.persist(&key).await?;
        let _: () = conn
            .zadd(
                WAITING_KEY,
                id,
                Self::waiting_score(priority, Utc::now().timestamp_millis()),
            )
            .await?;
        Ok(true)
    }

    /// Remove a job from every queue structure.
    pub async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let deleted: u64 = conn.del(Self::job_key(id)).await?;
        let _: () = conn.zrem(WAITING_KEY, id).await?;
        let _: () = conn.zrem(DELAYED_KEY, id).await?;
        let _: () = conn.srem(ACTIVE_KEY, id).await?;
        let _: () = conn.zrem(COMPLETED_KEY, id).await?;
        let _: () = conn.zrem(FAILED_KEY, id).await?;
        Ok(deleted > 0)
    }

    /// Stop dequeuing. Queued jobs remain; in-flight jobs finish.
    pub async fn pause(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(PAUSED_KEY, 1).await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(PAUSED_KEY).await?;
        Ok(())
    }

    pub async fn is_paused(&self) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(PAUSED_KEY).await?)
    }

    /// Per-state queue counts.
    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.conn().await?;
        Ok(QueueCounts {
            waiting: conn.zcard(WAITING_KEY).await?,
            active: conn.scard(ACTIVE_KEY).await?,
            completed: conn.zcard(COMPLETED_KEY).await?,
            failed: conn.zcard(FAILED_KEY).await?,
            delayed: conn.zcard(DELAYED_KEY).await?,
        })
    }

    /// Get the current queue depth (waiting + delayed jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let counts = self.counts().await?;
        Ok(counts.waiting + counts.delayed)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.conn().await?;
        self.load_record(&mut conn, id).await
    }

    /// Typed progress for a job; None when absent or malformed.
    pub async fn get_progress(&self, id: &str) -> Result<Option<JobProgress>, QueueError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(Self::job_key(id), "progress").await?;
        Ok(raw.and_then(|p| serde_json::from_str(&p).ok()))
    }

    pub async fn set_progress(&self, id: &str, progress: &JobProgress) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .hset(Self::job_key(id), "progress", serde_json::to_string(progress)?)
            .await?;
        Ok(())
    }

    pub async fn active_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(ACTIVE_KEY).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_record(&mut conn, &id).await? {
                jobs.push(record);
            }
        }
        Ok(jobs)
    }

    /// One page of terminally failed jobs, most recent first.
    pub async fn failed_jobs(
        &self,
        offset: isize,
        limit: isize,
    ) -> Result<Vec<JobRecord>, QueueError> {
        let mut conn = self.conn().await?;
        let stop = offset + limit.max(1) - 1;
        let ids: Vec<String> = conn.zrevrange(FAILED_KEY, offset, stop).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_record(&mut conn, &id).await? {
                jobs.push(record);
            }
        }
        Ok(jobs)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn load_record(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str,
    ) -> Result<Option<JobRecord>, QueueError> {
        let map: HashMap<String, String> = conn.hgetall(Self::job_key(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }

        let payload: JobPayload = match map.get("payload") {
            Some(raw) => serde_json::from_str(raw)?,
            None => return Ok(None),
        };
        let status = map
            .get("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(JobStatus::Waiting);
        let priority = map
            .get("priority")
            .and_then(|p| p.parse().ok())
            .unwrap_or(JobPriority::Normal);
        let created_at = map
            .get("created_at")
            .and_then(|c| chrono::DateTime::parse_from_rfc3339(c).ok())
            .map(|c| c.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(JobRecord {
            id: id.to_string(),
            status,
            payload,
            priority,
            attempts: map.get("attempts").and_then(|a| a.parse().ok()).unwrap_or(0),
            max_attempts: map
                .get("max_attempts")
                .and_then(|a| a.parse().ok())
                .unwrap_or(1),
            created_at,
            requested_by: map.get("requested_by").cloned(),
            progress: map
                .get("progress")
                .and_then(|p| serde_json::from_str(p).ok()),
            result: map.get("result").and_then(|r| serde_json::from_str(r).ok()),
            error: map.get("error").cloned(),
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
