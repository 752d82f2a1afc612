//! Redis Streams event source (durable, at-least-once delivery).
//!
//! - **Consumer group**: every replica instance joins one group, so each entry
//!   is handled by one consumer
//! - **Ack on success**: entries are XACK'd only after the handler returns `Ok`;
//!   failed entries stay pending
//! - **Redelivery**: pending entries idle longer than `claim_idle` are XCLAIM'd
//!   and handled again. The pending scan uses `XPENDING ... IDLE`, so entries
//!   still in flight never hide stale ones behind them (Redis 6.2+)
//! - **Dead-letter stream**: entries delivered `max_deliveries` times are copied
//!   to `<stream>:dlq` and acknowledged
//!
//! Each stream entry carries the raw event envelope bytes in a `payload` field.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId, StreamReadOptions,
    StreamReadReply,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use authreplica_events::MessageHandler;

use crate::workers::WorkerHandle;

/// Stream entry field holding the envelope bytes.
pub const PAYLOAD_FIELD: &str = "payload";

const DEFAULT_MAX_DELIVERIES: usize = 5;
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);
const DEFAULT_BLOCK: Duration = Duration::from_secs(2);
const DEFAULT_BATCH: usize = 10;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

/// Where and how to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisStreamsConfig {
    /// Stream key; doubles as the topic handed to the message handler.
    pub stream_key: String,
    pub group: String,
    pub consumer: String,
    pub dlq_key: String,
    pub max_deliveries: usize,
    pub claim_idle: Duration,
    pub block: Duration,
    pub batch: usize,
}

impl RedisStreamsConfig {
    pub fn new(stream_key: impl Into<String>, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        let stream_key = stream_key.into();
        Self {
            dlq_key: format!("{stream_key}:dlq"),
            stream_key,
            group: group.into(),
            consumer: consumer.into(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            claim_idle: DEFAULT_CLAIM_IDLE,
            block: DEFAULT_BLOCK,
            batch: DEFAULT_BATCH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisStreamsSource {
    client: redis::Client,
    config: RedisStreamsConfig,
}

impl RedisStreamsSource {
    pub fn new(redis_url: impl AsRef<str>, config: RedisStreamsConfig) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RedisStreamsConfig {
        &self.config
    }

    async fn connect(&self) -> Result<MultiplexedConnection, RedisStreamsError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Ensure the consumer group exists (idempotent).
    pub async fn ensure_consumer_group(&self) -> Result<(), RedisStreamsError> {
        let mut conn = self.connect().await?;
        self.ensure_group_on(&mut conn).await
    }

    async fn ensure_group_on(&self, conn: &mut MultiplexedConnection) -> Result<(), RedisStreamsError> {
        // "0": a fresh group starts from the beginning of the stream.
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream_key, &self.config.group, "0")
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::ConsumerGroup(e.to_string())),
        }
    }

    /// Consume the stream on a background task until shut down.
    pub fn spawn<H>(self, name: &'static str, handler: H) -> WorkerHandle
    where
        H: MessageHandler + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.consume(name, shutdown_rx, handler));
        WorkerHandle::new(shutdown_tx, join)
    }

    async fn consume<H>(self, name: &'static str, mut shutdown_rx: oneshot::Receiver<()>, handler: H)
    where
        H: MessageHandler,
    {
        info!(
            worker = name,
            stream_key = %self.config.stream_key,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "redis streams consumer started"
        );

        let mut conn: Option<MultiplexedConnection> = None;

        loop {
            if conn.is_none() {
                match self.connect().await {
                    Ok(mut c) => match self.ensure_group_on(&mut c).await {
                        Ok(()) => conn = Some(c),
                        Err(e) => error!(worker = name, error = %e, "consumer group setup failed"),
                    },
                    Err(e) => error!(worker = name, error = %e, "redis connection failed"),
                }
            }

            let Some(c) = conn.as_mut() else {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                }
                continue;
            };

            let polled = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                polled = self.poll_once(c, name, &handler) => polled,
            };

            if let Err(e) = polled {
                error!(worker = name, error = %e, "redis streams poll failed; reconnecting");
                conn = None;
            }
        }

        info!(worker = name, "redis streams consumer stopped");
    }

    /// Reclaim idle pending entries, then read new ones.
    async fn poll_once<H>(
        &self,
        conn: &mut MultiplexedConnection,
        name: &'static str,
        handler: &H,
    ) -> Result<(), RedisStreamsError>
    where
        H: MessageHandler,
    {
        self.reclaim(conn, name, handler).await?;

        let opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.batch)
            .block(duration_ms(self.config.block));

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_key], &[">"], &opts)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in key.ids {
                self.dispatch(conn, name, handler, &entry).await?;
            }
        }
        Ok(())
    }

    async fn reclaim<H>(
        &self,
        conn: &mut MultiplexedConnection,
        name: &'static str,
        handler: &H,
    ) -> Result<(), RedisStreamsError>
    where
        H: MessageHandler,
    {
        let idle_ms = duration_ms(self.config.claim_idle);
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg("IDLE")
            .arg(idle_ms)
            .arg("-")
            .arg("+")
            .arg(self.config.batch)
            .query_async(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XPENDING failed: {e}")))?;

        let pending: Vec<PendingEntry> = pending.ids.iter().map(PendingEntry::from).collect();
        let plan = plan_reclaim(&pending, idle_ms, self.config.max_deliveries);
        if plan.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = plan.iter().map(|p| p.id.as_str()).collect();
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.config.stream_key,
                &self.config.group,
                &self.config.consumer,
                idle_ms,
                &ids[..],
            )
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XCLAIM failed: {e}")))?;

        for entry in claimed.ids {
            let Some(step) = plan.iter().find(|p| p.id == entry.id) else {
                continue;
            };

            match step.action {
                ReclaimAction::DeadLetter => self.dead_letter(conn, &entry, step.deliveries).await?,
                ReclaimAction::Redeliver => {
                    debug!(worker = name, message_id = %entry.id, deliveries = step.deliveries, "redelivering pending entry");
                    self.dispatch(conn, name, handler, &entry).await?;
                }
            }
        }
        Ok(())
    }

    async fn dispatch<H>(
        &self,
        conn: &mut MultiplexedConnection,
        name: &'static str,
        handler: &H,
        entry: &StreamId,
    ) -> Result<(), RedisStreamsError>
    where
        H: MessageHandler,
    {
        let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).unwrap_or_default();

        match handler.handle(&self.config.stream_key, &payload).await {
            Ok(()) => self.ack(conn, &entry.id).await,
            Err(err) => {
                // Left pending; reclaimed after `claim_idle`.
                warn!(
                    worker = name,
                    message_id = %entry.id,
                    retryable = err.is_retryable(),
                    error = %err,
                    "stream entry handling failed"
                );
                Ok(())
            }
        }
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, id: &str) -> Result<(), RedisStreamsError> {
        let _: i64 = conn
            .xack(&self.config.stream_key, &self.config.group, &[id])
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        entry: &StreamId,
        deliveries: usize,
    ) -> Result<(), RedisStreamsError> {
        let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).unwrap_or_default();

        let _: String = redis::cmd("XADD")
            .arg(&self.config.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(&entry.id)
            .arg("delivery_count")
            .arg(deliveries)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;

        self.ack(conn, &entry.id).await?;

        warn!(
            message_id = %entry.id,
            delivery_count = deliveries,
            dlq_key = %self.config.dlq_key,
            "stream entry moved to dead-letter stream"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reclaim planning
// ─────────────────────────────────────────────────────────────────────────────

/// One XPENDING row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    id: String,
    idle_ms: usize,
    times_delivered: usize,
}

impl From<&StreamPendingId> for PendingEntry {
    fn from(p: &StreamPendingId) -> Self {
        Self {
            id: p.id.clone(),
            idle_ms: p.last_delivered_ms,
            times_delivered: p.times_delivered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReclaimAction {
    Redeliver,
    DeadLetter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReclaimStep {
    id: String,
    /// Delivery count once the entry is claimed again.
    deliveries: usize,
    action: ReclaimAction,
}

/// Decide what to do with each pending entry.
///
/// Entries idle less than `claim_idle_ms` are left with their consumer. XCLAIM
/// bumps the delivery counter, so an entry is dead-lettered once that bumped
/// count exceeds `max_deliveries`.
fn plan_reclaim(pending: &[PendingEntry], claim_idle_ms: usize, max_deliveries: usize) -> Vec<ReclaimStep> {
    pending
        .iter()
        .filter(|p| p.idle_ms >= claim_idle_ms)
        .map(|p| {
            let deliveries = p.times_delivered.saturating_add(1);
            let action = if deliveries > max_deliveries {
                ReclaimAction::DeadLetter
            } else {
                ReclaimAction::Redeliver
            };
            ReclaimStep {
                id: p.id.clone(),
                deliveries,
                action,
            }
        })
        .collect()
}

fn duration_ms(d: Duration) -> usize {
    usize::try_from(d.as_millis()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_derives_dead_letter_key() {
        let config = RedisStreamsConfig::new("user-events", "auth-service", "auth-1");
        assert_eq!(config.dlq_key, "user-events:dlq");
        assert_eq!(config.max_deliveries, DEFAULT_MAX_DELIVERIES);
    }

    fn pending(id: &str, idle_ms: usize, times_delivered: usize) -> PendingEntry {
        PendingEntry {
            id: id.into(),
            idle_ms,
            times_delivered,
        }
    }

    #[test]
    fn entries_still_in_flight_are_not_reclaimed() {
        let plan = plan_reclaim(
            &[pending("1-0", 59_999, 1), pending("2-0", 60_000, 1)],
            60_000,
            DEFAULT_MAX_DELIVERIES,
        );

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "2-0");
        assert_eq!(plan[0].deliveries, 2);
        assert_eq!(plan[0].action, ReclaimAction::Redeliver);
    }

    #[test]
    fn dead_letters_once_the_delivery_limit_is_exceeded() {
        let plan = plan_reclaim(
            &[pending("1-0", 90_000, 4), pending("2-0", 90_000, 5), pending("3-0", 90_000, 9)],
            60_000,
            5,
        );

        let actions: Vec<_> = plan.iter().map(|s| (s.id.as_str(), s.deliveries, s.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("1-0", 5, ReclaimAction::Redeliver),
                ("2-0", 6, ReclaimAction::DeadLetter),
                ("3-0", 10, ReclaimAction::DeadLetter),
            ]
        );
    }

    #[test]
    fn nothing_pending_means_nothing_to_do() {
        assert!(plan_reclaim(&[], 60_000, 5).is_empty());
    }

    #[test]
    fn converts_xpending_rows() {
        let row = StreamPendingId {
            id: "7-1".into(),
            consumer: "auth-1".into(),
            last_delivered_ms: 61_000,
            times_delivered: 3,
        };
        assert_eq!(PendingEntry::from(&row), pending("7-1", 61_000, 3));
    }

    #[test]
    fn rejects_malformed_urls() {
        let config = RedisStreamsConfig::new("user-events", "auth-service", "auth-1");
        assert!(matches!(
            RedisStreamsSource::new("not a url", config),
            Err(RedisStreamsError::Connection(_))
        ));
    }
}
