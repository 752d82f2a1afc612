use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use authreplica_events::{
    Delivery, Event, EventEnvelope, HandleError, MessageHandler, Projection, Subscription,
    UserEvent,
};

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Decodes raw messages from one topic and applies them to a projection.
///
/// Messages on other topics are acknowledged without being decoded.
#[derive(Debug, Clone)]
pub struct ProjectionHandler<P> {
    topic: String,
    projection: P,
}

impl<P> ProjectionHandler<P> {
    pub fn new(topic: impl Into<String>, projection: P) -> Self {
        Self {
            topic: topic.into(),
            projection,
        }
    }
}

#[async_trait]
impl<P> MessageHandler for ProjectionHandler<P>
where
    P: Projection<Ev = UserEvent>,
{
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandleError> {
        if topic != self.topic {
            debug!(topic, expected = %self.topic, "ignoring message from foreign topic");
            return Ok(());
        }

        let envelope = EventEnvelope::from_slice(payload)?;
        let event = UserEvent::decode(&envelope)?;
        let outcome = self.projection.apply(&event).await?;

        debug!(
            topic,
            event = event.event_type(),
            username = ?event.username(),
            outcome = ?outcome,
            changed = outcome.changed(),
            "event projected"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to control and join a background worker.
///
/// Dropping the handle without calling [`WorkerHandle::shutdown`] also stops
/// the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: oneshot::Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
            join: Some(join),
        }
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A message already being handled is finished first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

/// Generic message worker loop.
///
/// - Receives from a bus subscription
/// - Hands each message to a handler, one at a time
/// - Logs handler failures and keeps consuming
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a tokio task that processes messages from `subscription`.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe).
    pub fn spawn<H>(name: &'static str, subscription: Subscription<Delivery>, handler: H) -> WorkerHandle
    where
        H: MessageHandler + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(worker_loop(name, subscription, shutdown_rx, handler));
        WorkerHandle::new(shutdown_tx, join)
    }
}

async fn worker_loop<H>(
    name: &'static str,
    mut sub: Subscription<Delivery>,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: H,
) where
    H: MessageHandler,
{
    debug!(worker = name, "projection worker started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => break,

            msg = sub.recv() => {
                let Some(delivery) = msg else {
                    break;
                };

                if let Err(err) = handler.handle(&delivery.topic, &delivery.payload).await {
                    warn!(
                        worker = name,
                        message_id = %delivery.id,
                        topic = %delivery.topic,
                        retryable = err.is_retryable(),
                        error = %err,
                        "projection worker handler failed"
                    );
                }
            }
        }
    }

    debug!(worker = name, "projection worker stopped");
}
