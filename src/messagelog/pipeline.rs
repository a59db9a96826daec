//! The message log pipeline: dispatch queue, dispatch loop and rotators.
//!
//! Event handlers enqueue [`LogMessage`]s; a single dispatch loop dequeues
//! them in order and hands each payload to its guild's rotator. A guild
//! without a rotator has its messages dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::error::{QueueError, ResolutionError};
use crate::common::GuildSnapshot;
use crate::config::MessageLogConfig;
use crate::messagelog::payload::LogMessage;
use crate::messagelog::queue::{DispatchQueue, DispatchReceiver};
use crate::messagelog::registry::RotatorRegistry;
use crate::messagelog::rotator::CategoryRotator;
use crate::messagelog::transport::LogTransport;

/// How long `stop` lets the dispatch loop drain before cancelling it.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MessageLog {
    config: MessageLogConfig,
    queue: DispatchQueue,
    receiver: Mutex<Option<DispatchReceiver>>,
    registry: Arc<RotatorRegistry>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl MessageLog {
    pub fn new(config: MessageLogConfig) -> Self {
        let (queue, receiver) = DispatchQueue::new(config.queue_capacity);

        Self {
            config,
            queue,
            receiver: Mutex::new(Some(receiver)),
            registry: Arc::new(RotatorRegistry::new()),
            dispatch_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the dispatch loop. Later calls do nothing.
    pub async fn start(&self) {
        let Some(receiver) = self.receiver.lock().await.take() else {
            debug!("Message log already started");
            return;
        };

        let registry = self.registry.clone();
        let handle = tokio::spawn(dispatch_loop(receiver, registry));
        *self.dispatch_task.lock().await = Some(handle);

        info!(
            "Message log started (queue capacity {})",
            self.queue.capacity()
        );
    }

    /// Queue a log message, waiting while the queue is full.
    pub async fn send(&self, message: LogMessage) -> Result<(), QueueError> {
        self.queue.enqueue(message).await
    }

    /// Resolve and start a rotator for a guild that became available.
    pub async fn register_guild(
        &self,
        guild: &GuildSnapshot,
        transport: Arc<dyn LogTransport>,
    ) -> Result<(), ResolutionError> {
        if self.stopped.load(Ordering::SeqCst) {
            debug!(guild_id = %guild.id, "Message log stopped, not registering guild");
            return Ok(());
        }

        let rotator = CategoryRotator::resolve(guild, &self.config, transport)?;
        rotator.start();
        self.registry.insert(Arc::new(rotator)).await;
        Ok(())
    }

    #[cfg(test)]
    pub fn registry(&self) -> &RotatorRegistry {
        &self.registry
    }

    /// Close the queue, let the dispatch loop drain, then stop every rotator.
    ///
    /// The loop gets [`DRAIN_TIMEOUT`] to finish before it's cancelled.
    pub async fn stop(&self) {
        self.stop_with_timeout(DRAIN_TIMEOUT).await
    }

    pub async fn stop_with_timeout(&self, drain_timeout: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Stopping message log...");
        self.queue.close().await;

        if let Some(mut handle) = self.dispatch_task.lock().await.take() {
            match tokio::time::timeout(drain_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Dispatch loop drained"),
                Ok(Err(e)) => warn!("Dispatch loop task failed: {}", e),
                Err(_) => {
                    warn!(
                        "Dispatch loop did not drain within {:.1}s, cancelling",
                        drain_timeout.as_secs_f64()
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        let rotators = self.registry.drain().await;
        let count = rotators.len();
        join_all(rotators.iter().map(|rotator| rotator.stop())).await;

        info!("Message log stopped ({} rotators)", count);
    }
}

async fn dispatch_loop(mut receiver: DispatchReceiver, registry: Arc<RotatorRegistry>) {
    while let Some(message) = receiver.dequeue().await {
        match registry.get(message.guild_id).await {
            Some(rotator) => rotator.send(message.payload).await,
            None => warn!(
                guild_id = %message.guild_id,
                "No message log rotator for guild, dropping log message"
            ),
        }
    }

    debug!("Dispatch loop ended");
}
