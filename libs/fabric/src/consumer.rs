//! Queue consumers and the acknowledgment discipline around them.
//!
//! A concrete consumer only supplies [`Consumer::message_handler`] and
//! [`Consumer::on_consume_error`]. [`deliver`] wraps every delivery the same way:
//!
//! 1. the handler runs exactly once and is awaited to completion
//! 2. if it failed (or panicked), the error hook runs
//! 3. a real delivery is acked whatever the handler outcome; the `None`
//!    sentinel (broker cancelled the consumer) is never acked
//!
//! Handler failures are therefore at-most-once: they are made visible through
//! logs, [`ConsumerStats`] and the error hook, never through redelivery.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use warren_core::{FailureClass, HandlerError};

use crate::broker::Channel;
use crate::error::{Error, Result};
use crate::message::Delivery;
use crate::vhost::VHost;

/// Application logic bound to one queue
#[async_trait::async_trait]
pub trait Consumer: Send + Sync + 'static {
    /// Process one delivery. `None` means the broker cancelled the
    /// subscription; it is passed through so the consumer can clean up.
    async fn message_handler(
        &self,
        message: Option<&Delivery>,
    ) -> std::result::Result<(), HandlerError>;

    /// Side effects after a failed handler invocation. Must not panic.
    ///
    /// Deliberately receives nothing about the failure; the wrapper logs the
    /// failure's code and message and counts it in [`ConsumerStats`].
    fn on_consume_error(&self);
}

/// Terminal state of one delivery callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryOutcome {
    /// The handler ran and the delivery was acked
    Acked,
    /// The `None` sentinel: handler ran, nothing acked
    Cancelled,
    /// The handler ran but the ack itself failed
    AckFailed,
}

/// Per-consumer observability counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    delivered: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    unexpected: AtomicU64,
    cancelled: AtomicU64,
    acked: AtomicU64,
    ack_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub unexpected: u64,
    pub cancelled: u64,
    pub acked: u64,
    pub ack_failures: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unexpected: self.unexpected.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Run one delivery through a consumer and settle its ack.
///
/// Never fails and never panics on a handler failure: whatever happens inside
/// the handler, the returned future resolves to a [`DeliveryOutcome`].
pub async fn deliver<C>(
    consumer: &C,
    channel: &dyn Channel,
    message: Option<Delivery>,
    stats: &ConsumerStats,
) -> DeliveryOutcome
where
    C: Consumer + ?Sized,
{
    if message.is_some() {
        ConsumerStats::bump(&stats.delivered);
    }

    let result = AssertUnwindSafe(consumer.message_handler(message.as_ref()))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(HandlerError::panicked(payload)));

    match result {
        Ok(()) => ConsumerStats::bump(&stats.succeeded),
        Err(err) => {
            ConsumerStats::bump(&stats.failed);
            let tag = message.as_ref().map(|m| m.delivery_tag);
            match err.class() {
                FailureClass::Expected(code) => {
                    warn!(code = %code, delivery_tag = ?tag, error = %err, "handler failed");
                }
                FailureClass::Unexpected => {
                    ConsumerStats::bump(&stats.unexpected);
                    error!(
                        code = err.code(),
                        delivery_tag = ?tag,
                        error = %err,
                        "handler failed unexpectedly"
                    );
                }
            }
            run_error_hook(consumer);
        }
    }

    let Some(message) = message else {
        ConsumerStats::bump(&stats.cancelled);
        info!("consumer cancelled by broker");
        return DeliveryOutcome::Cancelled;
    };

    match channel.ack(&message).await {
        Ok(()) => {
            ConsumerStats::bump(&stats.acked);
            debug!(delivery_tag = message.delivery_tag, "acked");
            DeliveryOutcome::Acked
        }
        Err(e) => {
            ConsumerStats::bump(&stats.ack_failures);
            error!(delivery_tag = message.delivery_tag, error = %e, "failed to ack delivery");
            DeliveryOutcome::AckFailed
        }
    }
}

/// A panicking error hook is a programming error: loud in debug builds,
/// logged in release builds.
fn run_error_hook<C>(consumer: &C)
where
    C: Consumer + ?Sized,
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| consumer.on_consume_error())) {
        if cfg!(debug_assertions) {
            panic::resume_unwind(payload);
        }
        let err = HandlerError::panicked(payload);
        error!(error = %err, "on_consume_error panicked");
    }
}

/// Callback registered with a broker subscription, closed over its channel
pub type DeliveryCallback =
    Box<dyn Fn(Option<Delivery>) -> BoxFuture<'static, DeliveryOutcome> + Send + Sync>;

/// A consumer bound to one declared queue of one vhost
pub struct Bound<C> {
    vhost: VHost,
    queue: String,
    consumer: Arc<C>,
    stats: Arc<ConsumerStats>,
}

impl<C: Consumer> Bound<C> {
    /// Bind a consumer to a queue.
    ///
    /// Fails with [`Error::Configuration`] when the queue is not declared in
    /// the vhost's topology.
    pub fn new(vhost: &VHost, queue: impl Into<String>, consumer: C) -> Result<Self> {
        let queue = queue.into();
        if !vhost.topology().has_queue(&queue) {
            return Err(Error::configuration(format!(
                "queue {queue:?} is not declared in vhost {:?}",
                vhost.name()
            )));
        }
        Ok(Self {
            vhost: vhost.clone(),
            queue,
            consumer: Arc::new(consumer),
            stats: Arc::new(ConsumerStats::default()),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn vhost(&self) -> &VHost {
        &self.vhost
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Build the delivery callback for a channel
    pub fn on_consume(&self, channel: Arc<dyn Channel>) -> DeliveryCallback {
        let consumer = Arc::clone(&self.consumer);
        let stats = Arc::clone(&self.stats);
        let vhost = self.vhost.name().to_owned();
        let queue = self.queue.clone();

        Box::new(move |message| {
            let consumer = Arc::clone(&consumer);
            let channel = Arc::clone(&channel);
            let stats = Arc::clone(&stats);
            let span = info_span!("consume", vhost = %vhost, queue = %queue);
            async move { deliver(consumer.as_ref(), channel.as_ref(), message, &stats).await }
                .instrument(span)
                .boxed()
        })
    }

    /// Open a channel, consume the queue and dispatch deliveries one at a
    /// time until the broker cancels the subscription.
    ///
    /// Returns after the `None` sentinel has been handed to the consumer.
    pub async fn subscribe(&self, consumer_tag: &str) -> Result<StatsSnapshot> {
        self.subscribe_until(consumer_tag, future::pending()).await
    }

    /// [`Bound::subscribe`] that also returns once `stop` resolves.
    ///
    /// `stop` is only checked between deliveries, so a delivery already handed
    /// to the consumer always runs to its ack. Stopping is not a broker
    /// cancellation: the consumer does not see the `None` sentinel.
    pub async fn subscribe_until<S>(&self, consumer_tag: &str, stop: S) -> Result<StatsSnapshot>
    where
        S: Future<Output = ()> + Send,
    {
        let channel = self.vhost.channel().await?;
        let mut deliveries = match channel.consume(&self.queue, consumer_tag).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                self.close_channel(channel.as_ref()).await;
                return Err(e);
            }
        };
        info!(vhost = self.vhost.name(), queue = %self.queue, consumer_tag, "subscribed");

        let callback = self.on_consume(Arc::clone(&channel));
        tokio::pin!(stop);
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = &mut stop => break false,
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        callback(Some(delivery)).await;
                    }
                    None => break true,
                },
            }
        };

        if cancelled {
            callback(None).await;
        } else {
            info!(vhost = self.vhost.name(), queue = %self.queue, consumer_tag, "stopped");
        }
        drop(deliveries);
        self.close_channel(channel.as_ref()).await;
        Ok(self.stats.snapshot())
    }

    async fn close_channel(&self, channel: &dyn Channel) {
        if let Err(e) = channel.close().await {
            debug!(queue = %self.queue, error = %e, "closing subscription channel failed");
        }
    }
}

/// Type-erased handle the worker supervises
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    fn vhost_name(&self) -> &str;

    fn queue(&self) -> &str;

    fn stats(&self) -> StatsSnapshot;

    /// Consume until the broker cancels or `stop` resolves
    async fn subscribe_until(
        &self,
        consumer_tag: &str,
        stop: BoxFuture<'static, ()>,
    ) -> Result<StatsSnapshot>;
}

#[async_trait::async_trait]
impl<C: Consumer> Subscriber for Bound<C> {
    fn vhost_name(&self) -> &str {
        self.vhost.name()
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn subscribe_until(
        &self,
        consumer_tag: &str,
        stop: BoxFuture<'static, ()>,
    ) -> Result<StatsSnapshot> {
        Bound::subscribe_until(self, consumer_tag, stop).await
    }
}
