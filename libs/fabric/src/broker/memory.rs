use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::{Channel, Connection, DeliveryStream};
use crate::error::{Error, Result};
use crate::message::{Delivery, Outgoing};
use crate::topology::{ExchangeDecl, ExchangeKind, QueueDecl, ResolvedBinding, DEFAULT_EXCHANGE};

/// In-process broker for a single virtual host.
///
/// Supports direct, topic and fanout exchanges plus the default exchange.
/// Publishing is mandatory: a message no queue accepts is rejected. Each queue
/// accepts one consumer at a time and buffers messages until one attaches.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    next_channel_id: AtomicU64,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeKind>,
    bindings: Vec<ResolvedBinding>,
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    unacked: HashMap<u64, Unacked>,
    acked: u64,
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<Delivery>,
    consumer: Option<Subscriber>,
}

struct Subscriber {
    channel_id: u64,
    tx: mpsc::UnboundedSender<Delivery>,
}

struct Unacked {
    channel_id: u64,
    queue: String,
    delivery: Delivery,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel directly, without going through [`Connection`]
    pub fn channel(&self) -> MemoryChannel {
        let id = self.inner.next_channel_id.fetch_add(1, Ordering::Relaxed) + 1;
        MemoryChannel {
            broker: self.clone(),
            id,
            open: AtomicBool::new(true),
        }
    }

    /// Cancel the consumer of a queue from the broker side
    pub fn cancel_consumers(&self, queue: &str) {
        let mut state = self.lock();
        if let Some(q) = state.queues.get_mut(queue) {
            if q.consumer.take().is_some() {
                debug!(queue, "memory broker cancelled consumer");
            }
        }
    }

    /// Deliveries acknowledged since the broker was created
    pub fn acked_count(&self) -> u64 {
        self.lock().acked
    }

    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    /// Messages waiting in a queue for a consumer
    pub fn backlog_len(&self, queue: &str) -> usize {
        self.lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.backlog.len())
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.lock().queues.contains_key(queue)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Connection for MemoryBroker {
    async fn open_channel(&self) -> Result<Arc<dyn Channel>> {
        Ok(Arc::new(self.channel()))
    }
}

impl State {
    fn route(&self, message: &Outgoing) -> Result<Vec<String>> {
        if message.exchange == DEFAULT_EXCHANGE {
            return Ok(if self.queues.contains_key(&message.routing_key) {
                vec![message.routing_key.clone()]
            } else {
                Vec::new()
            });
        }

        let kind = self.exchanges.get(&message.exchange).ok_or_else(|| {
            Error::publish(
                &message.exchange,
                &message.routing_key,
                "no such exchange",
            )
        })?;

        let mut targets: Vec<String> = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.exchange == message.exchange) {
            let matched = match kind {
                ExchangeKind::Direct => binding.routing_key == message.routing_key,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, &message.routing_key),
                ExchangeKind::Fanout => true,
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        Ok(targets)
    }

    fn enqueue(&mut self, queue: &str, mut delivery: Delivery) {
        let Some(q) = self.queues.get_mut(queue) else {
            return;
        };
        if let Some(subscriber) = &q.consumer {
            self.next_tag += 1;
            delivery.delivery_tag = self.next_tag;
            if subscriber.tx.send(delivery.clone()).is_ok() {
                self.unacked.insert(
                    delivery.delivery_tag,
                    Unacked {
                        channel_id: subscriber.channel_id,
                        queue: queue.to_owned(),
                        delivery,
                    },
                );
                return;
            }
            // receiver dropped without the channel closing
            q.consumer = None;
        }
        q.backlog.push_back(delivery);
    }

    fn attach(
        &mut self,
        queue: &str,
        channel_id: u64,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>> {
        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| Error::broker(format!("no queue {queue:?}")))?;
        if q.consumer.is_some() {
            return Err(Error::broker(format!("queue {queue:?} already has a consumer")));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        q.consumer = Some(Subscriber { channel_id, tx });

        let backlog: Vec<Delivery> = q.backlog.drain(..).collect();
        for delivery in backlog {
            self.enqueue(queue, delivery);
        }
        Ok(rx)
    }

    fn release_channel(&mut self, channel_id: u64) {
        for q in self.queues.values_mut() {
            if q.consumer.as_ref().is_some_and(|s| s.channel_id == channel_id) {
                q.consumer = None;
            }
        }

        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.channel_id == channel_id)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();
        for tag in tags.into_iter().rev() {
            if let Some(mut u) = self.unacked.remove(&tag) {
                u.delivery.redelivered = true;
                if let Some(q) = self.queues.get_mut(&u.queue) {
                    q.backlog.push_front(u.delivery);
                }
            }
        }
    }
}

/// A channel on a [`MemoryBroker`]
pub struct MemoryChannel {
    broker: MemoryBroker,
    id: u64,
    open: AtomicBool,
}

impl MemoryChannel {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::ChannelClosed)
        }
    }
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    async fn declare_exchange(&self, exchange: &ExchangeDecl) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        match state.exchanges.get(&exchange.name).copied() {
            Some(kind) if kind != exchange.kind => Err(Error::broker(format!(
                "exchange {:?} already declared as {}",
                exchange.name,
                kind.as_str()
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(exchange.name.clone(), exchange.kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, queue: &QueueDecl) -> Result<()> {
        self.ensure_open()?;
        self.broker
            .lock()
            .queues
            .entry(queue.name.clone())
            .or_default();
        Ok(())
    }

    async fn bind_queue(&self, binding: &ResolvedBinding) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(Error::broker(format!("no exchange {:?}", binding.exchange)));
        }
        if !state.queues.contains_key(&binding.queue) {
            return Err(Error::broker(format!("no queue {:?}", binding.queue)));
        }
        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn publish(&self, message: &Outgoing) -> Result<()> {
        if !self.is_open() {
            return Err(Error::publish(
                &message.exchange,
                &message.routing_key,
                "channel closed",
            ));
        }
        let mut state = self.broker.lock();
        let targets = state.route(message)?;
        if targets.is_empty() {
            return Err(Error::publish(
                &message.exchange,
                &message.routing_key,
                "message is unroutable",
            ));
        }
        for queue in &targets {
            let delivery = Delivery::new(
                0,
                &message.exchange,
                &message.routing_key,
                message.payload.clone(),
            );
            state.enqueue(queue, delivery);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        let rx = self.broker.lock().attach(queue, self.id)?;
        debug!(queue, consumer_tag, channel = self.id, "memory broker attached consumer");
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        });
        Ok(stream.boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        let owned = state
            .unacked
            .get(&delivery.delivery_tag)
            .is_some_and(|u| u.channel_id == self.id);
        if !owned {
            return Err(Error::broker(format!(
                "unknown delivery tag {}",
                delivery.delivery_tag
            )));
        }
        if state.unacked.remove(&delivery.delivery_tag).is_some() {
            state.acked += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.broker.lock().release_channel(self.id);
        }
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.broker.lock().release_channel(self.id);
        }
    }
}

/// AMQP topic matching: `*` is exactly one word, `#` is zero or more words
fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((word, rest)) => match key.split_first() {
            Some((first, key_rest)) => {
                (*word == "*" || word == first) && matches_words(rest, key_rest)
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::topic_matches;

    #[test]
    fn topic_exact_and_wildcards() {
        assert!(topic_matches("user.created", "user.created"));
        assert!(!topic_matches("user.created", "user.deleted"));
        assert!(topic_matches("user.*", "user.created"));
        assert!(!topic_matches("user.*", "user.created.v2"));
        assert!(topic_matches("user.#", "user"));
        assert!(topic_matches("user.#", "user.created.v2"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("*.created", "order.created"));
        assert!(!topic_matches("*.created", "created"));
    }
}
