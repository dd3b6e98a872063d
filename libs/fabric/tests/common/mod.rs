#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use warren_fabric::broker::{Channel, Connection, DeliveryStream};
use warren_fabric::error::{Error, Result};
use warren_fabric::message::{Delivery, Outgoing};
use warren_fabric::topology::{ExchangeDecl, QueueDecl, ResolvedBinding};

/// Channel double that records acks and publishes
#[derive(Default)]
pub struct RecordingChannel {
    pub acks: Mutex<Vec<Delivery>>,
    pub published: Mutex<Vec<Outgoing>>,
    pub publish_attempts: AtomicUsize,
    pub closed: AtomicBool,
    pub fail_acks: AtomicBool,
    pub fail_consume: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acks(&self) -> Vec<Delivery> {
        self.acks.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Outgoing> {
        self.published.lock().unwrap().clone()
    }

    pub fn close_now(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Channel for RecordingChannel {
    async fn declare_exchange(&self, _exchange: &ExchangeDecl) -> Result<()> {
        Ok(())
    }

    async fn declare_queue(&self, _queue: &QueueDecl) -> Result<()> {
        Ok(())
    }

    async fn bind_queue(&self, _binding: &ResolvedBinding) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, message: &Outgoing) -> Result<()> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        if self.fail_consume.load(Ordering::SeqCst) {
            return Err(Error::broker(format!("no queue {queue:?}")));
        }
        Ok(futures::stream::empty().boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        self.acks.lock().unwrap().push(delivery.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.close_now();
        Ok(())
    }
}

/// Connection double that hands out one shared channel and counts opens
pub struct RecordingConnection {
    pub channel: Arc<RecordingChannel>,
    pub opened: AtomicUsize,
}

impl RecordingConnection {
    pub fn new(channel: Arc<RecordingChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            opened: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Connection for RecordingConnection {
    async fn open_channel(&self) -> Result<Arc<dyn Channel>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.channel.clone())
    }
}

pub fn delivery(tag: u64, body: &serde_json::Value) -> Delivery {
    Delivery::new(tag, "events", "test", serde_json::to_vec(body).unwrap())
}
