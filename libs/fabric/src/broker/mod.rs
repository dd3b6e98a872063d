use std::sync::Arc;

use futures::stream::BoxStream;

use crate::error::Result;
use crate::message::{Delivery, Outgoing};
use crate::topology::{ExchangeDecl, QueueDecl, ResolvedBinding};

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

#[cfg(feature = "amqp")]
pub use self::amqp::{AmqpConnection, AmqpConnectionBuilder};
pub use self::memory::{MemoryBroker, MemoryChannel};

/// Deliveries for one consumer registration, in broker order.
///
/// The stream ends when the broker cancels the consumer or the channel closes.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// A connection to one virtual host on the broker
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Open a new channel on this connection
    async fn open_channel(&self) -> Result<Arc<dyn Channel>>;
}

/// A broker channel: the capability consumers and producers work through
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    async fn declare_exchange(&self, exchange: &ExchangeDecl) -> Result<()>;

    async fn declare_queue(&self, queue: &QueueDecl) -> Result<()>;

    async fn bind_queue(&self, binding: &ResolvedBinding) -> Result<()>;

    /// Publish a message. Resolves once the broker has accepted it.
    async fn publish(&self, message: &Outgoing) -> Result<()>;

    /// Start consuming a queue
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Acknowledge a delivery received on this channel
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<()>;
}
