//! Warren Fabric - messaging core
//!
//! Binds application consumers and producers to isolated virtual hosts on a
//! message broker. The broker itself is a supplied capability behind the
//! [`broker::Connection`] and [`broker::Channel`] traits; an in-process
//! [`broker::MemoryBroker`] is always available and an AMQP adapter is behind
//! the `amqp` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use warren_core::HandlerError;
//! use warren_fabric::broker::MemoryBroker;
//! use warren_fabric::topology::{Binding, ExchangeDecl, ExchangeKind, QueueDecl};
//! use warren_fabric::{Bound, Consumer, Delivery, Producer, VHost};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Consumer for Printer {
//!     async fn message_handler(&self, message: Option<&Delivery>) -> Result<(), HandlerError> {
//!         if let Some(message) = message {
//!             println!("{} bytes", message.payload.len());
//!         }
//!         Ok(())
//!     }
//!
//!     fn on_consume_error(&self) {}
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let work = VHost::declare(
//!     "work",
//!     vec![QueueDecl::new("user.created")],
//!     vec![ExchangeDecl::new("events", ExchangeKind::Topic)],
//!     vec![Binding::new("events", "user.created")],
//!     Arc::new(MemoryBroker::new()),
//! )?;
//! work.install().await?;
//!
//! let producer = Producer::bind(&work, "events")?;
//! producer.publish("user.created", &serde_json::json!({ "id": 1 })).await?;
//!
//! let consumer = Bound::new(&work, "user.created", Printer)?;
//! consumer.subscribe("printer").await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod codec;
pub mod consumer;
pub mod error;
pub mod message;
pub mod producer;
pub mod topology;
pub mod vhost;

// Re-exports for convenience
pub use consumer::{
    deliver, Bound, Consumer, ConsumerStats, DeliveryCallback, DeliveryOutcome, StatsSnapshot,
    Subscriber,
};
pub use error::{Error, Result};
pub use message::{Delivery, Outgoing};
pub use producer::Producer;
pub use topology::Topology;
pub use vhost::VHost;
