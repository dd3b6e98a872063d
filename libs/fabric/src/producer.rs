use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::broker::Channel;
use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::message::Outgoing;
use crate::topology::DEFAULT_EXCHANGE;
use crate::vhost::VHost;

/// Publishes serialized payloads into one exchange of one vhost.
///
/// The channel is opened on first use and shared by every later publish. A
/// failed publish is never retried; if the channel turned out to be closed it
/// is dropped so that the *next* call opens a new one.
pub struct Producer<C = JsonCodec> {
    vhost: VHost,
    exchange: String,
    codec: C,
    channel: Mutex<Option<Arc<dyn Channel>>>,
}

impl Producer<JsonCodec> {
    /// Bind a JSON producer to an exchange of `vhost`
    pub fn bind(vhost: &VHost, exchange: impl Into<String>) -> Result<Self> {
        Self::with_codec(vhost, exchange, JsonCodec)
    }
}

impl<C: Codec> Producer<C> {
    /// Bind with an explicit codec.
    ///
    /// `exchange` must be declared in the vhost, or be the default exchange
    /// (`""`), which routes straight to the queue named by the routing key.
    pub fn with_codec(vhost: &VHost, exchange: impl Into<String>, codec: C) -> Result<Self> {
        let exchange = exchange.into();
        if !vhost.topology().has_exchange(&exchange) {
            return Err(Error::configuration(format!(
                "exchange {exchange:?} is not declared in vhost {:?}",
                vhost.name()
            )));
        }
        Ok(Self {
            vhost: vhost.clone(),
            exchange,
            codec,
            channel: Mutex::new(None),
        })
    }

    pub fn vhost(&self) -> &VHost {
        &self.vhost
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Serialize `payload` and publish it with `routing_key`.
    ///
    /// Fails with [`Error::Publish`] when the channel is closed or the broker
    /// rejects the message, and with [`Error::Codec`] when serialization fails.
    pub async fn publish<T: Serialize>(&self, routing_key: &str, payload: &T) -> Result<()> {
        if self.exchange == DEFAULT_EXCHANGE && !self.vhost.topology().has_queue(routing_key) {
            return Err(Error::publish(
                &self.exchange,
                routing_key,
                "no such queue in topology",
            ));
        }

        let message = Outgoing {
            exchange: self.exchange.clone(),
            routing_key: routing_key.to_owned(),
            content_type: self.codec.content_type(),
            payload: self.codec.encode(payload)?,
        };

        let mut slot = self.channel.lock().await;
        let channel = match slot.as_ref() {
            Some(channel) => Arc::clone(channel),
            None => {
                let channel = self
                    .vhost
                    .channel()
                    .await
                    .map_err(|e| Error::publish(&self.exchange, routing_key, e.to_string()))?;
                *slot = Some(Arc::clone(&channel));
                channel
            }
        };

        if !channel.is_open() {
            *slot = None;
            return Err(Error::publish(&self.exchange, routing_key, "channel closed"));
        }

        match channel.publish(&message).await {
            Ok(()) => {
                debug!(
                    vhost = self.vhost.name(),
                    exchange = %self.exchange,
                    routing_key,
                    bytes = message.payload.len(),
                    "published"
                );
                Ok(())
            }
            Err(e) => {
                if !channel.is_open() {
                    *slot = None;
                }
                warn!(
                    vhost = self.vhost.name(),
                    exchange = %self.exchange,
                    routing_key,
                    error = %e,
                    "publish failed"
                );
                Err(match e {
                    publish @ Error::Publish { .. } => publish,
                    other => Error::publish(&self.exchange, routing_key, other.to_string()),
                })
            }
        }
    }

    /// Close the cached channel, if any
    pub async fn close(&self) -> Result<()> {
        if let Some(channel) = self.channel.lock().await.take() {
            channel.close().await?;
        }
        Ok(())
    }
}
