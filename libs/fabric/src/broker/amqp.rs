use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, ConnectionProperties};
use tracing::warn;

use crate::broker::{Channel, Connection, DeliveryStream};
use crate::error::{Error, Result};
use crate::message::{Delivery, Outgoing};
use crate::topology::{ExchangeDecl, ExchangeKind, QueueDecl, ResolvedBinding};

/// Connection to one AMQP virtual host, backed by lapin
pub struct AmqpConnection {
    connection: lapin::Connection,
}

impl AmqpConnection {
    /// Connect to an AMQP URI (the vhost is part of the URI) with no timeout
    pub async fn connect(uri: &str) -> Result<Self> {
        Self::builder().uri(uri).connect().await
    }

    /// Connect with a connect timeout
    pub async fn connect_timeout(uri: &str, timeout: Duration) -> Result<Self> {
        Self::builder().uri(uri).connect_timeout(timeout).connect().await
    }

    /// Create a builder for configuring the connection
    pub fn builder() -> AmqpConnectionBuilder {
        AmqpConnectionBuilder::new()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> Result<()> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connection for AmqpConnection {
    async fn open_channel(&self) -> Result<Arc<dyn Channel>> {
        let channel = self.connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Arc::new(AmqpChannel { channel }))
    }
}

/// Builder for configuring an AMQP connection
#[derive(Default)]
pub struct AmqpConnectionBuilder {
    uri: Option<String>,
    connect_timeout: Option<Duration>,
    connection_name: Option<String>,
}

impl AmqpConnectionBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the AMQP URI to connect to
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Name shown for this connection in the broker's management tools
    pub fn connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<AmqpConnection> {
        let uri = self
            .uri
            .ok_or_else(|| Error::configuration("AMQP URI not set"))?;

        let mut properties = ConnectionProperties::default();
        if let Some(name) = self.connection_name {
            properties = properties.with_connection_name(name.into());
        }

        let connect_op = lapin::Connection::connect(&uri, properties);

        let connection = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::broker("Connect timeout exceeded"))??
        } else {
            connect_op.await?
        };

        Ok(AmqpConnection { connection })
    }
}

/// A lapin channel in publisher-confirm mode
pub struct AmqpChannel {
    channel: lapin::Channel,
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

#[async_trait::async_trait]
impl Channel for AmqpChannel {
    async fn declare_exchange(&self, exchange: &ExchangeDecl) -> Result<()> {
        let options = ExchangeDeclareOptions {
            durable: exchange.durable,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(
                &exchange.name,
                exchange_kind(exchange.kind),
                options,
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, queue: &QueueDecl) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: queue.durable,
            ..QueueDeclareOptions::default()
        };
        let mut arguments = FieldTable::default();
        if let Some(dlx) = &queue.dead_letter_exchange {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(dlx.clone().into()),
            );
        }
        self.channel
            .queue_declare(&queue.name, options, arguments)
            .await?;
        Ok(())
    }

    async fn bind_queue(&self, binding: &ResolvedBinding) -> Result<()> {
        self.channel
            .queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, message: &Outgoing) -> Result<()> {
        let publish_error =
            |reason: String| Error::publish(&message.exchange, &message.routing_key, reason);

        let options = BasicPublishOptions {
            mandatory: true,
            ..BasicPublishOptions::default()
        };
        let properties = BasicProperties::default()
            .with_content_type(message.content_type.into())
            .with_delivery_mode(2);

        let confirm = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                options,
                &message.payload,
                properties,
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        match confirm {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Ack(Some(_)) => {
                Err(publish_error("message returned as unroutable".into()))
            }
            Confirmation::Nack(_) => Err(publish_error("broker nacked the message".into())),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = queue.to_owned();
        let stream = consumer
            .take_while(move |item| {
                if let Err(e) = item {
                    warn!(queue = %queue, error = %e, "amqp consumer stream failed");
                }
                futures::future::ready(item.is_ok())
            })
            .filter_map(|item| {
                futures::future::ready(item.ok().map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    exchange: delivery.exchange.as_str().to_owned(),
                    routing_key: delivery.routing_key.as_str().to_owned(),
                    redelivered: delivery.redelivered,
                    payload: delivery.data,
                }))
            });
        Ok(stream.boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn close(&self) -> Result<()> {
        if self.is_open() {
            self.channel.close(200, "closing").await?;
        }
        Ok(())
    }
}
