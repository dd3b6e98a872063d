use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::broker::{Channel, Connection};
use crate::error::Result;
use crate::topology::{Binding, ExchangeDecl, QueueDecl, Topology};

/// A named, isolated messaging domain: a validated topology plus the
/// connection its channels come from.
///
/// Cheap to clone; every clone shares the same topology and connection.
#[derive(Clone)]
pub struct VHost {
    topology: Arc<Topology>,
    connection: Arc<dyn Connection>,
}

impl VHost {
    /// Validate a topology and bind it to a connection
    pub fn declare(
        name: impl Into<String>,
        queues: Vec<QueueDecl>,
        exchanges: Vec<ExchangeDecl>,
        bindings: Vec<Binding>,
        connection: Arc<dyn Connection>,
    ) -> Result<Self> {
        let topology = Topology::declare(name, queues, exchanges, bindings)?;
        Ok(Self::new(topology, connection))
    }

    pub fn new(topology: Topology, connection: Arc<dyn Connection>) -> Self {
        Self {
            topology: Arc::new(topology),
            connection,
        }
    }

    pub fn name(&self) -> &str {
        self.topology.name()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Acquire a fresh channel on this vhost's connection
    pub async fn channel(&self) -> Result<Arc<dyn Channel>> {
        self.connection.open_channel().await
    }

    /// Declare every exchange, queue and binding on the broker.
    ///
    /// Idempotent as long as the broker already holds a compatible topology.
    pub async fn install(&self) -> Result<()> {
        let channel = self.channel().await?;
        let topology = &self.topology;

        for exchange in topology.exchanges() {
            channel.declare_exchange(exchange).await?;
            debug!(vhost = topology.name(), exchange = %exchange.name, "declared exchange");
        }
        for queue in topology.queues() {
            channel.declare_queue(queue).await?;
            debug!(vhost = topology.name(), queue = %queue.name, "declared queue");
        }
        for binding in topology.bindings() {
            channel.bind_queue(binding).await?;
        }
        channel.close().await?;

        info!(
            vhost = topology.name(),
            exchanges = topology.exchanges().len(),
            queues = topology.queues().len(),
            bindings = topology.bindings().len(),
            "installed topology"
        );
        Ok(())
    }
}

impl fmt::Debug for VHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VHost")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}
