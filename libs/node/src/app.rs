use std::sync::Arc;

use tracing::info;
use warren_fabric::broker::{Connection, MemoryBroker};
use warren_fabric::VHost;

use crate::config::{AppConfig, BrokerKind};
use crate::container::{Container, ContainerConfig};
use crate::error::{Error, Result};
use crate::services::{InMemoryUserStore, StaticDirectory};
use crate::telemetry;
use crate::topology;
use crate::worker::Worker;

/// A running service: installed vhosts, wired container, supervised consumers
pub struct Application {
    config: AppConfig,
    container: Container,
    worker: Worker,
}

impl Application {
    /// Connect to the configured broker and start consuming
    pub async fn start(config: AppConfig) -> Result<Self> {
        telemetry::init(config.log_format);
        let (work, home) = connect(&config).await?;
        Self::with_connections(config, work, home).await
    }

    /// Start on already established connections, one per vhost
    pub async fn with_connections(
        config: AppConfig,
        work: Arc<dyn Connection>,
        home: Arc<dyn Connection>,
    ) -> Result<Self> {
        let (work_topology, home_topology) = topology::resolve(config.topology_path.as_deref())?;
        let work_vhost = VHost::new(work_topology, work);
        let home_vhost = VHost::new(home_topology, home);
        work_vhost.install().await?;
        home_vhost.install().await?;

        let container = Container::new(ContainerConfig {
            user_store: Arc::new(InMemoryUserStore::default()),
            directory: Arc::new(StaticDirectory::new()),
            work_vhost,
            home_vhost,
        })?;

        let mut worker = Worker::new(
            container.consumers()?,
            config.resubscribe_delay,
            config.service_name.clone(),
        );
        worker.start();

        info!(
            service = %config.service_name,
            broker = ?config.broker,
            consumers = worker.consumers_count(),
            directory_url = config.directory_url.as_deref().unwrap_or("-"),
            "application started"
        );

        Ok(Self {
            config,
            container,
            worker,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub async fn shutdown(mut self) {
        self.worker.shutdown().await;
        info!(service = %self.config.service_name, "application stopped");
    }
}

async fn connect(config: &AppConfig) -> Result<(Arc<dyn Connection>, Arc<dyn Connection>)> {
    match config.broker {
        BrokerKind::Memory => {
            let work: Arc<dyn Connection> = Arc::new(MemoryBroker::new());
            let home: Arc<dyn Connection> = Arc::new(MemoryBroker::new());
            Ok((work, home))
        }
        BrokerKind::Amqp => connect_amqp(config).await,
    }
}

#[cfg(feature = "amqp")]
async fn connect_amqp(config: &AppConfig) -> Result<(Arc<dyn Connection>, Arc<dyn Connection>)> {
    let work = open_amqp(config, config.work_url.as_deref(), topology::WORK).await?;
    let home = open_amqp(config, config.home_url.as_deref(), topology::HOME).await?;
    Ok((work, home))
}

#[cfg(feature = "amqp")]
async fn open_amqp(
    config: &AppConfig,
    uri: Option<&str>,
    vhost: &str,
) -> Result<Arc<dyn Connection>> {
    use warren_fabric::broker::AmqpConnection;

    let uri = uri
        .ok_or_else(|| Error::configuration(format!("no URL configured for vhost {vhost:?}")))?;
    let connection = AmqpConnection::builder()
        .uri(uri)
        .connection_name(format!("{}-{vhost}", config.service_name))
        .connect_timeout(config.connect_timeout)
        .connect()
        .await?;
    info!(vhost, "connected to amqp broker");
    Ok(Arc::new(connection))
}

#[cfg(not(feature = "amqp"))]
async fn connect_amqp(_config: &AppConfig) -> Result<(Arc<dyn Connection>, Arc<dyn Connection>)> {
    Err(Error::configuration(
        "the amqp broker requires warren-node to be built with the \"amqp\" feature",
    ))
}
