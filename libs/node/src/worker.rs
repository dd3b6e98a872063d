//! Subscription supervisor.
//!
//! A bound consumer's subscription ends when the broker cancels it. The
//! worker owns one task per consumer and resubscribes after
//! `resubscribe_delay` until it is shut down. Shutdown waits for the delivery
//! in flight to be handled and acked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use warren_fabric::Subscriber;

pub struct Worker {
    subscribers: Vec<Arc<dyn Subscriber>>,
    resubscribe_delay: Duration,
    service_name: String,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl Worker {
    pub fn new(
        subscribers: Vec<Arc<dyn Subscriber>>,
        resubscribe_delay: Duration,
        service_name: impl Into<String>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            subscribers,
            resubscribe_delay,
            service_name: service_name.into(),
            shutdown,
            tasks: JoinSet::new(),
        }
    }

    pub fn consumers_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Spawn one supervised subscription per consumer
    pub fn start(&mut self) {
        for subscriber in &self.subscribers {
            let consumer_tag = format!(
                "{}-{}-{}",
                self.service_name,
                subscriber.vhost_name(),
                subscriber.queue()
            );
            self.tasks.spawn(supervise(
                Arc::clone(subscriber),
                consumer_tag,
                self.resubscribe_delay,
                self.shutdown.subscribe(),
            ));
        }
        info!(consumers = self.subscribers.len(), "worker started");
    }

    /// Stop every subscription and wait for the tasks to finish
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "subscription task failed");
            }
        }
        info!("worker stopped");
    }
}

async fn supervise(
    subscriber: Arc<dyn Subscriber>,
    consumer_tag: String,
    resubscribe_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let vhost = subscriber.vhost_name().to_owned();
    let queue = subscriber.queue().to_owned();

    loop {
        if *shutdown.borrow() {
            break;
        }

        // observed by the subscription between deliveries only
        let stop = {
            let mut shutdown = shutdown.clone();
            Box::pin(async move {
                let _ = shutdown.wait_for(|stopped| *stopped).await;
            })
        };
        match subscriber.subscribe_until(&consumer_tag, stop).await {
            Ok(stats) => {
                info!(
                    vhost = %vhost,
                    queue = %queue,
                    delivered = stats.delivered,
                    "subscription ended"
                );
            }
            Err(e) => {
                warn!(vhost = %vhost, queue = %queue, error = %e, "subscribe failed");
            }
        }

        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(resubscribe_delay) => {
                info!(
                    vhost = %vhost,
                    queue = %queue,
                    consumer_tag = %consumer_tag,
                    "resubscribing"
                );
            }
            _ = shutdown.changed() => break,
        }
    }
}
