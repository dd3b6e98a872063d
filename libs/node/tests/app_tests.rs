use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use warren_core::HandlerError;
use warren_fabric::broker::{Channel, DeliveryStream, MemoryBroker};
use warren_fabric::codec::{Codec, JsonCodec};
use warren_fabric::topology::TopologyConfig;
use warren_fabric::{Bound, Consumer, Delivery, Outgoing, Subscriber, Topology, VHost};
use warren_node::consumers::UserCreatedConsumer;
use warren_node::services::{InMemoryUserStore, NewUser, StaticDirectory, UserSynced};
use warren_node::{topology, AppConfig, Application, Container, ContainerConfig, Worker};

async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn installed(config: TopologyConfig, broker: &MemoryBroker) -> VHost {
    let vhost = VHost::new(Topology::try_from(config).unwrap(), Arc::new(broker.clone()));
    vhost.install().await.unwrap();
    vhost
}

fn config() -> AppConfig {
    AppConfig {
        resubscribe_delay: Duration::from_millis(20),
        ..AppConfig::default()
    }
}

async fn start(work: &MemoryBroker, home: &MemoryBroker) -> Application {
    Application::with_connections(config(), Arc::new(work.clone()), Arc::new(home.clone()))
        .await
        .unwrap()
}

fn user_created(payload: &[u8]) -> Outgoing {
    Outgoing {
        exchange: topology::WORK_EXCHANGE.to_string(),
        routing_key: topology::USER_CREATED.to_string(),
        content_type: "application/json",
        payload: payload.to_vec(),
    }
}

fn ada() -> NewUser {
    NewUser {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
    }
}

#[tokio::test]
async fn start_installs_both_vhosts() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();

    let app = start(&work, &home).await;

    assert!(work.has_queue(topology::USER_CREATED));
    assert!(home.has_queue(topology::USER_SYNCED));
    assert!(!work.has_queue(topology::USER_SYNCED));
    app.shutdown().await;
}

#[tokio::test]
async fn created_user_is_synced_through_the_consumer() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();
    let app = start(&work, &home).await;

    let user = app.container().user_service().create_user(ada()).await.unwrap();

    eventually(|| home.backlog_len(topology::USER_SYNCED) == 1).await;
    eventually(|| work.acked_count() == 1).await;
    assert_eq!(work.unacked_count(), 0);

    let consumer = home.channel();
    let mut stream = consumer.consume(topology::USER_SYNCED, "test").await.unwrap();
    let synced = next_delivery(&mut stream).await;
    let event: UserSynced = JsonCodec.decode(&synced.payload).unwrap();
    assert_eq!(event, UserSynced { id: user.id, company: None });
    app.shutdown().await;
}

#[tokio::test]
async fn failed_deliveries_are_acked_and_dropped() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();
    let app = start(&work, &home).await;
    let publisher = work.channel();

    publisher.publish(&user_created(b"not json")).await.unwrap();
    publisher
        .publish(&user_created(br#"{"id":99,"email":"ghost@example.com"}"#))
        .await
        .unwrap();

    eventually(|| work.acked_count() == 2).await;
    assert_eq!(work.unacked_count(), 0);
    assert_eq!(work.backlog_len(topology::USER_CREATED), 0);
    assert_eq!(home.backlog_len(topology::USER_SYNCED), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn worker_resubscribes_after_broker_cancel() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();
    let app = start(&work, &home).await;
    let service = app.container().user_service();

    service.create_user(ada()).await.unwrap();
    eventually(|| home.backlog_len(topology::USER_SYNCED) == 1).await;

    work.cancel_consumers(topology::USER_CREATED);
    service.create_user(ada()).await.unwrap();

    eventually(|| home.backlog_len(topology::USER_SYNCED) == 2).await;
    eventually(|| work.acked_count() == 2).await;
    app.shutdown().await;
}

#[tokio::test]
async fn error_hook_counts_failures() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();
    let work_vhost = installed(topology::work(), &work).await;
    let home_vhost = installed(topology::home(), &home).await;
    let container = Container::new(ContainerConfig {
        user_store: Arc::new(InMemoryUserStore::default()),
        directory: Arc::new(StaticDirectory::new()),
        work_vhost: work_vhost.clone(),
        home_vhost,
    })
    .unwrap();
    let bound =
        UserCreatedConsumer::bind(&work_vhost, topology::USER_CREATED, &container).unwrap();
    let bound = Arc::new(bound);

    work.channel().publish(&user_created(b"[]")).await.unwrap();
    let subscription = {
        let bound = Arc::clone(&bound);
        tokio::spawn(async move { bound.subscribe("test").await })
    };
    eventually(|| work.acked_count() == 1).await;
    work.cancel_consumers(topology::USER_CREATED);

    let stats = subscription.await.unwrap().unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(bound.consumer().failures(), 1);
}

#[tokio::test]
async fn binding_an_undeclared_queue_fails() {
    let work = MemoryBroker::new();
    let home = MemoryBroker::new();
    let app = start(&work, &home).await;

    let result = UserCreatedConsumer::bind(
        app.container().work_vhost(),
        topology::USER_SYNCED,
        app.container(),
    );

    assert!(result.is_err());
    app.shutdown().await;
}

#[derive(Default)]
struct SlowConsumer {
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait::async_trait]
impl Consumer for SlowConsumer {
    async fn message_handler(&self, message: Option<&Delivery>) -> Result<(), HandlerError> {
        if message.is_some() {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn on_consume_error(&self) {}
}

#[tokio::test]
async fn shutdown_lets_the_delivery_in_flight_finish_and_ack() {
    let work = MemoryBroker::new();
    let vhost = installed(topology::work(), &work).await;
    let bound = Bound::new(&vhost, topology::USER_CREATED, SlowConsumer::default()).unwrap();
    let bound = Arc::new(bound);
    let mut worker = Worker::new(
        vec![bound.clone() as Arc<dyn Subscriber>],
        Duration::from_millis(20),
        "test",
    );
    worker.start();

    work.channel().publish(&user_created(b"{}")).await.unwrap();
    eventually(|| bound.consumer().started.load(Ordering::SeqCst) == 1).await;
    worker.shutdown().await;

    assert_eq!(bound.consumer().finished.load(Ordering::SeqCst), 1);
    assert_eq!(work.acked_count(), 1);
    assert_eq!(work.unacked_count(), 0);
    assert_eq!(work.backlog_len(topology::USER_CREATED), 0);
    assert_eq!(bound.stats().cancelled, 0);
}

async fn next_delivery(stream: &mut DeliveryStream) -> Delivery {
    use futures::StreamExt;

    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("no delivery in time")
        .expect("stream ended")
}
