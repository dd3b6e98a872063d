use std::sync::Arc;

use warren_core::{codes, Coded};
use warren_fabric::broker::MemoryBroker;
use warren_fabric::topology::{Binding, ExchangeDecl, ExchangeKind, QueueDecl, TopologyConfig};
use warren_fabric::{Error, Topology, VHost};

fn events() -> ExchangeDecl {
    ExchangeDecl::new("events", ExchangeKind::Topic)
}

#[test]
fn two_vhosts_may_reuse_a_queue_name() {
    let work = VHost::declare(
        "work",
        vec![QueueDecl::new("user.created")],
        vec![events()],
        vec![Binding::new("events", "user.created")],
        Arc::new(MemoryBroker::new()),
    )
    .unwrap();
    let home = VHost::declare(
        "home",
        vec![QueueDecl::new("user.created")],
        vec![events()],
        vec![Binding::new("events", "user.created")],
        Arc::new(MemoryBroker::new()),
    )
    .unwrap();

    assert!(work.topology().has_queue("user.created"));
    assert!(home.topology().has_queue("user.created"));
    assert_ne!(work.name(), home.name());
}

#[test]
fn binding_to_undeclared_queue_is_a_configuration_error() {
    let result = Topology::declare(
        "work",
        vec![QueueDecl::new("user.created")],
        vec![events()],
        vec![Binding::new("events", "user.deleted")],
    );

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(err.code(), codes::CONFIGURATION);
}

#[test]
fn binding_to_undeclared_exchange_is_a_configuration_error() {
    let result = Topology::declare(
        "work",
        vec![QueueDecl::new("user.created")],
        vec![events()],
        vec![Binding::new("audit", "user.created")],
    );

    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn duplicate_names_within_a_vhost_are_rejected() {
    let queues = Topology::declare(
        "work",
        vec![QueueDecl::new("jobs"), QueueDecl::new("jobs")],
        vec![],
        vec![],
    );
    assert!(matches!(queues, Err(Error::Configuration(_))));

    let exchanges = Topology::declare("work", vec![], vec![events(), events()], vec![]);
    assert!(matches!(exchanges, Err(Error::Configuration(_))));
}

#[test]
fn dead_letter_exchange_must_be_declared() {
    let result = Topology::declare(
        "work",
        vec![QueueDecl::new("jobs").dead_letter_exchange("dlx")],
        vec![events()],
        vec![],
    );
    assert!(matches!(result, Err(Error::Configuration(_))));

    let ok = Topology::declare(
        "work",
        vec![QueueDecl::new("jobs").dead_letter_exchange("dlx")],
        vec![ExchangeDecl::new("dlx", ExchangeKind::Fanout)],
        vec![],
    );
    assert!(ok.is_ok());
}

#[test]
fn binding_key_falls_back_to_queue_key_then_name() {
    let topology = Topology::declare(
        "work",
        vec![
            QueueDecl::new("a").routing_key("a.#"),
            QueueDecl::new("b"),
            QueueDecl::new("c").routing_key("ignored"),
        ],
        vec![events()],
        vec![
            Binding::new("events", "a"),
            Binding::new("events", "b"),
            Binding::new("events", "c").routing_key("c.created"),
        ],
    )
    .unwrap();

    let keys: Vec<&str> = topology
        .bindings()
        .iter()
        .map(|b| b.routing_key.as_str())
        .collect();
    assert_eq!(keys, vec!["a.#", "b", "c.created"]);
}

#[test]
fn default_exchange_is_always_available_but_not_declarable() {
    let topology = Topology::declare("work", vec![QueueDecl::new("jobs")], vec![], vec![]).unwrap();
    assert!(topology.has_exchange(""));

    let default_exchange = ExchangeDecl::new("", ExchangeKind::Direct);
    let redeclared = Topology::declare("work", vec![], vec![default_exchange], vec![]);
    assert!(matches!(redeclared, Err(Error::Configuration(_))));
}

#[test]
fn topology_loads_from_json() {
    let config: TopologyConfig = serde_json::from_str(
        r#"{
            "name": "home",
            "queues": [{ "name": "user.synced", "durable": false }],
            "exchanges": [{ "name": "home.events", "kind": "direct" }],
            "bindings": [{ "exchange": "home.events", "queue": "user.synced" }]
        }"#,
    )
    .unwrap();

    let topology = Topology::try_from(config).unwrap();

    assert_eq!(topology.name(), "home");
    assert!(!topology.queue("user.synced").unwrap().durable);
    assert_eq!(topology.exchange("home.events").unwrap().kind, ExchangeKind::Direct);
    assert!(topology.exchange("home.events").unwrap().durable);
}

#[tokio::test]
async fn install_declares_everything_on_the_broker() {
    let broker = MemoryBroker::new();
    let vhost = VHost::declare(
        "work",
        vec![QueueDecl::new("user.created"), QueueDecl::new("audit")],
        vec![events()],
        vec![Binding::new("events", "user.created")],
        Arc::new(broker.clone()),
    )
    .unwrap();

    vhost.install().await.unwrap();
    vhost.install().await.unwrap();

    assert!(broker.has_queue("user.created"));
    assert!(broker.has_queue("audit"));
}
