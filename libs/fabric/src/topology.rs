//! Static messaging topology of a virtual host.
//!
//! A [`Topology`] is validated once at startup and never changes afterwards.
//! Names only need to be unique within one topology, so two vhosts may both
//! declare a queue called `user.created`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The broker's default exchange, which routes by queue name
pub const DEFAULT_EXCHANGE: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    #[default]
    Topic,
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Topic => "topic",
            Self::Fanout => "fanout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDecl {
    pub name: String,
    #[serde(default = "default_durable")]
    pub durable: bool,
    /// Key used by bindings that do not name their own
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub dead_letter_exchange: Option<String>,
}

impl QueueDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            routing_key: None,
            dead_letter_exchange: None,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    pub fn dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDecl {
    pub name: String,
    #[serde(default)]
    pub kind: ExchangeKind,
    #[serde(default = "default_durable")]
    pub durable: bool,
}

impl ExchangeDecl {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub exchange: String,
    pub queue: String,
    #[serde(default)]
    pub routing_key: Option<String>,
}

impl Binding {
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: None,
        }
    }

    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }
}

/// A binding with its routing key resolved against the queue declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

fn default_durable() -> bool {
    true
}

/// Serialized form of one vhost, as read from a topology file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub name: String,
    #[serde(default)]
    pub queues: Vec<QueueDecl>,
    #[serde(default)]
    pub exchanges: Vec<ExchangeDecl>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Validated, immutable topology of one vhost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    name: String,
    queues: Vec<QueueDecl>,
    exchanges: Vec<ExchangeDecl>,
    bindings: Vec<ResolvedBinding>,
}

impl Topology {
    /// Validate and build a topology.
    ///
    /// Fails with [`Error::Configuration`] on an empty or duplicate name, or on
    /// a binding or dead-letter reference to something not declared here.
    pub fn declare(
        name: impl Into<String>,
        queues: Vec<QueueDecl>,
        exchanges: Vec<ExchangeDecl>,
        bindings: Vec<Binding>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::configuration("vhost name must not be empty"));
        }

        let mut queue_names = HashSet::new();
        for queue in &queues {
            if queue.name.is_empty() {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: queue name must not be empty"
                )));
            }
            if !queue_names.insert(queue.name.as_str()) {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: duplicate queue {:?}",
                    queue.name
                )));
            }
        }

        let mut exchange_names = HashSet::new();
        for exchange in &exchanges {
            if exchange.name.is_empty() {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: the default exchange cannot be redeclared"
                )));
            }
            if !exchange_names.insert(exchange.name.as_str()) {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: duplicate exchange {:?}",
                    exchange.name
                )));
            }
        }

        for queue in &queues {
            if let Some(dlx) = &queue.dead_letter_exchange {
                if !exchange_names.contains(dlx.as_str()) {
                    return Err(Error::configuration(format!(
                        "vhost {name:?}: queue {:?} dead-letters to undeclared exchange {dlx:?}",
                        queue.name
                    )));
                }
            }
        }

        let mut resolved = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if !exchange_names.contains(binding.exchange.as_str()) {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: binding references undeclared exchange {:?}",
                    binding.exchange
                )));
            }
            let Some(queue) = queues.iter().find(|q| q.name == binding.queue) else {
                return Err(Error::configuration(format!(
                    "vhost {name:?}: binding references undeclared queue {:?}",
                    binding.queue
                )));
            };
            let routing_key = binding
                .routing_key
                .or_else(|| queue.routing_key.clone())
                .unwrap_or_else(|| queue.name.clone());
            resolved.push(ResolvedBinding {
                exchange: binding.exchange,
                queue: binding.queue,
                routing_key,
            });
        }

        Ok(Self {
            name,
            queues,
            exchanges,
            bindings: resolved,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queues(&self) -> &[QueueDecl] {
        &self.queues
    }

    pub fn exchanges(&self) -> &[ExchangeDecl] {
        &self.exchanges
    }

    pub fn bindings(&self) -> &[ResolvedBinding] {
        &self.bindings
    }

    pub fn queue(&self, name: &str) -> Option<&QueueDecl> {
        self.queues.iter().find(|q| q.name == name)
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeDecl> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.queue(name).is_some()
    }

    /// True for declared exchanges and for the default exchange
    pub fn has_exchange(&self, name: &str) -> bool {
        name == DEFAULT_EXCHANGE || self.exchange(name).is_some()
    }
}

impl TryFrom<TopologyConfig> for Topology {
    type Error = Error;

    fn try_from(config: TopologyConfig) -> Result<Self> {
        Self::declare(config.name, config.queues, config.exchanges, config.bindings)
    }
}
