//! The warren service.
//!
//! Wires the user service to the messaging fabric: a `work` vhost carrying
//! internal events and a `home` vhost for external integrations. The
//! [`Application`] installs both topologies, builds the [`Container`] and
//! runs every consumer under the [`Worker`] supervisor.

pub mod app;
pub mod config;
pub mod consumers;
pub mod container;
pub mod error;
pub mod producers;
pub mod services;
pub mod telemetry;
pub mod topology;
pub mod worker;

pub use app::Application;
pub use config::{AppConfig, BrokerKind, LogFormat};
pub use container::{Container, ContainerConfig};
pub use error::{Error, Result};
pub use worker::Worker;
