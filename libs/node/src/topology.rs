//! The service's two messaging domains.
//!
//! `work` carries internal job and event traffic, `home` carries traffic for
//! external-facing integrations. Both are declared here unless a topology
//! file is configured.

use std::path::Path;

use serde::{Deserialize, Serialize};
use warren_fabric::topology::{Binding, ExchangeDecl, ExchangeKind, QueueDecl, TopologyConfig};
use warren_fabric::Topology;

use crate::error::{Error, Result};

pub const WORK: &str = "work";
pub const HOME: &str = "home";

pub const WORK_EXCHANGE: &str = "work.events";
pub const HOME_EXCHANGE: &str = "home.events";

pub const USER_CREATED: &str = "user.created";
pub const USER_SYNCED: &str = "user.synced";

/// Contents of a topology file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFile {
    pub vhosts: Vec<TopologyConfig>,
}

pub fn work() -> TopologyConfig {
    TopologyConfig {
        name: WORK.to_string(),
        queues: vec![QueueDecl::new(USER_CREATED)],
        exchanges: vec![ExchangeDecl::new(WORK_EXCHANGE, ExchangeKind::Topic)],
        bindings: vec![Binding::new(WORK_EXCHANGE, USER_CREATED)],
    }
}

pub fn home() -> TopologyConfig {
    TopologyConfig {
        name: HOME.to_string(),
        queues: vec![QueueDecl::new(USER_SYNCED)],
        exchanges: vec![ExchangeDecl::new(HOME_EXCHANGE, ExchangeKind::Topic)],
        bindings: vec![Binding::new(HOME_EXCHANGE, USER_SYNCED)],
    }
}

pub fn load(path: &Path) -> Result<TopologyFile> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        Error::configuration(format!("invalid topology file {}: {e}", path.display()))
    })
}

/// Validated `work` and `home` topologies, from a file or the built-ins
pub fn resolve(path: Option<&Path>) -> Result<(Topology, Topology)> {
    let Some(path) = path else {
        return Ok((Topology::try_from(work())?, Topology::try_from(home())?));
    };

    let mut file = load(path)?;
    let mut take = |name: &str| -> Result<Topology> {
        let index = file
            .vhosts
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "topology file {} has no vhost {name:?}",
                    path.display()
                ))
            })?;
        Ok(Topology::try_from(file.vhosts.swap_remove(index))?)
    };
    let work = take(WORK)?;
    let home = take(HOME)?;
    Ok((work, home))
}
