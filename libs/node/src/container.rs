use std::sync::Arc;

use warren_fabric::{Subscriber, VHost};

use crate::consumers::UserCreatedConsumer;
use crate::error::Result;
use crate::producers::{IntegrationProducer, UserProducer};
use crate::services::{ServiceContext, UserDirectory, UserService, UserStore};
use crate::topology::USER_CREATED;

pub struct ContainerConfig {
    pub user_store: Arc<dyn UserStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub work_vhost: VHost,
    pub home_vhost: VHost,
}

/// Wires services, producers and consumers together
pub struct Container {
    user_service: Arc<UserService>,
    work_vhost: VHost,
    home_vhost: VHost,
}

impl Container {
    pub fn new(config: ContainerConfig) -> Result<Self> {
        let ctx = ServiceContext {
            user_store: config.user_store,
            directory: config.directory,
            user_producer: UserProducer::bind(&config.work_vhost)?,
            integration_producer: IntegrationProducer::bind(&config.home_vhost)?,
        };
        Ok(Self {
            user_service: Arc::new(UserService::new(ctx)),
            work_vhost: config.work_vhost,
            home_vhost: config.home_vhost,
        })
    }

    pub fn user_service(&self) -> Arc<UserService> {
        Arc::clone(&self.user_service)
    }

    pub fn work_vhost(&self) -> &VHost {
        &self.work_vhost
    }

    pub fn home_vhost(&self) -> &VHost {
        &self.home_vhost
    }

    /// Every consumer the worker runs
    pub fn consumers(&self) -> Result<Vec<Arc<dyn Subscriber>>> {
        let user_created: Arc<dyn Subscriber> =
            Arc::new(UserCreatedConsumer::bind(&self.work_vhost, USER_CREATED, self)?);
        Ok(vec![user_created])
    }
}
