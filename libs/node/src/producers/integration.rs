use warren_fabric::{Producer, VHost};

use crate::error::Result;
use crate::services::UserSynced;
use crate::topology::{HOME_EXCHANGE, USER_SYNCED};

/// Publishes to external-facing integrations on the `home` vhost
pub struct IntegrationProducer {
    producer: Producer,
}

impl IntegrationProducer {
    pub fn bind(home: &VHost) -> Result<Self> {
        Ok(Self {
            producer: Producer::bind(home, HOME_EXCHANGE)?,
        })
    }

    pub async fn user_synced(&self, event: &UserSynced) -> Result<()> {
        self.producer.publish(USER_SYNCED, event).await?;
        Ok(())
    }
}
