use warren_fabric::{Producer, VHost};

use crate::error::Result;
use crate::services::UserCreated;
use crate::topology::{USER_CREATED, WORK_EXCHANGE};

/// Publishes user lifecycle events on the `work` vhost
pub struct UserProducer {
    producer: Producer,
}

impl UserProducer {
    pub fn bind(work: &VHost) -> Result<Self> {
        Ok(Self {
            producer: Producer::bind(work, WORK_EXCHANGE)?,
        })
    }

    pub async fn user_created(&self, event: &UserCreated) -> Result<()> {
        self.producer.publish(USER_CREATED, event).await?;
        Ok(())
    }
}
