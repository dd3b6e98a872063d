use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use warren_core::HandlerError;
use warren_fabric::codec::JsonCodec;
use warren_fabric::{Bound, Consumer, Delivery, VHost};

use crate::container::Container;
use crate::error::Result;
use crate::services::{UserCreated, UserService};

/// Enriches freshly created users from `work` and announces them on `home`
pub struct UserCreatedConsumer {
    user_service: Arc<UserService>,
    failures: AtomicU64,
}

impl UserCreatedConsumer {
    pub fn new(user_service: Arc<UserService>) -> Self {
        Self {
            user_service,
            failures: AtomicU64::new(0),
        }
    }

    pub fn bind(vhost: &VHost, queue: &str, container: &Container) -> Result<Bound<Self>> {
        Ok(Bound::new(vhost, queue, Self::new(container.user_service()))?)
    }

    /// Handler invocations that ended in an error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Consumer for UserCreatedConsumer {
    async fn message_handler(
        &self,
        message: Option<&Delivery>,
    ) -> std::result::Result<(), HandlerError> {
        let Some(message) = message else {
            info!("user.created subscription cancelled");
            return Ok(());
        };
        let event: UserCreated = message.decode(&JsonCodec)?;
        self.user_service.sync_user(&event).await?;
        Ok(())
    }

    fn on_consume_error(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(failures, "user.created delivery dropped after failure");
    }
}
