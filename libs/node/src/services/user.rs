use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::producers::{IntegrationProducer, UserProducer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

/// Published on `work` after a user is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: u64,
    pub email: String,
}

/// Published on `home` once a user has been enriched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSynced {
    pub id: u64,
    pub company: Option<String>,
}

/// User persistence
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User>;

    async fn get(&self, id: u64) -> Result<Option<User>>;

    async fn update(&self, user: User) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<BTreeMap<u64, User>>,
    next_id: AtomicU64,
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User {
            id,
            name: user.name,
            email: user.email,
            company: None,
        };
        self.users.write().await.insert(id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: u64) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(Error::UserNotFound(user.id)),
        }
    }
}

/// Downstream directory that knows which company an address belongs to
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn company_for(&self, email: &str) -> Result<Option<String>>;
}

/// Directory keyed by e-mail domain
#[derive(Debug, Default)]
pub struct StaticDirectory {
    companies: HashMap<String, String>,
    unavailable: bool,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, domain: impl Into<String>, company: impl Into<String>) -> Self {
        self.companies.insert(domain.into(), company.into());
        self
    }

    /// Every lookup fails with an integration error
    pub fn unavailable() -> Self {
        Self {
            companies: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for StaticDirectory {
    async fn company_for(&self, email: &str) -> Result<Option<String>> {
        if self.unavailable {
            return Err(Error::integration("user directory is unavailable"));
        }
        let domain = email.rsplit_once('@').map(|(_, domain)| domain);
        Ok(domain.and_then(|d| self.companies.get(d).cloned()))
    }
}

/// Everything the user service depends on
pub struct ServiceContext {
    pub user_store: Arc<dyn UserStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub user_producer: UserProducer,
    pub integration_producer: IntegrationProducer,
}

pub struct UserService {
    ctx: ServiceContext,
}

impl UserService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Store a new user and announce it on `work`.
    ///
    /// A failed announcement is returned to the caller; the user stays stored.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        validate(&new_user)?;
        let user = self.ctx.user_store.insert(new_user).await?;
        self.ctx
            .user_producer
            .user_created(&UserCreated {
                id: user.id,
                email: user.email.clone(),
            })
            .await?;
        info!(user_id = user.id, "created user");
        Ok(user)
    }

    pub async fn get_user(&self, id: u64) -> Result<User> {
        self.ctx
            .user_store
            .get(id)
            .await?
            .ok_or(Error::UserNotFound(id))
    }

    /// Enrich a created user from the directory and announce it on `home`
    pub async fn sync_user(&self, event: &UserCreated) -> Result<User> {
        let mut user = self.get_user(event.id).await?;
        user.company = self.ctx.directory.company_for(&user.email).await?;
        self.ctx.user_store.update(user.clone()).await?;
        self.ctx
            .integration_producer
            .user_synced(&UserSynced {
                id: user.id,
                company: user.company.clone(),
            })
            .await?;
        debug!(user_id = user.id, company = ?user.company, "synced user");
        Ok(user)
    }
}

fn validate(user: &NewUser) -> Result<()> {
    if user.name.trim().is_empty() {
        return Err(Error::validation("name must not be empty"));
    }
    match user.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::validation(format!("{:?} is not an e-mail address", user.email))),
    }
}
