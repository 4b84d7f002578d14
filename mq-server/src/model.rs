//! Service global context

use std::sync::Arc;

use color_eyre::Result;
use subscriptions::{AccessGate, Clock, Decision, Subscriber, SystemClock};
use tracing::{info, instrument};

use crate::auth::{AdminAuth, Credentials, Session, Sessions};
use crate::config::{self, Config};
use crate::error::Error;
use crate::store::FileStore;

struct ModelInner {
    /// Users document
    store: FileStore,
    /// Subscriber sessions
    sessions: Sessions,
    /// Administrator sessions
    admin: AdminAuth,
    /// Subscriber login
    credentials: Credentials,
    /// Document access decisions
    gate: AccessGate,
    /// Gated documents location
    content: config::Content,
    clock: Arc<dyn Clock>,
}

/// Shared state of the service
#[derive(Clone)]
pub struct Model(Arc<ModelInner>);

impl Model {
    /// Context from configuration, running on the wall clock
    pub async fn with_config(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = FileStore::open(&config.store).await?;
        let sessions = Sessions::with_key(config.auth.session_key.as_deref())?;
        if config.auth.session_key.is_none() {
            info!("No session key configured, sessions will not survive a restart");
        }

        let admin = AdminAuth::new(&config.auth.admin)?;
        let gate = AccessGate::new(config.content.count, config.content.free.iter().copied());

        Ok(Self(Arc::new(ModelInner {
            store,
            sessions,
            admin,
            credentials: Credentials::new()?,
            gate,
            content: config.content.clone(),
            clock,
        })))
    }

    pub fn store(&self) -> &FileStore {
        &self.0.store
    }

    pub fn sessions(&self) -> &Sessions {
        &self.0.sessions
    }

    pub fn admin(&self) -> &AdminAuth {
        &self.0.admin
    }

    pub fn gate(&self) -> &AccessGate {
        &self.0.gate
    }

    pub fn content(&self) -> &config::Content {
        &self.0.content
    }

    pub fn clock(&self) -> &dyn Clock {
        self.0.clock.as_ref()
    }

    /// Validates subscriber credentials and issues a session
    #[instrument(skip(self, pin))]
    pub async fn login(&self, username: &str, pin: &str) -> Result<(Session, Subscriber), Error> {
        let snapshot = self.store().snapshot();
        let now = self.clock().now();

        let record = self
            .0
            .credentials
            .validate(&snapshot.users, username, pin, now.date_naive())
            .await
            .ok_or(Error::InvalidCredentials)?;

        self.cleanup().await;
        let session = self.sessions().issue(&record.username, now)?;
        info!(username, "Subscriber logged in");
        Ok((session, record.subscriber()))
    }

    /// Decides access to a document for the session holder
    pub fn decide(&self, resource_id: u32, session: Option<&Session>) -> Decision {
        let snapshot = self.store().snapshot();
        self.gate().decide(
            resource_id,
            session.map(|session| session.username.as_str()),
            &snapshot.users,
            self.clock().today(),
        )
    }

    /// Drops expired server-side session state
    pub async fn cleanup(&self) {
        let now = self.clock().now();
        self.sessions().cleanup(now).await;
        self.admin().cleanup(now).await;
    }
}
