//! The two operations exposed to request-routing layers.

use std::sync::Arc;

use {herald_channels::GatewayConnector, tracing::debug};

use crate::{
    credential::Credential,
    dispatcher::{BroadcastDispatcher, BroadcastResult},
    error::{Error, Result},
    registry::SessionRegistry,
    session::{SessionInfo, SessionSnapshot},
    settings::ServiceSettings,
};

/// Session registry plus broadcast dispatcher behind a credential-keyed API.
///
/// Sessions and cooldown entries live as long as the service. Callers that
/// want reuse across requests must share one instance.
pub struct BroadcastService {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    settings: ServiceSettings,
}

impl BroadcastService {
    #[must_use]
    pub fn new(connector: Arc<dyn GatewayConnector>, settings: ServiceSettings) -> Self {
        Self {
            registry: SessionRegistry::new(connector),
            dispatcher: BroadcastDispatcher::new(settings.broadcast),
            settings,
        }
    }

    /// Resolve or create the session for `token` and wait until it is ready.
    pub async fn ensure_session_ready(&self, token: &str) -> Result<SessionInfo> {
        let credential = Credential::new(token)?;
        let session = self.registry.get_or_create(&credential);
        session.ensure_ready(self.settings.session.ready_timeout).await
    }

    /// Broadcast `message` through the existing ready session for `token`.
    /// Never creates or connects a session.
    pub async fn broadcast(&self, token: &str, message: &str) -> Result<BroadcastResult> {
        let credential = Credential::new(token)?;
        if message.trim().is_empty() {
            return Err(Error::missing_argument("message"));
        }

        let Some(session) = self.registry.lookup(&credential.key()) else {
            debug!(credential = %credential.fingerprint(), "broadcast for unknown session");
            return Err(Error::NotReady);
        };
        self.dispatcher.broadcast(&session, message).await
    }

    /// Diagnostic view of the session for `token`, without connecting.
    pub fn status(&self, token: &str) -> Result<Option<SessionSnapshot>> {
        let credential = Credential::new(token)?;
        Ok(self
            .registry
            .lookup(&credential.key())
            .map(|session| session.snapshot()))
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshots()
    }
}
