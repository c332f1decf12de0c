//! Process-wide map from credential to its managed session.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {herald_channels::GatewayConnector, tracing::debug};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, gauge, session as session_metrics};

use crate::{
    credential::{Credential, CredentialKey},
    session::{Session, SessionSnapshot},
};

/// At most one [`Session`] per credential for the lifetime of the process.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<CredentialKey, Arc<Session>>>,
    connector: Arc<dyn GatewayConnector>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector,
        }
    }

    /// Return the session for `credential`, creating it on first use.
    /// Concurrent first calls for the same credential yield the same session.
    pub fn get_or_create(&self, credential: &Credential) -> Arc<Session> {
        if let Some(session) = self.lookup(&credential.key()) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let mut created = false;
        let session = sessions
            .entry(credential.key())
            .or_insert_with(|| {
                created = true;
                Arc::new(Session::new(
                    credential.clone(),
                    Arc::clone(&self.connector),
                ))
            })
            .clone();

        if created {
            debug!(
                credential = %credential.fingerprint(),
                sessions = sessions.len(),
                "registered new session"
            );
            #[cfg(feature = "metrics")]
            {
                counter!(session_metrics::CREATED_TOTAL).increment(1);
                gauge!(session_metrics::REGISTERED).set(sessions.len() as f64);
            }
        }
        session
    }

    /// Existing session for `key`. Never creates one.
    #[must_use]
    pub fn lookup(&self, key: &CredentialKey) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<_> = sessions.iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        snapshots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
