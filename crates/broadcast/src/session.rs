//! One managed gateway connection per credential.
//!
//! The lifecycle value lives in a `watch` channel: it is both the state
//! machine and the readiness gate. Gateway callbacks reach it only through
//! [`AttemptSink`], which can request the four lifecycle transitions and
//! nothing else. Each connect attempt is numbered and callbacks from a
//! superseded attempt are ignored.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    herald_channels::{ConnectError, GatewayClient, GatewayConnector, Identity, LifecycleSink},
    serde::Serialize,
    tokio::{
        sync::{Mutex, watch},
        time::Instant,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, histogram, labels, session as session_metrics};

use crate::{
    credential::Credential,
    error::{Error, Result},
};

/// Why a session ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    InvalidCredential(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Carries the identity, so identity exists exactly when ready.
    Ready(Identity),
    Failed(FailureReason),
}

impl SessionState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[derive(Debug, Clone)]
struct Lifecycle {
    attempt: u64,
    state: SessionState,
    /// Set while a timed-out attempt is being torn down; a late `ready`
    /// for that attempt must not revive it.
    retiring: bool,
    connecting_since: Option<Instant>,
}

/// Result of a successful `ensure_ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub identity: Identity,
    /// The session was already ready when the call started.
    pub reused: bool,
}

/// Point-in-time view of a session for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub fingerprint: String,
    pub state: &'static str,
    pub attempt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

struct Connection {
    attempt: u64,
    client: Arc<dyn GatewayClient>,
}

pub struct Session {
    credential: Credential,
    connector: Arc<dyn GatewayConnector>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
    /// Serializes connect and teardown so only one attempt runs at a time.
    connect_lock: Mutex<()>,
    connection: RwLock<Option<Connection>>,
}

impl Session {
    #[must_use]
    pub fn new(credential: Credential, connector: Arc<dyn GatewayConnector>) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle {
            attempt: 0,
            state: SessionState::Disconnected,
            retiring: false,
            connecting_since: None,
        });
        Self {
            credential,
            connector,
            lifecycle: Arc::new(lifecycle),
            connect_lock: Mutex::new(()),
            connection: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle.borrow().state.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.lifecycle.borrow().state.identity().cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let lifecycle = self.lifecycle.borrow();
        SessionSnapshot {
            fingerprint: self.credential.fingerprint(),
            state: lifecycle.state.label(),
            attempt: lifecycle.attempt,
            identity: lifecycle.state.identity().cloned(),
            failure: match &lifecycle.state {
                SessionState::Failed(FailureReason::Timeout) => Some("timeout".into()),
                SessionState::Failed(FailureReason::InvalidCredential(reason))
                | SessionState::Failed(FailureReason::Error(reason)) => Some(reason.clone()),
                _ => None,
            },
        }
    }

    /// The live client, only while the session is ready.
    pub fn ready_client(&self) -> Result<Arc<dyn GatewayClient>> {
        let attempt = {
            let lifecycle = self.lifecycle.borrow();
            if !lifecycle.state.is_ready() {
                return Err(Error::NotReady);
            }
            lifecycle.attempt
        };
        let connection = self.connection.read().unwrap_or_else(|e| e.into_inner());
        match connection.as_ref() {
            Some(conn) if conn.attempt == attempt => Ok(Arc::clone(&conn.client)),
            _ => Err(Error::NotReady),
        }
    }

    /// Bring the session to `Ready`, connecting if needed. The connect call
    /// and the handshake share one deadline `timeout` from now.
    pub async fn ensure_ready(&self, timeout: Duration) -> Result<SessionInfo> {
        if let Some(identity) = self.identity() {
            debug!(credential = %self.credential.fingerprint(), "session already ready");
            return Ok(SessionInfo {
                identity,
                reused: true,
            });
        }

        let deadline = Instant::now() + timeout;
        self.start_if_idle(deadline, timeout).await?;

        let mut gate = self.lifecycle.subscribe();
        let waited = tokio::time::timeout_at(deadline, async {
            gate.wait_for(|lc| !matches!(lc.state, SessionState::Connecting))
                .await
                .map(|_| ())
        })
        .await;

        self.settle(waited.is_err(), timeout).await
    }

    /// Start a connect attempt unless one is running or the session is ready.
    async fn start_if_idle(&self, deadline: Instant, timeout: Duration) -> Result<()> {
        // A connect in progress holds the lock until its own deadline at most.
        let Ok(_guard) = tokio::time::timeout_at(deadline, self.connect_lock.lock()).await else {
            debug!(
                credential = %self.credential.fingerprint(),
                "deadline passed waiting for connect in progress"
            );
            return Err(Error::Timeout { after: timeout });
        };

        if matches!(
            self.lifecycle.borrow().state,
            SessionState::Connecting | SessionState::Ready(_)
        ) {
            return Ok(());
        }

        // At most one live connection: retire whatever the last attempt left.
        if let Some(old) = self.take_connection() {
            debug!(
                credential = %self.credential.fingerprint(),
                attempt = old.attempt,
                "closing previous connection before reconnecting"
            );
            old.client.close().await;
        }

        let mut attempt = 0;
        self.lifecycle.send_modify(|lc| {
            lc.attempt += 1;
            lc.state = SessionState::Connecting;
            lc.retiring = false;
            lc.connecting_since = Some(Instant::now());
            attempt = lc.attempt;
        });

        info!(
            credential = %self.credential.fingerprint(),
            attempt,
            "connecting session"
        );

        let sink = Arc::new(AttemptSink {
            attempt,
            fingerprint: self.credential.fingerprint(),
            lifecycle: Arc::clone(&self.lifecycle),
        });

        let connecting = self.connector.connect(self.credential.secret(), sink);
        let Ok(outcome) = tokio::time::timeout_at(deadline, connecting).await else {
            self.fail(attempt, FailureReason::Timeout);
            warn!(
                credential = %self.credential.fingerprint(),
                attempt,
                timeout_secs = timeout.as_secs_f64(),
                "gateway connect did not return in time"
            );
            record_outcome("timeout");
            return Err(Error::Timeout { after: timeout });
        };

        match outcome {
            Ok(client) => {
                let mut connection = self.connection.write().unwrap_or_else(|e| e.into_inner());
                *connection = Some(Connection { attempt, client });
                Ok(())
            },
            Err(ConnectError::InvalidCredential { reason }) => {
                warn!(
                    credential = %self.credential.fingerprint(),
                    attempt,
                    %reason,
                    "credential rejected"
                );
                self.fail(attempt, FailureReason::InvalidCredential(reason.clone()));
                record_outcome("invalid_credential");
                Err(Error::InvalidCredential { reason })
            },
            Err(e) => {
                warn!(
                    credential = %self.credential.fingerprint(),
                    attempt,
                    error = %e,
                    "session connect failed"
                );
                self.fail(attempt, FailureReason::Error(e.to_string()));
                record_outcome("error");
                Err(Error::unexpected_with("gateway connect failed", e))
            },
        }
    }

    /// Turn the lifecycle after the wait into a result. The current state is
    /// authoritative, so readiness that lands right at the timeout still
    /// counts as success.
    async fn settle(&self, timed_out: bool, timeout: Duration) -> Result<SessionInfo> {
        let (attempt, state) = {
            let lc = self.lifecycle.borrow();
            (lc.attempt, lc.state.clone())
        };

        match state {
            SessionState::Ready(identity) => Ok(SessionInfo {
                identity,
                reused: false,
            }),
            SessionState::Connecting if timed_out => self.expire(timeout).await,
            SessionState::Connecting => Err(Error::unexpected("readiness gate closed")),
            SessionState::Failed(reason) => {
                self.release(attempt).await;
                Err(failure_error(reason, timeout))
            },
            SessionState::Disconnected => {
                self.release(attempt).await;
                Err(Error::unexpected("connection closed before becoming ready"))
            },
        }
    }

    /// Readiness timed out: close the client, then mark the attempt failed.
    async fn expire(&self, timeout: Duration) -> Result<SessionInfo> {
        let _guard = self.connect_lock.lock().await;

        let attempt = {
            let lc = self.lifecycle.borrow();
            match &lc.state {
                SessionState::Ready(identity) => {
                    return Ok(SessionInfo {
                        identity: identity.clone(),
                        reused: false,
                    });
                },
                SessionState::Connecting => lc.attempt,
                SessionState::Failed(reason) => {
                    return Err(failure_error(reason.clone(), timeout));
                },
                SessionState::Disconnected => {
                    return Err(Error::unexpected("connection closed before becoming ready"));
                },
            }
        };

        self.lifecycle.send_if_modified(|lc| {
            if lc.attempt == attempt {
                lc.retiring = true;
            }
            false
        });

        if let Some(conn) = self.take_connection() {
            conn.client.close().await;
        }

        self.lifecycle.send_if_modified(|lc| {
            if lc.attempt != attempt || !matches!(lc.state, SessionState::Connecting) {
                return false;
            }
            lc.state = SessionState::Failed(FailureReason::Timeout);
            lc.connecting_since = None;
            true
        });

        warn!(
            credential = %self.credential.fingerprint(),
            attempt,
            timeout_secs = timeout.as_secs_f64(),
            "session did not become ready in time"
        );
        record_outcome("timeout");
        Err(Error::Timeout { after: timeout })
    }

    /// Close the connection belonging to a failed attempt, if still held.
    async fn release(&self, attempt: u64) {
        let _guard = self.connect_lock.lock().await;
        let conn = {
            let mut connection = self.connection.write().unwrap_or_else(|e| e.into_inner());
            match connection.as_ref() {
                Some(conn) if conn.attempt == attempt => connection.take(),
                _ => None,
            }
        };
        if let Some(conn) = conn {
            conn.client.close().await;
        }
    }

    fn take_connection(&self) -> Option<Connection> {
        self.connection
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn fail(&self, attempt: u64, reason: FailureReason) {
        self.lifecycle.send_if_modified(|lc| {
            if lc.attempt != attempt {
                return false;
            }
            lc.state = SessionState::Failed(reason);
            lc.connecting_since = None;
            true
        });
    }
}

fn failure_error(reason: FailureReason, timeout: Duration) -> Error {
    match reason {
        FailureReason::Timeout => Error::Timeout { after: timeout },
        FailureReason::InvalidCredential(reason) => Error::InvalidCredential { reason },
        FailureReason::Error(message) => Error::unexpected(message),
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_outcome(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(session_metrics::CONNECT_ATTEMPTS_TOTAL, labels::OUTCOME => outcome).increment(1);
}

// ── Lifecycle callbacks ─────────────────────────────────────────────────────

/// Lifecycle sink handed to the gateway for one connect attempt.
struct AttemptSink {
    attempt: u64,
    fingerprint: String,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
}

impl AttemptSink {
    fn transition(&self, event: &str, apply: impl FnOnce(&mut Lifecycle) -> bool) {
        let applied = self.lifecycle.send_if_modified(|lc| {
            if lc.attempt != self.attempt {
                return false;
            }
            apply(lc)
        });
        if applied {
            debug!(
                credential = %self.fingerprint,
                attempt = self.attempt,
                event,
                "session lifecycle transition"
            );
        } else {
            debug!(
                credential = %self.fingerprint,
                attempt = self.attempt,
                event,
                "ignored lifecycle event"
            );
        }
    }
}

impl LifecycleSink for AttemptSink {
    fn ready(&self, identity: Identity) {
        info!(
            credential = %self.fingerprint,
            attempt = self.attempt,
            name = %identity.name,
            id = %identity.id,
            "session ready"
        );
        self.transition("ready", |lc| {
            if lc.retiring || !matches!(lc.state, SessionState::Connecting | SessionState::Ready(_))
            {
                return false;
            }
            if let Some(since) = lc.connecting_since.take() {
                #[cfg(feature = "metrics")]
                histogram!(session_metrics::READY_DURATION_SECONDS)
                    .record(since.elapsed().as_secs_f64());
                debug!(elapsed_ms = since.elapsed().as_millis() as u64, "handshake completed");
                record_outcome("ready");
            }
            lc.state = SessionState::Ready(identity);
            true
        });
    }

    fn disconnected(&self) {
        self.transition("disconnected", |lc| {
            if !lc.state.is_ready() {
                return false;
            }
            info!(credential = %self.fingerprint, "session disconnected, waiting for reconnect");
            #[cfg(feature = "metrics")]
            counter!(session_metrics::DISCONNECTS_TOTAL).increment(1);
            lc.state = SessionState::Connecting;
            lc.connecting_since = Some(Instant::now());
            true
        });
    }

    fn rejected(&self, reason: &str) {
        warn!(credential = %self.fingerprint, %reason, "gateway rejected credential");
        self.transition("rejected", |lc| {
            if !matches!(lc.state, SessionState::Connecting | SessionState::Ready(_)) {
                return false;
            }
            lc.state = SessionState::Failed(FailureReason::InvalidCredential(reason.to_string()));
            lc.connecting_since = None;
            true
        });
    }

    fn closed(&self, reason: &str) {
        info!(credential = %self.fingerprint, %reason, "gateway connection loop ended");
        self.transition("closed", |lc| {
            lc.state = match lc.state {
                SessionState::Ready(_) => SessionState::Disconnected,
                SessionState::Connecting => {
                    SessionState::Failed(FailureReason::Error(format!("connection closed: {reason}")))
                },
                _ => return false,
            };
            lc.connecting_since = None;
            true
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeConnector, identity},
    };

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn session(connector: &Arc<FakeConnector>) -> Session {
        Session::new(
            Credential::new("test-token").unwrap(),
            Arc::clone(connector) as Arc<dyn GatewayConnector>,
        )
    }

    #[tokio::test]
    async fn new_session_is_disconnected() {
        let connector = FakeConnector::ready("herald");
        let session = session(&connector);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.identity().is_none());
        assert!(matches!(session.ready_client(), Err(Error::NotReady)));
    }

    #[tokio::test]
    async fn ensure_ready_connects_once() {
        let connector = FakeConnector::ready("herald");
        let session = session(&connector);

        let first = session.ensure_ready(TIMEOUT).await.unwrap();
        assert_eq!(first.identity, identity("herald"));
        assert!(!first.reused);

        let second = session.ensure_ready(TIMEOUT).await.unwrap();
        assert!(second.reused);
        let third = session.ensure_ready(TIMEOUT).await.unwrap();
        assert!(third.reused);

        assert_eq!(connector.connects(), 1);
        assert!(session.ready_client().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_that_never_completes_times_out_as_failed() {
        let connector = FakeConnector::silent();
        let session = session(&connector);

        let err = session.ensure_ready(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { after } if after == TIMEOUT));
        assert_eq!(session.state(), SessionState::Failed(FailureReason::Timeout));
        assert_eq!(connector.client().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_session_retries_with_fresh_connection() {
        let connector = FakeConnector::silent();
        let session = session(&connector);
        session.ensure_ready(TIMEOUT).await.unwrap_err();

        connector.set_ready_on_connect(identity("herald"));
        let info = session.ensure_ready(TIMEOUT).await.unwrap();

        assert!(!info.reused);
        assert_eq!(connector.connects(), 2);
        assert_eq!(session.snapshot().attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_ready_from_timed_out_attempt_is_ignored() {
        let connector = FakeConnector::silent();
        let session = session(&connector);
        session.ensure_ready(TIMEOUT).await.unwrap_err();

        connector.sink(0).ready(identity("late"));

        assert_eq!(session.state(), SessionState::Failed(FailureReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_before_timeout_resolves_waiter() {
        let connector = FakeConnector::ready_after(Duration::from_secs(3), "herald");
        let session = session(&connector);

        let start = Instant::now();
        let info = session.ensure_ready(TIMEOUT).await.unwrap();

        assert_eq!(info.identity.name, "herald");
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_observed_after_timeout_counts_as_success() {
        let connector = FakeConnector::silent();
        let session = session(&connector);
        session
            .start_if_idle(Instant::now() + TIMEOUT, TIMEOUT)
            .await
            .unwrap();

        // The gate fired on the boundary: the wait reported a timeout but the
        // state already says ready.
        connector.sink(0).ready(identity("herald"));
        let info = session.settle(true, TIMEOUT).await.unwrap();

        assert_eq!(info.identity.name, "herald");
        assert_eq!(connector.client().closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connect_times_out_and_releases_the_session() {
        let connector = FakeConnector::stalled();
        let session = session(&connector);

        let start = Instant::now();
        let err = session.ensure_ready(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { after } if after == TIMEOUT));
        assert!(start.elapsed() >= TIMEOUT);
        assert!(start.elapsed() < TIMEOUT + Duration::from_secs(1));
        assert_eq!(session.state(), SessionState::Failed(FailureReason::Timeout));

        // The abandoned attempt cannot revive the session.
        connector.sink(0).ready(identity("late"));
        assert_eq!(session.state(), SessionState::Failed(FailureReason::Timeout));

        connector.set_ready_on_connect(identity("herald"));
        let info = session.ensure_ready(TIMEOUT).await.unwrap();
        assert_eq!(info.identity.name, "herald");
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_behind_stalled_connect_keeps_its_own_deadline() {
        let connector = FakeConnector::stalled();
        let session = Arc::new(session(&connector));

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.ensure_ready(TIMEOUT).await })
        };
        while connector.connects() == 0 {
            tokio::task::yield_now().await;
        }

        let short = Duration::from_secs(1);
        let start = Instant::now();
        let err = session.ensure_ready(short).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { after } if after == short));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Connecting);

        assert!(matches!(first.await.unwrap(), Err(Error::Timeout { .. })));
        assert_eq!(session.state(), SessionState::Failed(FailureReason::Timeout));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn rejected_at_connect_is_invalid_credential() {
        let connector = FakeConnector::rejecting("401: Unauthorized");
        let session = session(&connector);

        let err = session.ensure_ready(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, Error::InvalidCredential { ref reason } if reason == "401: Unauthorized"));
        assert!(matches!(
            session.state(),
            SessionState::Failed(FailureReason::InvalidCredential(_))
        ));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_during_handshake_closes_client() {
        let connector = FakeConnector::silent();
        let session = session(&connector);
        let connector_bg = Arc::clone(&connector);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            connector_bg.sink(0).rejected("Authentication failed");
        });

        let err = session.ensure_ready(TIMEOUT).await.unwrap_err();

        assert!(matches!(err, Error::InvalidCredential { .. }));
        assert_eq!(connector.client().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_returns_to_connecting_and_waits_for_reconnect() {
        let connector = FakeConnector::ready("herald");
        let session = session(&connector);
        session.ensure_ready(TIMEOUT).await.unwrap();

        connector.sink(0).disconnected();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.identity().is_none());
        assert!(matches!(session.ready_client(), Err(Error::NotReady)));

        let connector_bg = Arc::clone(&connector);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            connector_bg.sink(0).ready(identity("herald"));
        });

        let info = session.ensure_ready(TIMEOUT).await.unwrap();
        assert!(!info.reused);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn closed_after_ready_allows_reconnect() {
        let connector = FakeConnector::ready("herald");
        let session = session(&connector);
        session.ensure_ready(TIMEOUT).await.unwrap();

        connector.sink(0).closed("shard manager stopped");
        assert_eq!(session.state(), SessionState::Disconnected);

        session.ensure_ready(TIMEOUT).await.unwrap();
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.client().closes(), 1);
    }

    #[tokio::test]
    async fn connect_error_is_unexpected() {
        let connector = FakeConnector::failing("dns lookup failed");
        let session = session(&connector);

        let err = session.ensure_ready(TIMEOUT).await.unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::UnexpectedError);
        assert!(err.to_string().contains("dns lookup failed"));
        assert_eq!(session.snapshot().state, "failed");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_connect() {
        let connector = FakeConnector::ready_after(Duration::from_millis(50), "herald");
        let session = Arc::new(session(&connector));

        let calls = (0..8).map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.ensure_ready(TIMEOUT).await })
        });
        for call in calls.collect::<Vec<_>>() {
            call.await.unwrap().unwrap();
        }

        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn snapshot_reports_failure_reason() {
        let connector = FakeConnector::silent();
        let session = session(&connector);
        session.fail(0, FailureReason::Error("boom".into()));

        let snap = session.snapshot();
        assert_eq!(snap.state, "failed");
        assert_eq!(snap.failure.as_deref(), Some("boom"));
        assert!(snap.identity.is_none());
    }
}
