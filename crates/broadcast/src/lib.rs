//! Session lifecycle and rate-limited broadcast for herald.
//!
//! A [`BroadcastService`] owns one [`Session`] per credential. Sessions wrap a
//! long-lived gateway connection behind a readiness gate; the
//! [`BroadcastDispatcher`] fans a message out to every recipient the session
//! can reach, one paced send at a time, skipping recipients still inside
//! their cooldown window.

pub mod cooldown;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod service;
pub mod session;
pub mod settings;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing;

pub use {
    cooldown::{CooldownClaim, CooldownStore},
    credential::{Credential, CredentialKey},
    dispatcher::{BroadcastDispatcher, BroadcastResult},
    error::{Error, ErrorKind, Result},
    registry::SessionRegistry,
    service::BroadcastService,
    session::{FailureReason, Session, SessionInfo, SessionSnapshot, SessionState},
    settings::{BroadcastSettings, ServiceSettings, SessionSettings},
};
