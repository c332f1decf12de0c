use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

use crate::{ConnectError, DeliveryError, Result};

// ── Remote-side model ───────────────────────────────────────────────────────

/// Opaque identifier of a remote account or channel, unique within the
/// remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecipientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    DirectUser,
    TextChannel,
    Unsupported,
}

/// An addressable target on the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub kind: RecipientKind,
}

impl Recipient {
    #[must_use]
    pub fn user(id: impl Into<RecipientId>) -> Self {
        Self {
            id: id.into(),
            kind: RecipientKind::DirectUser,
        }
    }
}

/// A recipient seen through group membership or a direct conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub recipient: Recipient,
    /// Automated/service account (bots, webhooks). Never broadcast to.
    pub is_service: bool,
}

/// A group (guild, server, team) and the members visible in it.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub members: Vec<Contact>,
}

/// The remote account a session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

// ── Lifecycle reporting ─────────────────────────────────────────────────────

/// Receiver of connection lifecycle events from a running gateway client.
///
/// Every method is a state transition request and nothing else; the owning
/// session decides whether the transition applies.
pub trait LifecycleSink: Send + Sync {
    /// Handshake completed (initial connect, reconnect, or resume).
    fn ready(&self, identity: Identity);

    /// The live connection dropped; the client is expected to reconnect.
    fn disconnected(&self);

    /// The remote system rejected the credential.
    fn rejected(&self, reason: &str);

    /// The client's connection loop ended and will not come back.
    fn closed(&self, reason: &str);
}

// ── Gateway traits ──────────────────────────────────────────────────────────

/// Opens client connections for a credential.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Open a client and start its handshake in the background.
    ///
    /// Returns as soon as the connection loop is running; readiness is
    /// reported later through `events`. Credential problems detectable up
    /// front are returned as [`ConnectError::InvalidCredential`].
    async fn connect(
        &self,
        credential: &Secret<String>,
        events: Arc<dyn LifecycleSink>,
    ) -> std::result::Result<Arc<dyn GatewayClient>, ConnectError>;
}

/// A live gateway client owned by exactly one session.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Groups the account belongs to, with their visible members.
    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Accounts with an existing direct-message conversation.
    async fn list_direct_contacts(&self) -> Result<Vec<Contact>>;

    async fn send_to(
        &self,
        recipient: &Recipient,
        text: &str,
    ) -> std::result::Result<(), DeliveryError>;

    /// Best-effort shutdown of the connection loop.
    async fn close(&self);
}
