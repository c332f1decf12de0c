use std::{error::Error as StdError, time::Duration};

use serde::Serialize;

/// Crate-wide result type for session and broadcast operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the request-routing layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller omitted required input. Raised before any session work.
    #[error("missing required argument: {name}")]
    MissingArgument { name: &'static str },

    /// The remote gateway rejected the credential. Not retried automatically.
    #[error("credential rejected by the remote gateway: {reason}")]
    InvalidCredential { reason: String },

    /// Readiness was not reached in time. The session is now failed and a
    /// later call may retry.
    #[error("session not ready after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    /// Broadcast attempted on a session that is missing or not ready.
    #[error("session is not connected or not ready; ensure the session first")]
    NotReady,

    /// Discovery found nobody to send to.
    #[error("no recipients found; check that the account is in a group and can see its members")]
    NoRecipients,

    #[error("{message}")]
    Unexpected {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

/// Stable error kind for callers that map errors onto their own protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingArgument,
    InvalidCredential,
    Timeout,
    NotReady,
    NoRecipients,
    UnexpectedError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingArgument => "missing_argument",
            Self::InvalidCredential => "invalid_credential",
            Self::Timeout => "timeout",
            Self::NotReady => "not_ready",
            Self::NoRecipients => "no_recipients",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    #[must_use]
    pub fn missing_argument(name: &'static str) -> Self {
        Self::MissingArgument { name }
    }

    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn unexpected_with(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        let context = context.into();
        Self::Unexpected {
            message: format!("{context}: {source}"),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingArgument { .. } => ErrorKind::MissingArgument,
            Self::InvalidCredential { .. } => ErrorKind::InvalidCredential,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotReady => ErrorKind::NotReady,
            Self::NoRecipients => ErrorKind::NoRecipients,
            Self::Unexpected { .. } => ErrorKind::UnexpectedError,
        }
    }
}

impl From<herald_channels::Error> for Error {
    fn from(err: herald_channels::Error) -> Self {
        Self::unexpected_with("gateway query failed", err)
    }
}
