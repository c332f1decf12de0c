use std::error::Error as StdError;

/// Crate-wide result type for gateway queries.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed gateway errors for discovery queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation is currently unavailable (not connected, cache not warm).
    #[error("gateway operation unavailable: {message}")]
    Unavailable { message: String },
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}

/// Failure to open a gateway connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The remote system refused the credential.
    #[error("credential rejected: {reason}")]
    InvalidCredential { reason: String },

    /// Network or protocol failure while opening the connection.
    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("{context}: {source}")]
    Other {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConnectError {
    #[must_use]
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::InvalidCredential {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn other(context: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Other {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Per-recipient send failure. Always recovered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Missing permission, or the recipient refuses messages from this sender.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The recipient does not exist or is not a kind that accepts text.
    #[error("unsupported recipient: {0}")]
    UnsupportedRecipient(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Short label used for log fields and metric labels.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::UnsupportedRecipient(_) => "unsupported_recipient",
            Self::Transport(_) => "transport",
        }
    }
}
