use std::fmt;

use {
    secrecy::Secret,
    sha2::{Digest, Sha256},
};

use crate::error::{Error, Result};

/// SHA-256 digest of a credential. Used as the map key wherever sessions or
/// cooldown entries are indexed, so the token itself is only held by its
/// session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialKey([u8; 32]);

impl CredentialKey {
    /// Short, non-reversible identifier safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialKey({})", self.fingerprint())
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Opaque secret identifying one remote account.
#[derive(Clone)]
pub struct Credential {
    secret: Secret<String>,
    key: CredentialKey,
}

impl Credential {
    /// Wrap a raw token. Surrounding whitespace is dropped; an empty token is
    /// a missing argument.
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::missing_argument("credential"));
        }
        let key = CredentialKey(Sha256::digest(token.as_bytes()).into());
        Ok(Self {
            secret: Secret::new(token.to_string()),
            key,
        })
    }

    #[must_use]
    pub fn key(&self) -> CredentialKey {
        self.key
    }

    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    #[must_use]
    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
