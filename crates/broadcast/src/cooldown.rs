//! Per-credential, per-recipient ledger of the last successful send.
//!
//! Decisions for one `(credential, recipient)` key go through a single
//! DashMap entry lock, so two concurrent broadcasts on the same credential
//! can never both claim the same recipient inside one window.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    herald_channels::RecipientId,
    tokio::time::Instant,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use herald_metrics::{cooldown as cd_metrics, counter, gauge};

use crate::credential::CredentialKey;

type Key = (CredentialKey, RecipientId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Last confirmed successful send.
    Sent(Instant),
    /// A broadcast holds a claim; `previous` is restored if it is abandoned.
    InFlight { previous: Option<Instant> },
}

pub struct CooldownStore {
    entries: DashMap<Key, Slot>,
    retention: Duration,
    sweep_every: u64,
    claims_seen: AtomicU64,
}

impl CooldownStore {
    /// `retention` must be at least the longest cooldown window callers pass,
    /// otherwise the sweep could forget an entry that still blocks a send.
    #[must_use]
    pub fn new(retention: Duration, sweep_every: u64) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            sweep_every: sweep_every.max(1),
            claims_seen: AtomicU64::new(0),
        }
    }

    /// Whether a send to `recipient` is allowed at `now`.
    #[must_use]
    pub fn should_send(
        &self,
        credential: CredentialKey,
        recipient: RecipientId,
        now: Instant,
        window: Duration,
    ) -> bool {
        match self.entries.get(&(credential, recipient)).map(|slot| *slot) {
            None => true,
            Some(Slot::Sent(at)) => now.saturating_duration_since(at) >= window,
            Some(Slot::InFlight { .. }) => false,
        }
    }

    /// Record a confirmed send at `now`.
    pub fn record_sent(&self, credential: CredentialKey, recipient: RecipientId, now: Instant) {
        self.entries.insert((credential, recipient), Slot::Sent(now));
        #[cfg(feature = "metrics")]
        gauge!(cd_metrics::ENTRIES).set(self.entries.len() as f64);
    }

    /// Atomically check the window and reserve the recipient.
    ///
    /// Returns `None` when the recipient was sent to within `window` or is
    /// currently claimed by another broadcast. The returned claim must be
    /// confirmed after a successful send; dropping it unconfirmed restores
    /// the previous entry.
    pub fn try_claim(
        &self,
        credential: CredentialKey,
        recipient: RecipientId,
        now: Instant,
        window: Duration,
    ) -> Option<CooldownClaim<'_>> {
        let key = (credential, recipient);
        let claimed = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => match *occupied.get() {
                Slot::InFlight { .. } => None,
                Slot::Sent(at) if now.saturating_duration_since(at) < window => None,
                Slot::Sent(at) => {
                    occupied.insert(Slot::InFlight { previous: Some(at) });
                    Some(Some(at))
                },
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight { previous: None });
                Some(None)
            },
        };

        self.sweep_if_needed(now);

        claimed.map(|previous| CooldownClaim {
            store: self,
            key,
            previous,
            confirmed: false,
        })
    }

    /// Number of entries currently held, including in-flight claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop confirmed entries older than the retention period. In-flight
    /// claims are never swept.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot {
            Slot::Sent(at) => now.saturating_duration_since(*at) <= self.retention,
            Slot::InFlight { .. } => true,
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "swept stale cooldown entries");
        }
        #[cfg(feature = "metrics")]
        {
            counter!(cd_metrics::SWEPT_TOTAL).increment(removed as u64);
            gauge!(cd_metrics::ENTRIES).set(self.entries.len() as f64);
        }
        removed
    }

    fn sweep_if_needed(&self, now: Instant) {
        let seen = self.claims_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen.is_multiple_of(self.sweep_every) {
            self.sweep(now);
        }
    }
}

/// Reservation of one recipient for one send attempt.
#[must_use = "dropping a claim releases the recipient without recording a send"]
pub struct CooldownClaim<'a> {
    store: &'a CooldownStore,
    key: Key,
    previous: Option<Instant>,
    confirmed: bool,
}

impl CooldownClaim<'_> {
    /// Record the successful send at `now`.
    pub fn confirm(mut self, now: Instant) {
        self.store.record_sent(self.key.0, self.key.1, now);
        self.confirmed = true;
    }
}

impl Drop for CooldownClaim<'_> {
    fn drop(&mut self) {
        if self.confirmed {
            return;
        }
        match self.previous {
            Some(at) => {
                if let Some(mut slot) = self.store.entries.get_mut(&self.key) {
                    *slot = Slot::Sent(at);
                }
            },
            None => {
                self.store
                    .entries
                    .remove_if(&self.key, |_, slot| matches!(slot, Slot::InFlight { .. }));
            },
        }
    }
}
