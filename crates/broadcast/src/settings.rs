use std::time::Duration;

use herald_config::HeraldConfig;

/// Session readiness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound for `ensure_ready` to wait on the readiness gate.
    pub ready_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Broadcast pacing and cooldown settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Minimum time between two successful sends to the same recipient.
    pub cooldown: Duration,
    /// Delay between consecutive send attempts within one broadcast.
    pub pacing: Duration,
    /// Confirmed cooldown entries older than this many windows are swept.
    pub sweep_after_windows: u32,
    /// Sweep once every this many cooldown claims.
    pub sweep_every: u64,
}

impl BroadcastSettings {
    /// Age after which a cooldown entry can no longer affect any decision.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.cooldown.saturating_mul(self.sweep_after_windows.max(1))
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            pacing: Duration::from_millis(100),
            sweep_after_windows: 3,
            sweep_every: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    pub session: SessionSettings,
    pub broadcast: BroadcastSettings,
}

impl From<&HeraldConfig> for ServiceSettings {
    fn from(config: &HeraldConfig) -> Self {
        Self {
            session: SessionSettings {
                ready_timeout: Duration::from_secs(config.session.ready_timeout_secs),
            },
            broadcast: BroadcastSettings {
                cooldown: Duration::from_millis(config.broadcast.cooldown_ms),
                pacing: Duration::from_millis(config.broadcast.pacing_ms),
                sweep_after_windows: config.broadcast.sweep_after_windows,
                sweep_every: config.broadcast.sweep_every,
            },
        }
    }
}
