/// Config schema types (session, broadcast, discord, metrics).
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub session: SessionConfig,
    pub broadcast: BroadcastConfig,
    pub discord: DiscordConfig,
    pub metrics: MetricsConfig,
}

/// Session readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `ensure_ready` waits for the gateway handshake.
    pub ready_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 10,
        }
    }
}

/// Broadcast cooldown and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Minimum interval between two successful sends to the same recipient.
    pub cooldown_ms: u64,
    /// Delay between consecutive send attempts within one broadcast.
    pub pacing_ms: u64,
    /// Cooldown entries older than this many windows are dropped.
    pub sweep_after_windows: u32,
    /// Run the sweep once every this many cooldown checks.
    pub sweep_every: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            pacing_ms: 100,
            sweep_after_windows: 3,
            sweep_every: 512,
        }
    }
}

/// Discord gateway intents. Both are privileged and must also be enabled
/// for the application in the Discord developer portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Request `GUILD_MEMBERS`; without it guild members cannot be listed.
    #[serde(default = "default_true")]
    pub guild_members: bool,
    /// Request `MESSAGE_CONTENT`.
    #[serde(default = "default_true")]
    pub message_content: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            guild_members: true,
            message_content: true,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install a metrics recorder at startup.
    pub enabled: bool,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}
