//! Metric name and label definitions.
//!
//! Every metric herald emits is named here so the set of exported series is
//! documented in one place.

/// Session lifecycle metrics
pub mod session {
    /// Total number of sessions registered
    pub const CREATED_TOTAL: &str = "herald_sessions_created_total";
    /// Number of sessions currently registered
    pub const REGISTERED: &str = "herald_sessions_registered";
    /// Connect attempts, labelled by outcome (ready, timeout, invalid_credential, error)
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "herald_session_connect_attempts_total";
    /// Time from starting a connect attempt to readiness
    pub const READY_DURATION_SECONDS: &str = "herald_session_ready_duration_seconds";
    /// Disconnects observed while ready
    pub const DISCONNECTS_TOTAL: &str = "herald_session_disconnects_total";
}

/// Broadcast dispatcher metrics
pub mod broadcast {
    /// Broadcast calls that passed precondition checks
    pub const BROADCASTS_TOTAL: &str = "herald_broadcasts_total";
    /// Broadcast wall-clock duration in seconds
    pub const DURATION_SECONDS: &str = "herald_broadcast_duration_seconds";
    /// Recipients successfully sent to
    pub const RECIPIENTS_SENT_TOTAL: &str = "herald_broadcast_recipients_sent_total";
    /// Recipients whose send failed, labelled by reason
    pub const RECIPIENTS_FAILED_TOTAL: &str = "herald_broadcast_recipients_failed_total";
    /// Recipients skipped because of the cooldown window
    pub const RECIPIENTS_SKIPPED_TOTAL: &str = "herald_broadcast_recipients_skipped_total";
}

/// Cooldown store metrics
pub mod cooldown {
    /// Entries currently held by the cooldown store
    pub const ENTRIES: &str = "herald_cooldown_entries";
    /// Entries removed by the periodic sweep
    pub const SWEPT_TOTAL: &str = "herald_cooldown_swept_total";
}

/// Common label keys
pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const REASON: &str = "reason";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Session readiness: 50ms to the 10s ready timeout and a little past it
    pub const READY_DURATION: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0];

    /// Broadcasts are paced, so large audiences take minutes
    pub const BROADCAST_DURATION: &[f64] = &[
        0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
    ];
}
