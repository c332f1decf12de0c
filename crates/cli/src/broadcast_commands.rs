//! One-shot session commands.
//!
//! Each invocation builds its own `BroadcastService`, so nothing carries over
//! between runs: `reused` is always `false`, cooldown entries last for the one
//! broadcast, and DM contacts are only those received while the command runs.
//! Recipients therefore come from guild membership in practice.

use std::{sync::Arc, time::Duration};

use {
    clap::Args,
    herald_broadcast::{BroadcastService, Error, ServiceSettings},
    herald_config::HeraldConfig,
    herald_discord::{DiscordConnector, DiscordOptions},
    serde_json::json,
};

/// Arguments shared by commands that open a session.
#[derive(Args)]
pub struct SessionArgs {
    /// Discord bot token.
    #[arg(long, env = "HERALD_DISCORD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Override `session.ready_timeout_secs`.
    #[arg(long)]
    pub ready_timeout_secs: Option<u64>,
}

fn settings_for(config: &HeraldConfig, args: &SessionArgs) -> ServiceSettings {
    let mut settings = ServiceSettings::from(config);
    if let Some(secs) = args.ready_timeout_secs {
        settings.session.ready_timeout = Duration::from_secs(secs);
    }
    settings
}

fn build_service(config: &HeraldConfig, args: &SessionArgs) -> BroadcastService {
    let connector = DiscordConnector::new(DiscordOptions::from(&config.discord));
    BroadcastService::new(Arc::new(connector), settings_for(config, args))
}

/// Connect and print the session identity.
pub async fn status(config: &HeraldConfig, args: &SessionArgs) -> Result<(), Error> {
    let service = build_service(config, args);
    let info = service.ensure_session_ready(&args.token).await?;
    println!(
        "{}",
        json!({
            "status": "success",
            "reused": info.reused,
            "identity": info.identity,
        })
    );
    Ok(())
}

/// Connect, then broadcast `message` to every reachable recipient.
pub async fn broadcast(
    config: &HeraldConfig,
    args: &SessionArgs,
    message: &str,
) -> Result<(), Error> {
    if message.trim().is_empty() {
        return Err(Error::missing_argument("message"));
    }
    let service = build_service(config, args);
    service.ensure_session_ready(&args.token).await?;
    let result = service.broadcast(&args.token, message).await?;

    eprintln!("{result}");
    println!(
        "{}",
        json!({
            "status": "success",
            "message": result.to_string(),
            "sent_count": result.sent_count,
            "failed_count": result.failed_count,
            "skipped_cooldown_count": result.skipped_cooldown_count,
            "total_candidates": result.total_candidates,
        })
    );
    Ok(())
}

/// JSON body printed when a command fails.
pub fn error_body(err: &Error) -> serde_json::Value {
    json!({
        "status": "error",
        "kind": err.kind(),
        "message": err.to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_stable_kind() {
        let body = error_body(&Error::NotReady);
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "not_ready");
        assert!(body["message"].as_str().unwrap().contains("not ready"));
    }

    #[test]
    fn ready_timeout_flag_overrides_config() {
        let mut config = HeraldConfig::default();
        config.broadcast.pacing_ms = 250;
        let mut args = SessionArgs {
            token: "t".into(),
            ready_timeout_secs: None,
        };

        assert_eq!(
            settings_for(&config, &args).session.ready_timeout,
            Duration::from_secs(10)
        );

        args.ready_timeout_secs = Some(3);
        let settings = settings_for(&config, &args);
        assert_eq!(settings.session.ready_timeout, Duration::from_secs(3));
        assert_eq!(settings.broadcast.pacing, Duration::from_millis(250));
    }
}
