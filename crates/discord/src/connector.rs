use std::sync::Arc;

use {
    async_trait::async_trait,
    herald_channels::{ConnectError, GatewayClient, GatewayConnector, LifecycleSink},
    secrecy::{ExposeSecret, Secret},
    serenity::all::{Client, Http},
    tracing::{debug, info},
};

use crate::{
    client::DiscordClient,
    config::DiscordOptions,
    error::connect_error,
    handler::{DiscordHandler, report_exit},
    state::DirectContacts,
};

/// Opens Discord bot sessions.
#[derive(Debug, Clone, Default)]
pub struct DiscordConnector {
    options: DiscordOptions,
}

impl DiscordConnector {
    #[must_use]
    pub fn new(options: DiscordOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl GatewayConnector for DiscordConnector {
    /// Verify the token over REST, then start the gateway client in the
    /// background. Returns before the handshake completes; readiness arrives
    /// through `events`.
    async fn connect(
        &self,
        credential: &Secret<String>,
        events: Arc<dyn LifecycleSink>,
    ) -> Result<Arc<dyn GatewayClient>, ConnectError> {
        let token = credential.expose_secret();

        // Fail fast on a bad token instead of waiting for the gateway.
        let me = Http::new(token)
            .get_current_user()
            .await
            .map_err(connect_error)?;
        info!(bot_name = %me.name, "discord token verified");

        let contacts = DirectContacts::default();
        let handler = DiscordHandler::new(Arc::clone(&events), contacts.clone());
        let mut client = Client::builder(token, self.options.intents())
            .event_handler(handler)
            .await
            .map_err(connect_error)?;

        let discord = Arc::new(DiscordClient::new(
            &client,
            contacts,
            self.options.guild_members,
        ));

        tokio::spawn(async move {
            debug!("starting discord client");
            let outcome = client.start().await;
            report_exit(outcome, events.as_ref());
        });

        Ok(discord)
    }
}
