use {herald_config::DiscordConfig, serenity::all::GatewayIntents};

/// Gateway options for every Discord session this process opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscordOptions {
    /// Request the privileged `GUILD_MEMBERS` intent.
    pub guild_members: bool,
    /// Request the privileged `MESSAGE_CONTENT` intent.
    pub message_content: bool,
}

impl Default for DiscordOptions {
    fn default() -> Self {
        Self::from(&DiscordConfig::default())
    }
}

impl From<&DiscordConfig> for DiscordOptions {
    fn from(config: &DiscordConfig) -> Self {
        Self {
            guild_members: config.guild_members,
            message_content: config.message_content,
        }
    }
}

impl DiscordOptions {
    /// Gateway intents to identify with.
    #[must_use]
    pub fn intents(&self) -> GatewayIntents {
        let mut intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES;
        if self.guild_members {
            intents |= GatewayIntents::GUILD_MEMBERS;
        }
        if self.message_content {
            intents |= GatewayIntents::MESSAGE_CONTENT;
        }
        intents
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_privileged_intents() {
        let intents = DiscordOptions::default().intents();
        assert!(intents.contains(GatewayIntents::GUILD_MEMBERS));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(intents.contains(GatewayIntents::DIRECT_MESSAGES));
    }

    #[test]
    fn privileged_intents_are_optional() {
        let options = DiscordOptions {
            guild_members: false,
            message_content: false,
        };
        let intents = options.intents();
        assert!(!intents.contains(GatewayIntents::GUILD_MEMBERS));
        assert!(!intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert_eq!(
            intents,
            GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES
        );
    }
}
