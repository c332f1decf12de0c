//! Discovery and delivery over a running serenity client.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    herald_channels::{
        Contact, DeliveryError, Error, GatewayClient, Group, Recipient, RecipientKind, Result,
    },
    serenity::all::{Cache, ChannelId, Client, Http, ShardManager, UserId},
    tracing::{debug, warn},
};

use crate::{error::delivery_error, state::DirectContacts};

/// Handle to one connected Discord bot.
pub struct DiscordClient {
    http: Arc<Http>,
    cache: Arc<Cache>,
    shard_manager: Arc<ShardManager>,
    contacts: DirectContacts,
    guild_members: bool,
    closed: AtomicBool,
}

impl DiscordClient {
    pub(crate) fn new(client: &Client, contacts: DirectContacts, guild_members: bool) -> Self {
        Self {
            http: Arc::clone(&client.http),
            cache: Arc::clone(&client.cache),
            shard_manager: Arc::clone(&client.shard_manager),
            contacts,
            guild_members,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::unavailable("discord client is closed"));
        }
        Ok(())
    }

    async fn open_dm(&self, user_id: UserId) -> std::result::Result<ChannelId, DeliveryError> {
        let channel = user_id
            .create_dm_channel((&self.cache, self.http.as_ref()))
            .await
            .map_err(|e| delivery_error(&e))?;
        Ok(channel.id)
    }
}

#[async_trait]
impl GatewayClient for DiscordClient {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.ensure_open()?;
        let mut groups = Vec::new();
        for guild_id in self.cache.guilds() {
            let Some(guild) = self.cache.guild(guild_id) else {
                continue;
            };
            if !self.guild_members {
                warn!(
                    guild = %guild.name,
                    "guild members intent not enabled, cannot list members"
                );
            }
            let members = guild
                .members
                .values()
                .map(|member| Contact {
                    recipient: Recipient::user(member.user.id.get()),
                    is_service: member.user.bot,
                })
                .collect();
            groups.push(Group {
                id: guild_id.to_string(),
                name: guild.name.clone(),
                members,
            });
        }
        debug!(guilds = groups.len(), "listed discord guilds from cache");
        Ok(groups)
    }

    async fn list_direct_contacts(&self) -> Result<Vec<Contact>> {
        self.ensure_open()?;
        Ok(self
            .contacts
            .user_ids()
            .into_iter()
            .map(|id| Contact {
                recipient: Recipient::user(id),
                is_service: false,
            })
            .collect())
    }

    async fn send_to(
        &self,
        recipient: &Recipient,
        text: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let id = recipient.id.0;
        if id == 0 {
            return Err(DeliveryError::UnsupportedRecipient("id 0".into()));
        }

        let channel = match recipient.kind {
            RecipientKind::DirectUser => self.open_dm(UserId::new(id)).await?,
            RecipientKind::TextChannel => ChannelId::new(id),
            RecipientKind::Unsupported => {
                return Err(DeliveryError::UnsupportedRecipient(format!(
                    "recipient {id} cannot receive text"
                )));
            },
        };

        channel
            .say(&self.http, text)
            .await
            .map_err(|e| delivery_error(&e))?;
        debug!(recipient = id, channel = %channel, "discord message sent");
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("shutting down discord shards");
        self.shard_manager.shutdown_all().await;
    }
}
