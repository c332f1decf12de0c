//! Discord event handler for serenity.
//!
//! Translates gateway events into session lifecycle callbacks and records
//! direct-message contacts.

use std::{
    num::NonZeroU16,
    sync::{Arc, RwLock},
};

use {
    herald_channels::{Identity, LifecycleSink},
    serenity::{
        all::{
            ConnectionStage, Context, EventHandler, GuildId, Message, Ready, ResumedEvent,
            ShardStageUpdateEvent,
        },
        async_trait,
    },
    tracing::{debug, info, warn},
};

use crate::{error::is_rejection, state::DirectContacts};

/// Handler for Discord gateway events of one session.
pub struct DiscordHandler {
    events: Arc<dyn LifecycleSink>,
    contacts: DirectContacts,
    /// Last identity seen in `ready`, replayed when the gateway resumes.
    identity: RwLock<Option<Identity>>,
}

impl DiscordHandler {
    #[must_use]
    pub fn new(events: Arc<dyn LifecycleSink>, contacts: DirectContacts) -> Self {
        Self {
            events,
            contacts,
            identity: RwLock::new(None),
        }
    }

    fn record_dm(&self, msg: &Message) {
        if msg.guild_id.is_some() || msg.author.bot {
            return;
        }
        if self.contacts.record(msg.author.id.get()) {
            debug!(
                user_id = msg.author.id.get(),
                contacts = self.contacts.len(),
                "recorded direct-message contact"
            );
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );

        let user = &ready.user;
        let identity = identity_from(user.id.get(), &user.name, user.discriminator);
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = Some(identity.clone());
        self.events.ready(identity);
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        let identity = self
            .identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match identity {
            Some(identity) => {
                debug!(bot_name = %identity.name, "discord session resumed");
                self.events.ready(identity);
            },
            None => warn!("discord session resumed before ready"),
        }
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        debug!(
            shard = ?event.shard_id,
            old = ?event.old,
            new = ?event.new,
            "discord shard stage changed"
        );
        if left_connected(event.old, event.new) {
            self.events.disconnected();
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        self.record_dm(&msg);
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        debug!(guild_count = guilds.len(), "discord cache ready");
    }
}

fn left_connected(old: ConnectionStage, new: ConnectionStage) -> bool {
    old == ConnectionStage::Connected && new != ConnectionStage::Connected
}

fn identity_from(id: u64, name: &str, discriminator: Option<NonZeroU16>) -> Identity {
    Identity {
        id: id.to_string(),
        name: name.to_string(),
        discriminator: discriminator.map(|d| format!("{:04}", d.get())),
    }
}

/// Report how the background client loop ended.
pub(crate) fn report_exit(outcome: serenity::Result<()>, events: &dyn LifecycleSink) {
    match outcome {
        Ok(()) => {
            info!("discord client stopped");
            events.closed("client stopped");
        },
        Err(e) if is_rejection(&e) => {
            warn!(error = %e, "discord gateway rejected the token");
            events.rejected(&e.to_string());
        },
        Err(e) => {
            warn!(error = %e, "discord client loop failed");
            events.closed(&e.to_string());
        },
    }
}
