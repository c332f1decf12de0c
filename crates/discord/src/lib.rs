//! Discord gateway for herald, built on serenity.
//!
//! [`DiscordConnector`] verifies a bot token, starts a serenity client in the
//! background and hands back a [`DiscordClient`] for discovery and delivery.
//! Gateway lifecycle is reported through the caller's `LifecycleSink`.

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod state;

pub use {client::DiscordClient, config::DiscordOptions, connector::DiscordConnector};
