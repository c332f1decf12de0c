//! Remote messaging gateway contracts.
//!
//! Each gateway (Discord today) implements [`GatewayConnector`] and
//! [`GatewayClient`]. The broadcast core only ever talks to a gateway through
//! these traits, and the gateway only ever reports connection lifecycle back
//! through a [`LifecycleSink`].

pub mod error;
pub mod plugin;

pub use {
    error::{ConnectError, DeliveryError, Error, Result},
    plugin::{
        Contact, GatewayClient, GatewayConnector, Group, Identity, LifecycleSink, Recipient,
        RecipientId, RecipientKind,
    },
};
