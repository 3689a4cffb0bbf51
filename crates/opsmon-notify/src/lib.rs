//! Notification delivery for incidents.
//!
//! Channel types are [`plugin::ChannelPlugin`]s registered by name in a
//! [`plugin::ChannelRegistry`]; the [`dispatcher::Dispatcher`] resolves a
//! rule's channel ids, instantiates each channel through the registry and
//! records one [`NotificationAttempt`](opsmon_common::types::NotificationAttempt)
//! per channel. Built-in types are `email`, `dingtalk` and `webhook`.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod plugin;
pub mod utils;


use async_trait::async_trait;
use opsmon_common::types::Incident;

/// What a channel reports back after the provider accepted a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider response excerpt, already truncated.
    pub detail: Option<String>,
}

/// A configured delivery destination.
///
/// Implementations make a single delivery attempt per call; a failed send is
/// retried by the next sweep that re-notifies, never inside the channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, incident: &Incident) -> error::Result<SendReceipt>;

    /// Registry name of the channel type (e.g. `"email"`).
    fn channel_type(&self) -> &str;

    /// Row id of the channel configuration this instance was built from.
    fn instance_id(&self) -> &str;
}
