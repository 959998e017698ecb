//! # Chat platform access
//!
//! The [`Platform`] trait is the only surface the collectors see. It exposes exactly what a sampling cycle needs:
//!
//! - **`resolve_guild`**: the monitored guild, its channels and whether the bot may read their history
//! - **`list_guild_members`**: the full roster with the presence of every member
//! - **`stream_channel_history_since`**: the messages of one channel posted after an instant
//!
//! The [`discord`] module implements it against the Discord REST API. Presence information is only available
//! over the gateway, so [`gateway::GatewaySession`] keeps a [`gateway::PresenceMap`] up to date and publishes the
//! connection-ready signal the scheduler waits for.

#[macro_use]
extern crate tracing;

pub mod discord;
mod error;
pub mod gateway;
pub mod permissions;
mod snowflake;
mod types;

pub use error::PlatformError;
pub use snowflake::{
    ChannelId,
    GuildId,
    MessageId,
    RoleId,
    Snowflake,
    UserId,
};
pub use types::{
    Channel,
    ChannelKind,
    ChannelMessage,
    Guild,
    Member,
    PresenceStatus,
};

use chrono::{
    DateTime,
    Utc,
};
use futures::stream::BoxStream;
use std::{
    future::Future,
    pin::Pin,
};

pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlatformError>> + Send + 'a>>;

pub type MessageStream<'a> = BoxStream<'a, Result<ChannelMessage, PlatformError>>;

/// Capabilities of the chat platform used by a sampling cycle.
pub trait Platform: Send + Sync {
    /// Resolve the guild with all of its channels.
    ///
    /// Fails with [`PlatformError::GuildNotFound`] if the guild does not exist or the bot is not a member.
    fn resolve_guild(&self, guild_id: GuildId) -> PlatformFuture<'_, Guild>;

    /// List every member of the guild together with their current presence.
    fn list_guild_members(&self, guild_id: GuildId) -> PlatformFuture<'_, Vec<Member>>;

    /// Stream the messages of a channel that were posted after `since`.
    ///
    /// The stream may end early when the platform limits pagination, counts derived from it are approximate.
    fn stream_channel_history_since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> MessageStream<'_>;
}
