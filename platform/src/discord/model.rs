//! Payloads of the Discord REST API, reduced to the fields the client reads.

use crate::{
    permissions::Permissions,
    ChannelId,
    GuildId,
    MessageId,
    RoleId,
    UserId,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGuild {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub roles: Vec<ApiRole>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRole {
    pub id: RoleId,
    pub permissions: Permissions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMember {
    #[serde(default)]
    pub user: Option<ApiUser>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiChannel {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<ApiOverwrite>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiOverwrite {
    pub id: crate::Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: Permissions,
    pub deny: Permissions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RateLimited {
    /// Seconds to wait before retrying.
    #[serde(default)]
    pub retry_after: f64,
}
